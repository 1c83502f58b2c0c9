//! Ingress dispatcher
//!
//! Consumes new-order events from the order-input stream. Each worker owns a
//! fixed subset of partitions and handles one record at a time, which keeps
//! per-symbol processing in partition order while symbols spread across
//! workers run in parallel.
//!
//! Per record: suppress duplicates via the idempotency store, resolve the
//! order row, gate on PENDING, validate, dispatch to the coordinator, then
//! mark processed and commit. A failing record is retried in line with
//! backoff; when retries are exhausted the record moves to the dead-letter
//! stream and its offset commits so the partition keeps draining.

use matching_engine::engine::{EngineError, MatchingCoordinator};
use persistence::{CacheError, IdempotencyStore, PrimaryStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::events::{OrderCreatedEvent, OrderStatusEvent, StatusReason};
use types::OrderStatus;

use crate::bus::{topics, BusError, InProcessBroker, Record};
use crate::producer::EgressPublisher;
use matching_engine::engine::MatchEventPublisher;

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Worker tasks consuming order-input partitions
    pub concurrency: usize,
    /// Bounded wait per poll
    pub poll_timeout: Duration,
    /// Fetch ceiling per poll
    pub max_poll_records: usize,
    /// In-line attempts before a record dead-letters
    pub retry_max: u32,
    /// Inter-attempt delays; the last entry repeats if attempts exceed it
    pub retry_backoff: Vec<Duration>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_timeout: Duration::from_millis(500),
            max_poll_records: 100,
            retry_max: 3,
            retry_backoff: vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ],
        }
    }
}

/// How one record was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed through the matching engine
    Matched,
    /// Suppressed: message id already processed
    Duplicate,
    /// Acknowledged: order row absent (pruned or never created)
    MissingOrder,
    /// Acknowledged: order no longer PENDING (prior delivery won)
    AlreadyProcessed,
    /// Rejected by pre-match validation
    Rejected,
    /// Payload could not be decoded; sent straight to the DLQ
    Malformed,
    /// Retries exhausted; routed to the DLQ
    DeadLettered,
}

#[derive(Error, Debug)]
enum DispatchError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Idempotency(#[from] CacheError),
}

/// Consumes order-input and drives the matching coordinator
pub struct IngressDispatcher {
    broker: Arc<InProcessBroker>,
    store: Arc<dyn PrimaryStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    coordinator: Arc<MatchingCoordinator>,
    status_publisher: EgressPublisher,
    config: DispatcherConfig,
}

impl IngressDispatcher {
    pub fn new(
        broker: Arc<InProcessBroker>,
        store: Arc<dyn PrimaryStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        coordinator: Arc<MatchingCoordinator>,
        config: DispatcherConfig,
    ) -> Self {
        let status_publisher = EgressPublisher::new(broker.clone());
        Self {
            broker,
            store,
            idempotency,
            coordinator,
            status_publisher,
            config,
        }
    }

    /// Spawn the worker tasks; flip the returned sender to stop them
    pub fn start(self: &Arc<Self>) -> (watch::Sender<bool>, Vec<JoinHandle<()>>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let partitions = self
            .broker
            .partition_count(topics::ORDER_INPUT)
            .expect("order-input topic exists");
        let workers = self.config.concurrency.min(partitions).max(1);

        info!(workers, partitions, "starting ingress dispatcher");

        let handles = (0..workers)
            .map(|worker| {
                let dispatcher = self.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { dispatcher.run_worker(worker, workers, shutdown).await })
            })
            .collect();
        (shutdown_tx, handles)
    }

    async fn run_worker(&self, worker: usize, workers: usize, shutdown: watch::Receiver<bool>) {
        let partitions: Vec<usize> = (0..self
            .broker
            .partition_count(topics::ORDER_INPUT)
            .expect("order-input topic exists"))
            .filter(|p| p % workers == worker)
            .collect();

        debug!(worker, ?partitions, "ingress worker started");

        while !*shutdown.borrow() {
            if let Err(e) = self.poll_partitions(&partitions).await {
                error!(worker, error = %e, "poll cycle failed");
                tokio::time::sleep(self.config.poll_timeout).await;
            }
        }
        debug!(worker, "ingress worker stopped");
    }

    /// One poll pass over a partition set; returns records handled
    pub async fn poll_partitions(&self, partitions: &[usize]) -> Result<usize, BusError> {
        let mut handled = 0;
        for &partition in partitions {
            let records = self
                .broker
                .poll(
                    topics::ORDER_INPUT,
                    partition,
                    self.config.max_poll_records,
                    self.config.poll_timeout,
                )
                .await?;
            for record in records {
                self.handle_record(&record).await;
                handled += 1;
            }
        }
        Ok(handled)
    }

    /// One poll pass over every partition (test and single-worker support)
    pub async fn poll_once(&self) -> Result<usize, BusError> {
        let partitions: Vec<usize> =
            (0..self.broker.partition_count(topics::ORDER_INPUT)?).collect();
        self.poll_partitions(&partitions).await
    }

    /// Process one record to an acknowledged conclusion
    pub async fn handle_record(&self, record: &Record) -> Disposition {
        let event: OrderCreatedEvent = match serde_json::from_str(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "malformed order-input record, dead-lettering"
                );
                self.dead_letter(record).await;
                self.commit(record);
                return Disposition::Malformed;
            }
        };

        info!(
            order_id = %event.order_id,
            message_id = %event.message_id,
            symbol = %event.symbol,
            partition = record.partition,
            offset = record.offset,
            "consumed order event"
        );

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.process_event(&event).await {
                Ok(disposition) => {
                    self.commit(record);
                    info!(
                        order_id = %event.order_id,
                        ?disposition,
                        "order event handled"
                    );
                    return disposition;
                }
                Err(e) => {
                    warn!(
                        order_id = %event.order_id,
                        attempt,
                        error = %e,
                        "order processing attempt failed"
                    );
                    if attempt >= self.config.retry_max {
                        break;
                    }
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
            }
        }

        error!(
            order_id = %event.order_id,
            message_id = %event.message_id,
            attempts = self.config.retry_max,
            "retries exhausted, dead-lettering record"
        );
        self.dead_letter(record).await;
        self.commit(record);
        Disposition::DeadLettered
    }

    async fn process_event(&self, event: &OrderCreatedEvent) -> Result<Disposition, DispatchError> {
        // 1. Duplicate suppression
        if self.idempotency.is_processed(event.message_id).await? {
            warn!(
                message_id = %event.message_id,
                order_id = %event.order_id,
                "duplicate message, skipping"
            );
            return Ok(Disposition::Duplicate);
        }

        // 2. Resolve the order row
        let Some(mut order) = self.store.find_order(event.order_id).await? else {
            error!(order_id = %event.order_id, "order not found in primary store");
            return Ok(Disposition::MissingOrder);
        };

        // 3. Only PENDING orders are matched; anything else already ran
        if order.status != OrderStatus::Pending {
            warn!(
                order_id = %order.order_id,
                status = %order.status,
                "order already processed"
            );
            return Ok(Disposition::AlreadyProcessed);
        }

        // 4. Pre-match validation rejects before the book is touched
        if let Err(validation) = order.validate() {
            warn!(order_id = %order.order_id, error = %validation, "order failed validation");
            order.status = OrderStatus::Rejected;
            order.updated_at = chrono::Utc::now();
            self.store.update_order(&order).await?;
            let status = OrderStatusEvent::from_order(&order, StatusReason::Rejected);
            if let Err(e) = self.status_publisher.publish_status(status).await {
                warn!(order_id = %order.order_id, error = %e, "failed to publish reject status");
            }
            self.idempotency
                .mark_processed(event.message_id, event.order_id)
                .await?;
            return Ok(Disposition::Rejected);
        }

        // 5. Match
        self.coordinator.process(order).await?;

        // 6. Mark processed, then the caller commits the offset
        self.idempotency
            .mark_processed(event.message_id, event.order_id)
            .await?;
        Ok(Disposition::Matched)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let schedule = &self.config.retry_backoff;
        if schedule.is_empty() {
            return Duration::from_millis(100);
        }
        let index = ((attempt as usize).saturating_sub(1)).min(schedule.len() - 1);
        schedule[index]
    }

    async fn dead_letter(&self, record: &Record) {
        if let Err(e) = self
            .broker
            .publish(topics::ORDER_INPUT_DLQ, &record.key, record.payload.clone())
            .await
        {
            error!(error = %e, "failed to publish record to dead-letter stream");
        }
    }

    fn commit(&self, record: &Record) {
        if let Err(e) = self.broker.commit(record) {
            error!(error = %e, "failed to commit offset");
        }
    }
}

