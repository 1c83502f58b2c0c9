//! Dead letter handling
//!
//! Records on the order-input DLQ exhausted their in-line retries; the
//! affected order is moved to FAILED (if still PENDING) and a status event
//! with the processing error is published. DLQ records are always committed,
//! whatever happens, so they never loop. The trade-output DLQ is drained
//! without action because trades are durable before their events publish.

use matching_engine::engine::MatchEventPublisher;
use persistence::PrimaryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::events::{OrderCreatedEvent, OrderStatusEvent};
use types::OrderStatus;

use crate::bus::{topics, BusError, InProcessBroker, Record};
use crate::producer::EgressPublisher;

/// Counters from one drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DlqStats {
    pub order_records: usize,
    pub orders_failed: usize,
    pub trade_records: usize,
}

/// Consumes both dead-letter streams
pub struct DeadLetterHandler {
    broker: Arc<InProcessBroker>,
    store: Arc<dyn PrimaryStore>,
    publisher: EgressPublisher,
    poll_timeout: Duration,
}

impl DeadLetterHandler {
    pub fn new(broker: Arc<InProcessBroker>, store: Arc<dyn PrimaryStore>) -> Self {
        let publisher = EgressPublisher::new(broker.clone());
        Self {
            broker,
            store,
            publisher,
            poll_timeout: Duration::from_millis(500),
        }
    }

    /// Override the bounded poll wait (tests use a short one)
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// One drain pass over both DLQ topics
    pub async fn drain_once(&self) -> Result<DlqStats, BusError> {
        let mut stats = DlqStats::default();

        for partition in 0..self.broker.partition_count(topics::ORDER_INPUT_DLQ)? {
            let records = self
                .broker
                .poll(topics::ORDER_INPUT_DLQ, partition, 100, self.poll_timeout)
                .await?;
            for record in records {
                stats.order_records += 1;
                if self.handle_order_record(&record).await {
                    stats.orders_failed += 1;
                }
            }
        }

        for partition in 0..self.broker.partition_count(topics::TRADE_OUTPUT_DLQ)? {
            let records = self
                .broker
                .poll(topics::TRADE_OUTPUT_DLQ, partition, 100, self.poll_timeout)
                .await?;
            for record in records {
                // Trades are already durable at publish time; drain only
                debug!(
                    partition = record.partition,
                    offset = record.offset,
                    "draining trade DLQ record"
                );
                stats.trade_records += 1;
                self.commit(&record);
            }
        }

        if stats.order_records > 0 || stats.trade_records > 0 {
            info!(
                order_records = stats.order_records,
                orders_failed = stats.orders_failed,
                trade_records = stats.trade_records,
                "dead-letter drain complete"
            );
        }
        Ok(stats)
    }

    /// Run the drain loop until shutdown flips
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            if let Err(e) = self.drain_once().await {
                error!(error = %e, "dead-letter drain failed");
                tokio::time::sleep(self.poll_timeout).await;
            }
        }
    }

    /// Spawn the drain loop onto the runtime
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Returns true if an order was transitioned to FAILED
    async fn handle_order_record(&self, record: &Record) -> bool {
        error!(
            partition = record.partition,
            offset = record.offset,
            key = %record.key,
            "dead-letter record received"
        );

        let failed = match serde_json::from_str::<OrderCreatedEvent>(&record.payload) {
            Ok(event) => self.fail_order(&event).await,
            Err(e) => {
                error!(error = %e, "undecodable dead-letter record");
                false
            }
        };

        // DLQ records never re-loop
        self.commit(record);
        failed
    }

    async fn fail_order(&self, event: &OrderCreatedEvent) -> bool {
        match self.store.find_order(event.order_id).await {
            Ok(Some(mut order)) if order.status == OrderStatus::Pending => {
                order.status = OrderStatus::Failed;
                order.updated_at = chrono::Utc::now();
                if let Err(e) = self.store.update_order(&order).await {
                    error!(order_id = %order.order_id, error = %e, "failed to mark order FAILED");
                    return false;
                }
                info!(order_id = %order.order_id, symbol = %order.symbol, "order marked FAILED from DLQ");

                let status = OrderStatusEvent::failed(&order, "order processing failed");
                if let Err(e) = self.publisher.publish_status(status).await {
                    warn!(order_id = %order.order_id, error = %e, "failed to publish FAILED status");
                }
                true
            }
            Ok(Some(order)) => {
                warn!(
                    order_id = %order.order_id,
                    status = %order.status,
                    "dead-lettered order no longer PENDING"
                );
                false
            }
            Ok(None) => {
                error!(order_id = %event.order_id, "dead-lettered order not found");
                false
            }
            Err(e) => {
                error!(order_id = %event.order_id, error = %e, "failed to load dead-lettered order");
                false
            }
        }
    }

    fn commit(&self, record: &Record) {
        if let Err(e) = self.broker.commit(record) {
            error!(error = %e, "failed to commit dead-letter offset");
        }
    }
}
