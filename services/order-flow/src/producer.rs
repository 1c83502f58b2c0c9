//! Stream producers
//!
//! The order-input producer publishes new-order events keyed by symbol,
//! recording each message in the "sent" idempotency set before the publish
//! and removing it again when the publish fails, so the caller can retry
//! with a fresh message id.
//!
//! The egress publisher pushes order-status and trade events onto their
//! streams. Status events key by user so a user observes its own updates in
//! order; trade events key by symbol. Publishing is fire-and-forget: failures
//! are logged and surfaced to the caller for its own logging, but durable
//! state is never reversed.

use async_trait::async_trait;
use chrono::Utc;
use matching_engine::engine::{MatchEventPublisher, PublishError};
use persistence::{IdempotencyStore, PrimaryStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use types::events::{OrderCreatedEvent, OrderStatusEvent, TradeExecutedEvent};
use types::{MessageId, Order, OrderStatus};

use crate::bus::{topics, InProcessBroker};

/// Publishes new-order events onto the order-input stream
///
/// Waits a bounded time for broker confirmation; a failed or unconfirmed
/// publish marks the order FAILED and surfaces the error to the caller.
pub struct OrderInputProducer {
    broker: Arc<InProcessBroker>,
    store: Arc<dyn PrimaryStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    confirm_timeout: Duration,
}

impl OrderInputProducer {
    pub fn new(
        broker: Arc<InProcessBroker>,
        store: Arc<dyn PrimaryStore>,
        idempotency: Arc<dyn IdempotencyStore>,
    ) -> Self {
        Self {
            broker,
            store,
            idempotency,
            confirm_timeout: Duration::from_secs(5),
        }
    }

    /// Override the confirmation wait ceiling
    pub fn with_confirm_timeout(mut self, confirm_timeout: Duration) -> Self {
        self.confirm_timeout = confirm_timeout;
        self
    }

    /// Publish one order for matching, keyed by symbol
    ///
    /// The message is recorded as sent before the publish; a failed publish
    /// removes the record so a retry is not mistaken for a duplicate.
    pub async fn publish_order(
        &self,
        order: &Order,
        correlation_id: MessageId,
    ) -> Result<OrderCreatedEvent, PublishError> {
        let event = OrderCreatedEvent::from_order(order, correlation_id);
        let payload = serde_json::to_string(&event)
            .map_err(|e| PublishError(format!("order serialization failed: {e}")))?;

        if let Err(e) = self
            .idempotency
            .record_sent(event.message_id, event.order_id)
            .await
        {
            return Err(PublishError(format!("sent record failed: {e}")));
        }

        info!(
            order_id = %event.order_id,
            symbol = %event.symbol,
            message_id = %event.message_id,
            correlation_id = %event.correlation_id,
            "publishing order event"
        );

        let confirmation = tokio::time::timeout(
            self.confirm_timeout,
            self.broker
                .publish(topics::ORDER_INPUT, &event.partition_key(), payload),
        )
        .await;

        match confirmation {
            Ok(Ok(())) => Ok(event),
            Ok(Err(e)) => {
                self.fail_unconfirmed(order, &event, e.to_string()).await;
                Err(PublishError(e.to_string()))
            }
            Err(_) => {
                let reason = format!(
                    "no broker confirmation within {:?}",
                    self.confirm_timeout
                );
                self.fail_unconfirmed(order, &event, reason.clone()).await;
                Err(PublishError(reason))
            }
        }
    }

    async fn fail_unconfirmed(&self, order: &Order, event: &OrderCreatedEvent, reason: String) {
        error!(order_id = %event.order_id, reason = %reason, "order event publish failed");

        if let Err(e) = self.idempotency.remove_sent(event.message_id).await {
            error!(
                message_id = %event.message_id,
                error = %e,
                "failed to remove sent record after publish failure"
            );
        }

        let mut failed = order.clone();
        failed.status = OrderStatus::Failed;
        failed.updated_at = Utc::now();
        if let Err(e) = self.store.update_order(&failed).await {
            warn!(order_id = %order.order_id, error = %e, "failed to mark unpublished order FAILED");
        }
    }
}

/// Publishes match results to the status and trade streams
pub struct EgressPublisher {
    broker: Arc<InProcessBroker>,
}

impl EgressPublisher {
    pub fn new(broker: Arc<InProcessBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl MatchEventPublisher for EgressPublisher {
    async fn publish_status(&self, event: OrderStatusEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| PublishError(format!("status serialization failed: {e}")))?;

        match self
            .broker
            .publish(topics::ORDER_STATUS_UPDATE, &event.partition_key(), payload)
            .await
        {
            Ok(()) => {
                debug!(
                    order_id = %event.order_id,
                    user_id = %event.user_id,
                    status = %event.status,
                    reason = %event.reason,
                    "status event published"
                );
                Ok(())
            }
            Err(e) => {
                // Status events are non-critical; the caller only logs
                error!(order_id = %event.order_id, error = %e, "status event publish failed");
                Err(PublishError(e.to_string()))
            }
        }
    }

    async fn publish_trade(&self, event: TradeExecutedEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| PublishError(format!("trade serialization failed: {e}")))?;

        match self
            .broker
            .publish(topics::TRADE_OUTPUT, &event.partition_key(), payload)
            .await
        {
            Ok(()) => {
                debug!(
                    trade_id = %event.trade_id,
                    symbol = %event.symbol,
                    price = %event.price,
                    quantity = %event.quantity,
                    "trade event published"
                );
                Ok(())
            }
            Err(e) => {
                // The trade row is already durable; the wire event is informational
                error!(trade_id = %event.trade_id, error = %e, "trade event publish failed");
                Err(PublishError(e.to_string()))
            }
        }
    }
}
