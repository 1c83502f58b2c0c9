//! Stream event payloads
//!
//! Wire contracts for the order-input, order-status-update, and trade-output
//! streams. Every event carries a `message_id` for duplicate suppression.
//! Status events partition by user so each user observes its own updates in
//! order; trade events partition by symbol.

use crate::ids::{MessageId, OrderId, Symbol, TradeId, UserId};
use crate::numeric::{Price, Quantity};
use crate::order::{Order, OrderStatus, OrderType, Side};
use crate::trade::Trade;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an order-status event was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusReason {
    /// Emitted after a matching pass (for taker and mutated makers)
    Matched,
    /// Emitted after a user cancellation
    Cancelled,
    /// Emitted when pre-match validation rejects the order
    Rejected,
    /// Emitted when processing failed terminally
    ProcessingError,
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusReason::Matched => "MATCHED",
            StatusReason::Cancelled => "CANCELLED",
            StatusReason::Rejected => "REJECTED",
            StatusReason::ProcessingError => "PROCESSING_ERROR",
        };
        f.write_str(s)
    }
}

/// New-order event consumed from the order-input stream
///
/// The order row already exists in the primary store when this event is
/// published; `order_id` is the read-your-writes handle to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub message_id: MessageId,
    pub correlation_id: MessageId,
    pub timestamp: DateTime<Utc>,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Price>,
    pub quantity: Quantity,
}

impl OrderCreatedEvent {
    /// Build the event for a freshly inserted order
    pub fn from_order(order: &Order, correlation_id: MessageId) -> Self {
        Self {
            message_id: MessageId::new(),
            correlation_id,
            timestamp: Utc::now(),
            order_id: order.order_id,
            user_id: order.user_id,
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            price: order.price,
            quantity: order.quantity,
        }
    }

    /// Stream partition key (symbol keeps per-pair ordering)
    pub fn partition_key(&self) -> String {
        self.symbol.as_str().to_string()
    }
}

/// Order-status event published to the order-status-update stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusEvent {
    pub message_id: MessageId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub status: OrderStatus,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub timestamp: DateTime<Utc>,
    pub reason: StatusReason,
    pub error_message: Option<String>,
}

impl OrderStatusEvent {
    /// Build a status event from the current order state
    pub fn from_order(order: &Order, reason: StatusReason) -> Self {
        Self {
            message_id: MessageId::new(),
            order_id: order.order_id,
            user_id: order.user_id,
            symbol: order.symbol.clone(),
            status: order.status,
            filled_quantity: order.filled_quantity,
            remaining_quantity: order.remaining(),
            timestamp: Utc::now(),
            reason,
            error_message: None,
        }
    }

    /// Build a FAILED status event carrying the processing error
    pub fn failed(order: &Order, error_message: impl Into<String>) -> Self {
        let mut event = Self::from_order(order, StatusReason::ProcessingError);
        event.error_message = Some(error_message.into());
        event
    }

    /// Stream partition key (user keeps per-user ordering)
    pub fn partition_key(&self) -> String {
        self.user_id.to_string()
    }
}

/// Trade event published to the trade-output stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeExecutedEvent {
    pub message_id: MessageId,
    pub timestamp: DateTime<Utc>,
    pub trade_id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub symbol: Symbol,
    pub price: Price,
    pub quantity: Quantity,
    pub taker_order_id: OrderId,
    pub maker_order_id: OrderId,
}

impl TradeExecutedEvent {
    /// Build the event from a persisted trade, tagging taker and maker
    ///
    /// # Panics
    /// Panics if the trade has no assigned id or the taker is on neither side.
    pub fn from_trade(trade: &Trade, taker_order_id: OrderId) -> Self {
        let trade_id = trade.trade_id.expect("trade must be persisted before publish");
        let maker_order_id = trade
            .counterparty_of(taker_order_id)
            .expect("taker must be one side of the trade");

        Self {
            message_id: MessageId::new(),
            timestamp: Utc::now(),
            trade_id,
            buy_order_id: trade.buy_order_id,
            sell_order_id: trade.sell_order_id,
            symbol: trade.symbol.clone(),
            price: trade.price,
            quantity: trade.quantity,
            taker_order_id,
            maker_order_id,
        }
    }

    /// Stream partition key (symbol keeps per-pair ordering)
    pub fn partition_key(&self) -> String {
        self.symbol.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        let mut order = Order::new_pending(
            UserId::new(5),
            Symbol::new("BTC-USD"),
            Side::Buy,
            OrderType::Limit,
            Some(Price::from_u64(50000)),
            Quantity::from_str("1.0").unwrap(),
            Utc::now(),
        );
        order.order_id = OrderId::new(42);
        order
    }

    #[test]
    fn test_order_created_event() {
        let order = sample_order();
        let event = OrderCreatedEvent::from_order(&order, MessageId::new());

        assert_eq!(event.order_id, OrderId::new(42));
        assert_eq!(event.partition_key(), "BTC-USD");
        assert_eq!(event.price, Some(Price::from_u64(50000)));
    }

    #[test]
    fn test_status_event_from_order() {
        let mut order = sample_order();
        order.apply_fill(Quantity::from_str("0.4").unwrap(), Utc::now());

        let event = OrderStatusEvent::from_order(&order, StatusReason::Matched);
        assert_eq!(event.status, OrderStatus::PartiallyFilled);
        assert_eq!(event.filled_quantity, Quantity::from_str("0.4").unwrap());
        assert_eq!(event.remaining_quantity, Quantity::from_str("0.6").unwrap());
        assert_eq!(event.partition_key(), "5");
        assert!(event.error_message.is_none());
    }

    #[test]
    fn test_failed_status_event() {
        let order = sample_order();
        let event = OrderStatusEvent::failed(&order, "boom");
        assert_eq!(event.reason, StatusReason::ProcessingError);
        assert_eq!(event.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_trade_event_tags_maker_and_taker() {
        let mut trade = Trade::new(
            OrderId::new(2),
            OrderId::new(1),
            Symbol::new("BTC-USD"),
            Price::from_u64(50000),
            Quantity::from_str("1.0").unwrap(),
            Utc::now(),
        );
        trade.trade_id = Some(TradeId::new(9));

        // Incoming buy took the resting sell
        let event = TradeExecutedEvent::from_trade(&trade, OrderId::new(2));
        assert_eq!(event.taker_order_id, OrderId::new(2));
        assert_eq!(event.maker_order_id, OrderId::new(1));
        assert_eq!(event.partition_key(), "BTC-USD");
    }

    #[test]
    #[should_panic(expected = "trade must be persisted before publish")]
    fn test_trade_event_requires_persisted_trade() {
        let trade = Trade::new(
            OrderId::new(2),
            OrderId::new(1),
            Symbol::new("BTC-USD"),
            Price::from_u64(50000),
            Quantity::from_str("1.0").unwrap(),
            Utc::now(),
        );
        TradeExecutedEvent::from_trade(&trade, OrderId::new(2));
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let order = sample_order();
        let event = OrderStatusEvent::from_order(&order, StatusReason::Matched);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"MATCHED\""));

        let deserialized: OrderStatusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }
}
