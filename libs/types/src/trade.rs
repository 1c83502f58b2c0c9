//! Trade records
//!
//! A trade is the immutable outcome of one fill between a resting (maker)
//! order and an incoming (taker) order. The execution price is always the
//! maker's price.

use crate::ids::{OrderId, Symbol, TradeId};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An executed trade between two orders of opposite sides
///
/// `trade_id` is `None` until the primary store assigns one on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Option<TradeId>,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub symbol: Symbol,
    pub price: Price,
    pub quantity: Quantity,
    pub created_at: DateTime<Utc>,
}

impl Trade {
    /// Create a new unpersisted trade
    pub fn new(
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        symbol: Symbol,
        price: Price,
        quantity: Quantity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            trade_id: None,
            buy_order_id,
            sell_order_id,
            symbol,
            price,
            quantity,
            created_at,
        }
    }

    /// The counterparty of `order_id` in this trade
    ///
    /// Returns None if `order_id` is on neither side.
    pub fn counterparty_of(&self, order_id: OrderId) -> Option<OrderId> {
        if order_id == self.buy_order_id {
            Some(self.sell_order_id)
        } else if order_id == self.sell_order_id {
            Some(self.buy_order_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        Trade::new(
            OrderId::new(2),
            OrderId::new(1),
            Symbol::new("BTC-USD"),
            Price::from_u64(50000),
            Quantity::from_str("0.5").unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn test_trade_creation() {
        let trade = sample_trade();
        assert!(trade.trade_id.is_none());
        assert_eq!(trade.buy_order_id, OrderId::new(2));
        assert_eq!(trade.sell_order_id, OrderId::new(1));
    }

    #[test]
    fn test_counterparty() {
        let trade = sample_trade();
        assert_eq!(trade.counterparty_of(OrderId::new(2)), Some(OrderId::new(1)));
        assert_eq!(trade.counterparty_of(OrderId::new(1)), Some(OrderId::new(2)));
        assert_eq!(trade.counterparty_of(OrderId::new(99)), None);
    }

    #[test]
    fn test_trade_serialization() {
        let mut trade = sample_trade();
        trade.trade_id = Some(TradeId::new(10));

        let json = serde_json::to_string(&trade).unwrap();
        let deserialized: Trade = serde_json::from_str(&json).unwrap();
        assert_eq!(trade, deserialized);
    }
}
