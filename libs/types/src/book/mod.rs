//! Limit order book
//!
//! One book per trading symbol: a bid ladder (descending), an ask ladder
//! (ascending), and an optimistic-lock version that increases by one on every
//! successful persistence. Resting orders are owned by the ladders; an order
//! is always LIMIT, non-terminal, and has remaining quantity while it rests.

pub mod ask_ladder;
pub mod bid_ladder;
pub mod price_level;

pub use ask_ladder::AskLadder;
pub use bid_ladder::BidLadder;
pub use price_level::PriceLevel;

use crate::ids::{OrderId, Symbol};
use crate::numeric::Price;
use crate::order::{Order, Side};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The order book for a single trading symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: Symbol,
    pub bids: BidLadder,
    pub asks: AskLadder,
    /// Optimistic-lock version; strictly increases across persists
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl OrderBook {
    /// Create a new empty book at version 0
    pub fn new(symbol: Symbol, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol,
            bids: BidLadder::new(),
            asks: AskLadder::new(),
            version: 0,
            updated_at: timestamp,
        }
    }

    /// Rest an order on its side's ladder
    pub fn insert(&mut self, order: Order) {
        match order.side {
            Side::Buy => self.bids.insert(order),
            Side::Sell => self.asks.insert(order),
        }
    }

    /// Remove a resting order by id
    pub fn remove(&mut self, side: Side, order_id: OrderId, price: Price) -> Option<Order> {
        match side {
            Side::Buy => self.bids.remove(order_id, price),
            Side::Sell => self.asks.remove(order_id, price),
        }
    }

    /// Best bid price (highest buy)
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    /// Best ask price (lowest sell)
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// Bid-ask spread; None when either side is empty
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Mid price; None when either side is empty
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => {
                Some((bid.as_decimal() + ask.as_decimal()) / Decimal::from(2))
            }
            _ => None,
        }
    }

    /// Whether both ladders are empty
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Check the book's structural invariants (test support)
    ///
    /// Every resting order must be LIMIT, OPEN or PARTIALLY_FILLED with
    /// remaining quantity, on the ladder matching its side, queued at its
    /// own price.
    pub fn check_invariants(&self) -> bool {
        let bid_ok = self.bids.iter().all(|(price, level)| {
            level.iter().all(|order| {
                order.side == Side::Buy
                    && order.order_type == crate::order::OrderType::Limit
                    && order.status.is_resting()
                    && !order.remaining().is_zero()
                    && order.price == Some(*price)
            })
        });
        let ask_ok = self.asks.iter().all(|(price, level)| {
            level.iter().all(|order| {
                order.side == Side::Sell
                    && order.order_type == crate::order::OrderType::Limit
                    && order.status.is_resting()
                    && !order.remaining().is_zero()
                    && order.price == Some(*price)
            })
        });
        bid_ok && ask_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;
    use crate::numeric::Quantity;
    use crate::order::{OrderStatus, OrderType};

    fn resting(id: i64, side: Side, price: u64, qty: &str) -> Order {
        let mut order = Order::new_pending(
            UserId::new(1),
            Symbol::new("BTC-USD"),
            side,
            OrderType::Limit,
            Some(Price::from_u64(price)),
            Quantity::from_str(qty).unwrap(),
            Utc::now(),
        );
        order.order_id = OrderId::new(id);
        order.status = OrderStatus::Open;
        order
    }

    #[test]
    fn test_empty_book() {
        let book = OrderBook::new(Symbol::new("BTC-USD"), Utc::now());
        assert!(book.is_empty());
        assert_eq!(book.version, 0);
        assert!(book.best_bid().is_none());
        assert!(book.best_ask().is_none());
        assert!(book.spread().is_none());
        assert!(book.mid_price().is_none());
    }

    #[test]
    fn test_insert_routes_by_side() {
        let mut book = OrderBook::new(Symbol::new("BTC-USD"), Utc::now());
        book.insert(resting(1, Side::Buy, 50000, "1.0"));
        book.insert(resting(2, Side::Sell, 50100, "1.0"));

        assert_eq!(book.best_bid(), Some(Price::from_u64(50000)));
        assert_eq!(book.best_ask(), Some(Price::from_u64(50100)));
        assert!(book.check_invariants());
    }

    #[test]
    fn test_spread_and_mid() {
        let mut book = OrderBook::new(Symbol::new("BTC-USD"), Utc::now());
        book.insert(resting(1, Side::Buy, 50000, "1.0"));
        book.insert(resting(2, Side::Sell, 50100, "1.0"));

        assert_eq!(book.spread(), Some(Decimal::from(100)));
        assert_eq!(book.mid_price(), Some(Decimal::from(50050)));
    }

    #[test]
    fn test_remove() {
        let mut book = OrderBook::new(Symbol::new("BTC-USD"), Utc::now());
        book.insert(resting(1, Side::Buy, 50000, "1.0"));

        let removed = book.remove(Side::Buy, OrderId::new(1), Price::from_u64(50000));
        assert!(removed.is_some());
        assert!(book.is_empty());
    }

    #[test]
    fn test_serde_round_trip_preserves_order() {
        let mut book = OrderBook::new(Symbol::new("BTC-USD"), Utc::now());
        book.insert(resting(1, Side::Sell, 50000, "0.3"));
        book.insert(resting(2, Side::Sell, 50000, "0.5"));
        book.insert(resting(3, Side::Sell, 50200, "0.4"));
        book.insert(resting(4, Side::Buy, 49900, "1.0"));
        book.insert(resting(5, Side::Buy, 49800, "2.0"));
        book.version = 17;

        let json = serde_json::to_string(&book).unwrap();
        let restored: OrderBook = serde_json::from_str(&json).unwrap();

        // Equal book: same price sets, same queue contents, same version
        assert_eq!(restored, book);
        assert_eq!(restored.version, 17);
        assert_eq!(restored.best_ask(), Some(Price::from_u64(50000)));
        assert_eq!(restored.best_bid(), Some(Price::from_u64(49900)));

        // FIFO within the 50000 ask level survives the round trip
        let level = restored.asks.level(&Price::from_u64(50000)).unwrap();
        let ids: Vec<OrderId> = level.iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![OrderId::new(1), OrderId::new(2)]);
        assert!(restored.check_invariants());
    }
}
