//! Aggregated depth view
//!
//! Collapses each ladder into price levels of summed remaining quantity and
//! order count, truncated to a requested number of levels (at most 100).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::{OrderBook, Price, Quantity, Symbol};

/// Upper bound on requested depth levels
pub const MAX_DEPTH_LIMIT: usize = 100;

/// One aggregated price level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Price,
    /// Sum of remaining quantity of every order at this price
    pub quantity: Quantity,
    pub order_count: usize,
}

/// Truncated two-sided depth of one symbol's book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthView {
    pub symbol: Symbol,
    /// Bid levels, best (highest) first
    pub bids: Vec<DepthLevel>,
    /// Ask levels, best (lowest) first
    pub asks: Vec<DepthLevel>,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    /// best_ask - best_bid; None when either side is empty
    pub spread: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate a book into a depth view
///
/// `limit` is clamped into `[1, MAX_DEPTH_LIMIT]`; None means the maximum.
pub fn aggregate(book: &OrderBook, limit: Option<usize>) -> DepthView {
    let limit = limit.unwrap_or(MAX_DEPTH_LIMIT).clamp(1, MAX_DEPTH_LIMIT);

    let bids = book
        .bids
        .iter()
        .take(limit)
        .map(|(price, level)| DepthLevel {
            price: *price,
            quantity: level.total_remaining(),
            order_count: level.len(),
        })
        .collect();

    let asks = book
        .asks
        .iter()
        .take(limit)
        .map(|(price, level)| DepthLevel {
            price: *price,
            quantity: level.total_remaining(),
            order_count: level.len(),
        })
        .collect();

    DepthView {
        symbol: book.symbol.clone(),
        bids,
        asks,
        best_bid: book.best_bid(),
        best_ask: book.best_ask(),
        spread: book.spread(),
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::testutil::resting;
    use types::Side;

    fn populated_book() -> OrderBook {
        let mut book = OrderBook::new(Symbol::new("BTC-USD"), Utc::now());
        book.insert(resting(1, Side::Buy, 50000, "1.0"));
        book.insert(resting(2, Side::Buy, 50000, "0.5"));
        book.insert(resting(3, Side::Buy, 49900, "2.0"));
        book.insert(resting(4, Side::Sell, 50100, "0.7"));
        book.insert(resting(5, Side::Sell, 50200, "1.2"));
        book
    }

    #[test]
    fn test_aggregation_sums_and_counts() {
        let view = aggregate(&populated_book(), None);

        assert_eq!(view.bids.len(), 2);
        assert_eq!(view.bids[0].price, Price::from_u64(50000));
        assert_eq!(view.bids[0].quantity, Quantity::from_str("1.5").unwrap());
        assert_eq!(view.bids[0].order_count, 2);
        assert_eq!(view.bids[1].price, Price::from_u64(49900));

        assert_eq!(view.asks.len(), 2);
        assert_eq!(view.asks[0].price, Price::from_u64(50100));
        assert_eq!(view.asks[0].order_count, 1);
    }

    #[test]
    fn test_sides_ordered_best_first() {
        let view = aggregate(&populated_book(), None);
        assert!(view.bids[0].price > view.bids[1].price);
        assert!(view.asks[0].price < view.asks[1].price);
    }

    #[test]
    fn test_limit_truncates() {
        let view = aggregate(&populated_book(), Some(1));
        assert_eq!(view.bids.len(), 1);
        assert_eq!(view.asks.len(), 1);
        // Best levels survive truncation
        assert_eq!(view.bids[0].price, Price::from_u64(50000));
        assert_eq!(view.asks[0].price, Price::from_u64(50100));
    }

    #[test]
    fn test_limit_clamped() {
        let book = populated_book();
        let zero = aggregate(&book, Some(0));
        assert_eq!(zero.bids.len(), 1, "limit 0 clamps to 1");

        let huge = aggregate(&book, Some(10_000));
        assert_eq!(huge.bids.len(), 2, "limit above cap returns everything");
    }

    #[test]
    fn test_best_and_spread() {
        let view = aggregate(&populated_book(), None);
        assert_eq!(view.best_bid, Some(Price::from_u64(50000)));
        assert_eq!(view.best_ask, Some(Price::from_u64(50100)));
        assert_eq!(view.spread, Some(Decimal::from(100)));
    }

    #[test]
    fn test_one_sided_book_has_no_spread() {
        let mut book = OrderBook::new(Symbol::new("BTC-USD"), Utc::now());
        book.insert(resting(1, Side::Buy, 50000, "1.0"));

        let view = aggregate(&book, None);
        assert_eq!(view.best_bid, Some(Price::from_u64(50000)));
        assert!(view.best_ask.is_none());
        assert!(view.spread.is_none());
        assert!(view.asks.is_empty());
    }
}
