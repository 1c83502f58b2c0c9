//! LIMIT order matching
//!
//! Price-time priority: the incoming order consumes opposite levels from the
//! best price inward while the price predicate holds (ask <= bid for an
//! incoming buy, bid >= ask for an incoming sell), FIFO within each level.
//! Whatever remains is appended to the tail of its own side's queue.

use chrono::Utc;
use tracing::{debug, info};
use types::{Order, OrderBook, OrderStatus, Side};

use super::{fill_at_level, MatchResult};
use crate::engine::EngineError;

/// Match an incoming LIMIT order against the book
pub fn match_limit(mut taker: Order, book: &mut OrderBook) -> Result<MatchResult, EngineError> {
    let limit_price = taker
        .price
        .ok_or(EngineError::InvalidOrderType(taker.order_type))?;
    let now = Utc::now();

    debug!(
        order_id = %taker.order_id,
        side = %taker.side,
        price = %limit_price,
        quantity = %taker.quantity,
        "matching LIMIT order"
    );

    let mut trades = Vec::new();
    let mut makers = Vec::new();

    match taker.side {
        Side::Buy => {
            while !taker.remaining().is_zero() {
                let Some(ask_price) = book.asks.best_price() else {
                    break;
                };
                if ask_price > limit_price {
                    debug!(ask = %ask_price, bid = %limit_price, "no more crossing asks");
                    break;
                }

                let level = book
                    .asks
                    .level_mut(&ask_price)
                    .expect("best price has a level");
                fill_at_level(&mut taker, level, ask_price, &mut trades, &mut makers, now);
                if level.is_empty() {
                    book.asks.remove_level(&ask_price);
                    debug!(price = %ask_price, "removed empty ask level");
                }
            }
        }
        Side::Sell => {
            while !taker.remaining().is_zero() {
                let Some(bid_price) = book.bids.best_price() else {
                    break;
                };
                if bid_price < limit_price {
                    debug!(bid = %bid_price, ask = %limit_price, "no more crossing bids");
                    break;
                }

                let level = book
                    .bids
                    .level_mut(&bid_price)
                    .expect("best price has a level");
                fill_at_level(&mut taker, level, bid_price, &mut trades, &mut makers, now);
                if level.is_empty() {
                    book.bids.remove_level(&bid_price);
                    debug!(price = %bid_price, "removed empty bid level");
                }
            }
        }
    }

    // Final status; an untouched order rests as OPEN
    if !taker.has_fills() {
        taker.status = OrderStatus::Open;
        taker.updated_at = now;
    }
    if !taker.is_filled() {
        book.insert(taker.clone());
        debug!(
            order_id = %taker.order_id,
            price = %limit_price,
            remaining = %taker.remaining(),
            "rested remainder in book"
        );
    }

    info!(
        order_id = %taker.order_id,
        status = %taker.status,
        filled = %taker.filled_quantity,
        quantity = %taker.quantity,
        trades = trades.len(),
        "LIMIT match complete"
    );

    Ok(MatchResult {
        taker,
        trades,
        makers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::testutil::*;
    use types::{OrderId, Price, Quantity, Symbol};

    fn empty_book() -> OrderBook {
        OrderBook::new(Symbol::new("BTC-USD"), Utc::now())
    }

    #[test]
    fn test_exact_cross_fills_both() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Sell, 50000, "1.0"));

        let result = match_limit(limit_order(2, Side::Buy, 50000, "1.0"), &mut book).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.buy_order_id, OrderId::new(2));
        assert_eq!(trade.sell_order_id, OrderId::new(1));
        assert_eq!(trade.price, Price::from_u64(50000));
        assert_eq!(trade.quantity, Quantity::from_str("1.0").unwrap());

        assert_eq!(result.taker.status, OrderStatus::Filled);
        assert_eq!(result.makers.len(), 1);
        assert_eq!(result.makers[0].status, OrderStatus::Filled);
        assert!(book.is_empty());
    }

    #[test]
    fn test_partial_fill_rests_remainder() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Sell, 50000, "0.5"));

        let result = match_limit(limit_order(2, Side::Buy, 50000, "1.0"), &mut book).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].quantity, Quantity::from_str("0.5").unwrap());
        assert_eq!(result.taker.status, OrderStatus::PartiallyFilled);
        assert_eq!(result.taker.remaining(), Quantity::from_str("0.5").unwrap());

        // Remainder rests on the bid side at the limit price
        assert_eq!(book.best_bid(), Some(Price::from_u64(50000)));
        let level = book.bids.level(&Price::from_u64(50000)).unwrap();
        assert_eq!(level.front().unwrap().order_id, OrderId::new(2));
        assert_eq!(
            level.front().unwrap().remaining(),
            Quantity::from_str("0.5").unwrap()
        );
        assert!(book.asks.is_empty());
        assert!(book.check_invariants());
    }

    #[test]
    fn test_walks_levels_within_price_bound() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Sell, 50000, "0.3"));
        book.insert(resting(2, Side::Sell, 50100, "0.5"));
        book.insert(resting(3, Side::Sell, 50200, "0.4"));

        let result = match_limit(limit_order(4, Side::Buy, 50150, "1.0"), &mut book).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].price, Price::from_u64(50000));
        assert_eq!(result.trades[0].quantity, Quantity::from_str("0.3").unwrap());
        assert_eq!(result.trades[1].price, Price::from_u64(50100));
        assert_eq!(result.trades[1].quantity, Quantity::from_str("0.5").unwrap());

        assert_eq!(result.taker.status, OrderStatus::PartiallyFilled);
        assert_eq!(result.taker.filled_quantity, Quantity::from_str("0.8").unwrap());

        // Remainder rests at 50150, 50200 ask untouched
        assert_eq!(book.best_bid(), Some(Price::from_u64(50150)));
        assert_eq!(book.best_ask(), Some(Price::from_u64(50200)));
    }

    #[test]
    fn test_fifo_within_level() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Sell, 50000, "0.3"));
        book.insert(resting(2, Side::Sell, 50000, "0.5"));
        book.insert(resting(3, Side::Sell, 50000, "0.2"));

        let result = match_limit(limit_order(4, Side::Buy, 50000, "0.7"), &mut book).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].sell_order_id, OrderId::new(1));
        assert_eq!(result.trades[0].quantity, Quantity::from_str("0.3").unwrap());
        assert_eq!(result.trades[1].sell_order_id, OrderId::new(2));
        assert_eq!(result.trades[1].quantity, Quantity::from_str("0.4").unwrap());

        assert_eq!(result.taker.status, OrderStatus::Filled);

        // Order 2 keeps the head with its residue, order 3 untouched behind it
        let level = book.asks.level(&Price::from_u64(50000)).unwrap();
        assert_eq!(level.len(), 2);
        assert_eq!(level.front().unwrap().order_id, OrderId::new(2));
        assert_eq!(
            level.front().unwrap().remaining(),
            Quantity::from_str("0.1").unwrap()
        );
        assert!(book.check_invariants());
    }

    #[test]
    fn test_no_cross_rests_as_open() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Sell, 50100, "1.0"));

        let result = match_limit(limit_order(2, Side::Buy, 50000, "1.0"), &mut book).unwrap();

        assert!(result.trades.is_empty());
        assert!(result.makers.is_empty());
        assert_eq!(result.taker.status, OrderStatus::Open);
        assert_eq!(book.best_bid(), Some(Price::from_u64(50000)));
        assert_eq!(book.best_ask(), Some(Price::from_u64(50100)));
    }

    #[test]
    fn test_sell_matches_highest_bids_first() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Buy, 50000, "0.5"));
        book.insert(resting(2, Side::Buy, 50100, "0.5"));

        let result = match_limit(limit_order(3, Side::Sell, 50000, "0.8"), &mut book).unwrap();

        assert_eq!(result.trades.len(), 2);
        // Highest bid consumed first, trades at maker prices
        assert_eq!(result.trades[0].price, Price::from_u64(50100));
        assert_eq!(result.trades[0].buy_order_id, OrderId::new(2));
        assert_eq!(result.trades[1].price, Price::from_u64(50000));
        assert_eq!(result.trades[1].quantity, Quantity::from_str("0.3").unwrap());
        assert_eq!(result.taker.status, OrderStatus::Filled);
    }

    #[test]
    fn test_exactly_divisible_cross_empties_levels() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Sell, 50000, "0.4"));
        book.insert(resting(2, Side::Sell, 50100, "0.6"));

        let result = match_limit(limit_order(3, Side::Buy, 50100, "1.0"), &mut book).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.taker.status, OrderStatus::Filled);
        assert!(book.is_empty(), "both consumed levels must be dropped");
    }
}
