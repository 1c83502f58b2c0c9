//! MARKET order matching
//!
//! Same traversal as LIMIT without the price predicate: the incoming order
//! sweeps the opposite ladder best-price first until filled or liquidity runs
//! out. The remainder is never rested; a market order that matched nothing is
//! REJECTED, a partially filled one finishes PARTIALLY_FILLED.

use chrono::Utc;
use tracing::{debug, info, warn};
use types::{Order, OrderBook, OrderStatus, Side};

use super::{fill_at_level, MatchResult};

/// Match an incoming MARKET order against the book
pub fn match_market(mut taker: Order, book: &mut OrderBook) -> MatchResult {
    let now = Utc::now();

    debug!(
        order_id = %taker.order_id,
        side = %taker.side,
        quantity = %taker.quantity,
        "matching MARKET order"
    );

    let mut trades = Vec::new();
    let mut makers = Vec::new();

    match taker.side {
        Side::Buy => {
            while !taker.remaining().is_zero() {
                let Some(ask_price) = book.asks.best_price() else {
                    break;
                };
                let level = book
                    .asks
                    .level_mut(&ask_price)
                    .expect("best price has a level");
                fill_at_level(&mut taker, level, ask_price, &mut trades, &mut makers, now);
                if level.is_empty() {
                    book.asks.remove_level(&ask_price);
                }
            }
        }
        Side::Sell => {
            while !taker.remaining().is_zero() {
                let Some(bid_price) = book.bids.best_price() else {
                    break;
                };
                let level = book
                    .bids
                    .level_mut(&bid_price)
                    .expect("best price has a level");
                fill_at_level(&mut taker, level, bid_price, &mut trades, &mut makers, now);
                if level.is_empty() {
                    book.bids.remove_level(&bid_price);
                }
            }
        }
    }

    // Market orders never rest: unfilled quantity is abandoned
    if !taker.has_fills() {
        taker.status = OrderStatus::Rejected;
        taker.updated_at = now;
        warn!(order_id = %taker.order_id, "MARKET order rejected: no liquidity");
    } else if !taker.is_filled() {
        warn!(
            order_id = %taker.order_id,
            filled = %taker.filled_quantity,
            quantity = %taker.quantity,
            "MARKET order exhausted liquidity"
        );
    }

    info!(
        order_id = %taker.order_id,
        status = %taker.status,
        filled = %taker.filled_quantity,
        quantity = %taker.quantity,
        trades = trades.len(),
        "MARKET match complete"
    );

    MatchResult {
        taker,
        trades,
        makers,
    }
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
    fn test_market_buy_sweeps_levels() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Sell, 50000, "0.4"));
        book.insert(resting(2, Side::Sell, 50500, "0.6"));

        let result = match_market(market_order(3, Side::Buy, "1.0"), &mut book);

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].price, Price::from_u64(50000));
        assert_eq!(result.trades[1].price, Price::from_u64(50500));
        assert_eq!(result.taker.status, OrderStatus::Filled);
        assert!(book.is_empty());
    }

    #[test]
    fn test_market_partial_fill_never_rests() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Sell, 50000, "0.5"));

        let result = match_market(market_order(2, Side::Buy, "1.0"), &mut book);

        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].quantity, Quantity::from_str("0.5").unwrap());
        assert_eq!(result.taker.status, OrderStatus::PartiallyFilled);
        assert_eq!(result.taker.remaining(), Quantity::from_str("0.5").unwrap());

        // Nothing rested anywhere
        assert!(book.is_empty());
    }

    #[test]
    fn test_market_empty_book_rejected() {
        let mut book = empty_book();

        let result = match_market(market_order(1, Side::Sell, "0.1"), &mut book);

        assert!(result.trades.is_empty());
        assert!(result.makers.is_empty());
        assert_eq!(result.taker.status, OrderStatus::Rejected);
        assert!(book.is_empty());
    }

    #[test]
    fn test_market_sell_takes_best_bids_first() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Buy, 49000, "0.5"));
        book.insert(resting(2, Side::Buy, 50000, "0.5"));

        let result = match_market(market_order(3, Side::Sell, "0.6"), &mut book);

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].price, Price::from_u64(50000));
        assert_eq!(result.trades[0].buy_order_id, OrderId::new(2));
        assert_eq!(result.trades[1].price, Price::from_u64(49000));
        assert_eq!(result.trades[1].quantity, Quantity::from_str("0.1").unwrap());
        assert_eq!(result.taker.status, OrderStatus::Filled);
    }

    #[test]
    fn test_market_respects_fifo() {
        let mut book = empty_book();
        book.insert(resting(1, Side::Sell, 50000, "0.2"));
        book.insert(resting(2, Side::Sell, 50000, "0.8"));

        let result = match_market(market_order(3, Side::Buy, "0.5"), &mut book);

        assert_eq!(result.trades[0].sell_order_id, OrderId::new(1));
        assert_eq!(result.trades[1].sell_order_id, OrderId::new(2));

        let level = book.asks.level(&Price::from_u64(50000)).unwrap();
        assert_eq!(level.front().unwrap().order_id, OrderId::new(2));
        assert_eq!(
            level.front().unwrap().remaining(),
            Quantity::from_str("0.5").unwrap()
        );
    }
}
