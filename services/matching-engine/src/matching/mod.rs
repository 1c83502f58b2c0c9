//! Matching strategies
//!
//! The two strategies share the level-walk mechanics and differ only in the
//! price predicate and what happens to an unfilled remainder: LIMIT rests it,
//! MARKET never does. Dispatch is a tag match on the order type.

pub mod limit;
pub mod market;

use chrono::{DateTime, Utc};
use types::book::PriceLevel;
use types::{Order, OrderBook, Price, Side, Trade};

use crate::engine::EngineError;

/// Outcome of matching one incoming order against a book
///
/// `taker` is the incoming order with its fills and final status applied.
/// `makers` are the resting orders mutated by the walk, including any whose
/// queue slot was removed. `trades` are in execution order and unpersisted.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub taker: Order,
    pub trades: Vec<Trade>,
    pub makers: Vec<Order>,
}

impl MatchResult {
    /// Whether the incoming order was completely filled
    pub fn fully_matched(&self) -> bool {
        self.taker.is_filled()
    }
}

/// Match an incoming order using the strategy for its type
pub fn match_order(order: Order, book: &mut OrderBook) -> Result<MatchResult, EngineError> {
    match order.order_type {
        types::OrderType::Limit => limit::match_limit(order, book),
        types::OrderType::Market => Ok(market::match_market(order, book)),
    }
}

/// Fill the incoming order against one price level in FIFO order
///
/// Executes at `level_price` (the maker's price). Fully filled makers are
/// popped from the queue; a partially filled maker stays at the head. Every
/// mutated maker is recorded in `makers`.
pub(crate) fn fill_at_level(
    taker: &mut Order,
    level: &mut PriceLevel,
    level_price: Price,
    trades: &mut Vec<Trade>,
    makers: &mut Vec<Order>,
    now: DateTime<Utc>,
) {
    while !taker.remaining().is_zero() {
        let Some(maker) = level.front_mut() else {
            break;
        };

        let fill = taker.remaining().min(maker.remaining());

        let (buy_order_id, sell_order_id) = match taker.side {
            Side::Buy => (taker.order_id, maker.order_id),
            Side::Sell => (maker.order_id, taker.order_id),
        };
        trades.push(Trade::new(
            buy_order_id,
            sell_order_id,
            taker.symbol.clone(),
            level_price,
            fill,
            now,
        ));

        taker.apply_fill(fill, now);
        maker.apply_fill(fill, now);

        if maker.is_filled() {
            let filled = level
                .pop_front()
                .expect("front maker exists while filling");
            makers.push(filled);
        } else {
            makers.push(maker.clone());
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::Utc;
    use types::{Order, OrderId, OrderStatus, OrderType, Price, Quantity, Side, Symbol, UserId};

    pub fn limit_order(id: i64, side: Side, price: u64, qty: &str) -> Order {
        let mut order = Order::new_pending(
            UserId::new(id),
            Symbol::new("BTC-USD"),
            side,
            OrderType::Limit,
            Some(Price::from_u64(price)),
            Quantity::from_str(qty).unwrap(),
            Utc::now(),
        );
        order.order_id = OrderId::new(id);
        order
    }

    pub fn market_order(id: i64, side: Side, qty: &str) -> Order {
        let mut order = Order::new_pending(
            UserId::new(id),
            Symbol::new("BTC-USD"),
            side,
            OrderType::Market,
            None,
            Quantity::from_str(qty).unwrap(),
            Utc::now(),
        );
        order.order_id = OrderId::new(id);
        order
    }

    pub fn resting(id: i64, side: Side, price: u64, qty: &str) -> Order {
        let mut order = limit_order(id, side, price, qty);
        order.status = OrderStatus::Open;
        order
    }
}
