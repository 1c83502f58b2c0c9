//! Ask (sell-side) ladder
//!
//! Maintains sell price levels iterated lowest-price first. Backed by a
//! BTreeMap, whose natural ascending order is the ask iteration order.

use crate::ids::OrderId;
use crate::numeric::Price;
use crate::order::Order;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::price_level::PriceLevel;

/// Sell-side price levels, best (lowest) ask first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AskLadder {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskLadder {
    /// Create a new empty ask ladder
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Append an order to the tail of its price queue, creating the level if new
    pub fn insert(&mut self, order: Order) {
        let price = order.price.expect("resting orders carry a price");
        self.levels.entry(price).or_default().push_back(order);
    }

    /// Remove an order by id from the queue at `price`
    ///
    /// Drops the price level if it becomes empty.
    pub fn remove(&mut self, order_id: OrderId, price: Price) -> Option<Order> {
        let level = self.levels.get_mut(&price)?;
        let removed = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(removed)
    }

    /// Best (lowest) ask price
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Queue at a specific price
    pub fn level(&self, price: &Price) -> Option<&PriceLevel> {
        self.levels.get(price)
    }

    /// Mutable queue at a specific price
    pub fn level_mut(&mut self, price: &Price) -> Option<&mut PriceLevel> {
        self.levels.get_mut(price)
    }

    /// Drop a price level outright (used when its queue empties)
    pub fn remove_level(&mut self, price: &Price) -> Option<PriceLevel> {
        self.levels.remove(price)
    }

    /// Iterate price levels best first (ascending price)
    pub fn iter(&self) -> impl Iterator<Item = (&Price, &PriceLevel)> {
        self.levels.iter()
    }

    /// Check if the ladder has no levels
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of price levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{Symbol, UserId};
    use crate::numeric::Quantity;
    use crate::order::{OrderType, Side};
    use chrono::Utc;

    fn ask(id: i64, price: u64, qty: &str) -> Order {
        let mut order = Order::new_pending(
            UserId::new(1),
            Symbol::new("BTC-USD"),
            Side::Sell,
            OrderType::Limit,
            Some(Price::from_u64(price)),
            Quantity::from_str(qty).unwrap(),
            Utc::now(),
        );
        order.order_id = OrderId::new(id);
        order
    }

    #[test]
    fn test_best_price_is_lowest() {
        let mut ladder = AskLadder::new();
        ladder.insert(ask(1, 50000, "1.0"));
        ladder.insert(ask(2, 49000, "2.0"));
        ladder.insert(ask(3, 51000, "1.5"));

        assert_eq!(ladder.best_price(), Some(Price::from_u64(49000)));
    }

    #[test]
    fn test_iter_ascends() {
        let mut ladder = AskLadder::new();
        ladder.insert(ask(1, 50000, "1.0"));
        ladder.insert(ask(2, 52000, "1.0"));
        ladder.insert(ask(3, 51000, "1.0"));

        let prices: Vec<Price> = ladder.iter().map(|(price, _)| *price).collect();
        assert_eq!(
            prices,
            vec![
                Price::from_u64(50000),
                Price::from_u64(51000),
                Price::from_u64(52000)
            ]
        );
    }

    #[test]
    fn test_remove_drops_empty_level() {
        let mut ladder = AskLadder::new();
        ladder.insert(ask(1, 50000, "1.0"));

        assert!(ladder.remove(OrderId::new(1), Price::from_u64(50000)).is_some());
        assert!(ladder.is_empty());
        assert!(ladder.best_price().is_none());
    }

    #[test]
    fn test_same_price_preserves_fifo() {
        let mut ladder = AskLadder::new();
        ladder.insert(ask(1, 50000, "1.0"));
        ladder.insert(ask(2, 50000, "2.0"));

        let level = ladder.level(&Price::from_u64(50000)).unwrap();
        assert_eq!(level.front().unwrap().order_id, OrderId::new(1));
        assert_eq!(level.total_remaining(), Quantity::from_str("3.0").unwrap());
    }
}
