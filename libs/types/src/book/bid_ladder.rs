//! Bid (buy-side) ladder
//!
//! Maintains buy price levels iterated highest-price first. Backed by a
//! BTreeMap so serialization and iteration stay deterministic; the map is
//! ascending, so best-bid access uses the last key.

use crate::ids::OrderId;
use crate::numeric::Price;
use crate::order::Order;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::price_level::PriceLevel;

/// Buy-side price levels, best (highest) bid first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BidLadder {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidLadder {
    /// Create a new empty bid ladder
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

    /// Best (highest) bid price
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
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

    /// Iterate price levels best first (descending price)
    pub fn iter(&self) -> impl Iterator<Item = (&Price, &PriceLevel)> {
        self.levels.iter().rev()
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
