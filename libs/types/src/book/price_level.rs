//! Price level with FIFO queue
//!
//! A price level holds every resting order at one price, in arrival order.
//! Orders are stored by value; the level is their owner while they rest.
//! Removal by id scans the queue because timestamps and residual quantities
//! drift while an order rests, so structural equality cannot identify it.

use crate::ids::OrderId;
use crate::numeric::Quantity;
use crate::order::Order;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// FIFO queue of resting orders at a single price
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceLevel {
    orders: VecDeque<Order>,
}

impl PriceLevel {
    /// Create a new empty price level
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
        }
    }

    /// Append an order at the back of the queue (time priority)
    pub fn push_back(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Peek at the front order without removing it
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Mutable access to the front order
    pub fn front_mut(&mut self) -> Option<&mut Order> {
        self.orders.front_mut()
    }

    /// Pop the front order from the queue
    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    /// Remove a specific order by id, preserving the order of the rest
    pub fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let position = self
            .orders
            .iter()
            .position(|order| order.order_id == order_id)?;
        self.orders.remove(position)
    }

    /// Check if the price level is empty
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Number of orders at this level
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Sum of remaining quantity across all orders at this level
    pub fn total_remaining(&self) -> Quantity {
        self.orders
            .iter()
            .fold(Quantity::zero(), |acc, order| acc + order.remaining())
    }

    /// Iterate orders in FIFO order
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }
}
