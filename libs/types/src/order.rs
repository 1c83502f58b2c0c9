//! Order lifecycle types
//!
//! An order is created PENDING by the upstream order service, matched by the
//! engine, and finishes in exactly one terminal state. LIMIT orders carry a
//! price and may rest in the book; MARKET orders carry no price and never
//! rest.

use crate::errors::ValidationError;
use crate::ids::{OrderId, Symbol, UserId};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Executes at the given price or better; the remainder rests in the book
    Limit,
    /// Executes at the best available prices; never rests
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        }
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LIMIT" => Ok(OrderType::Limit),
            "MARKET" => Ok(OrderType::Market),
            other => Err(format!("unknown order type: {other}")),
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted by the order service, awaiting matching
    Pending,
    /// Resting in the book with no fills
    Open,
    /// Some quantity filled, some remaining
    PartiallyFilled,
    /// Completely filled (terminal)
    Filled,
    /// Cancelled by the user (terminal)
    Cancelled,
    /// Failed pre-match validation or found no liquidity (terminal)
    Rejected,
    /// Terminal processing error (terminal)
    Failed,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Failed
        )
    }

    /// Whether an order in this status may rest in the book
    pub fn is_resting(&self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "OPEN" => Ok(OrderStatus::Open),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "FAILED" => Ok(OrderStatus::Failed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trading order
///
/// `price` is `Some` iff the order is a LIMIT order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Price>,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new pending order (identity assigned on insert)
    pub fn new_pending(
        user_id: UserId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        price: Option<Price>,
        quantity: Quantity,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: OrderId::UNASSIGNED,
            user_id,
            symbol,
            side,
            order_type,
            price,
            quantity,
            filled_quantity: Quantity::zero(),
            status: OrderStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Quantity still to be filled
    pub fn remaining(&self) -> Quantity {
        self.quantity - self.filled_quantity
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }

    /// Check if order has some fills but is not complete
    pub fn is_partially_filled(&self) -> bool {
        !self.filled_quantity.is_zero() && !self.is_filled()
    }

    /// Check if order has any fills
    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Record a fill and adjust status to FILLED or PARTIALLY_FILLED
    ///
    /// # Panics
    /// Panics if the fill would exceed total quantity
    pub fn apply_fill(&mut self, fill_quantity: Quantity, timestamp: DateTime<Utc>) {
        let new_filled = self.filled_quantity + fill_quantity;
        assert!(
            new_filled <= self.quantity,
            "Fill would exceed order quantity"
        );

        self.filled_quantity = new_filled;
        self.status = if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = timestamp;
    }

    /// Validate field combinations for a freshly submitted order
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.order_type {
            OrderType::Limit => {
                if self.price.is_none() {
                    return Err(ValidationError::MissingPrice);
                }
            }
            OrderType::Market => {
                if self.price.is_some() {
                    return Err(ValidationError::UnexpectedPrice);
                }
            }
        }
        // Price/Quantity newtypes already enforce range and scale; a zero
        // quantity can only appear through deserialization.
        if self.quantity.is_zero() {
            return Err(ValidationError::NonPositiveQuantity);
        }
        Ok(())
    }
}
