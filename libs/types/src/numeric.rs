//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Prices are bounded below by one cent and both types cap their scale at
//! eight decimal places. Serialized as strings to prevent JSON number
//! precision loss.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Maximum number of decimal places admitted for prices and quantities
pub const MAX_SCALE: u32 = 8;

/// Smallest admissible price (0.01 in quote units)
pub fn min_price() -> Decimal {
    Decimal::new(1, 2)
}

/// Price type with fixed-point decimal representation
///
/// Must be at least 0.01 with scale <= 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price from a Decimal
    ///
    /// # Panics
    /// Panics if the price is below 0.01 or exceeds the scale cap
    pub fn new(value: Decimal) -> Self {
        Self::try_new(value).expect("Price must be >= 0.01 with scale <= 8")
    }

    /// Try to create a Price, returning None if out of range
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= min_price() && value.scale() <= MAX_SCALE {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create from integer (for testing/convenience)
    pub fn from_u64(value: u64) -> Self {
        Self::new(Decimal::from(value))
    }

    /// Create from string
    pub fn from_str(s: &str) -> Result<Self, rust_decimal::Error> {
        let decimal = Decimal::from_str(s)?;
        Ok(Self::new(decimal))
    }

    /// Get the inner decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl Sub for Price {
    type Output = Decimal;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

// Custom serialization to preserve precision
impl Serialize for Price {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let decimal = Decimal::from_str(&s).map_err(serde::de::Error::custom)?;
        Self::try_new(decimal)
            .ok_or_else(|| serde::de::Error::custom("Price must be >= 0.01 with scale <= 8"))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Quantity type with fixed-point decimal representation
///
/// Order quantities are strictly positive with scale <= 8; zero is admitted
/// only for filled-quantity accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a new Quantity from a Decimal
    ///
    /// # Panics
    /// Panics if the quantity is not positive or exceeds the scale cap
    pub fn new(value: Decimal) -> Self {
        Self::try_new(value).expect("Quantity must be positive with scale <= 8")
    }

    /// Try to create a Quantity, returning None if out of range
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO && value.scale() <= MAX_SCALE {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Zero quantity (for filled-quantity accounting)
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Accept zero or positive values (filled-quantity columns and caches)
    pub fn try_non_negative(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO && value.scale() <= MAX_SCALE {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create from integer (for testing/convenience)
    pub fn from_u64(value: u64) -> Self {
        Self::new(Decimal::from(value))
    }

    /// Create from string
    pub fn from_str(s: &str) -> Result<Self, rust_decimal::Error> {
        let decimal = Decimal::from_str(s)?;
        Ok(Self::new(decimal))
    }

    /// Get the inner decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == Decimal::ZERO
    }

    /// The smaller of two quantities
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        assert!(
            self.0 >= rhs.0,
            "Quantity subtraction would result in negative"
        );
        Self(self.0 - rhs.0)
    }
}

// Custom serialization to preserve precision
impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let decimal = Decimal::from_str(&s).map_err(serde::de::Error::custom)?;
        // Allow zero (used for filled_quantity on fresh orders)
        if decimal >= Decimal::ZERO && decimal.scale() <= MAX_SCALE {
            Ok(Self(decimal))
        } else {
            Err(serde::de::Error::custom(
                "Quantity cannot be negative or exceed scale 8",
            ))
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
