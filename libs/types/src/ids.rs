//! Unique identifier types for core entities
//!
//! Order, trade, and user identifiers are integers assigned monotonically by
//! the primary store; they are `0` until the row is inserted. Message
//! identifiers are UUID v7 so duplicate deliveries can be recognized across
//! redeliveries and replays.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an order, assigned by the primary store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Sentinel for an order that has not been persisted yet
    pub const UNASSIGNED: OrderId = OrderId(0);

    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// Whether the store has assigned this identifier
    pub fn is_assigned(&self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a trade, assigned by the primary store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(i64);

impl TradeId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique message identifier carried by every stream event
///
/// UUID v7 keeps message ids time-sortable, which makes duplicate windows
/// cheap to reason about in the idempotency layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trading pair symbol (e.g., "BTC-USD", "ETH-USD")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a new Symbol
    ///
    /// # Panics
    /// Panics if the symbol is empty
    pub fn new(symbol: impl Into<String>) -> Self {
        let s = symbol.into();
        assert!(!s.is_empty(), "Symbol must not be empty");
        Self(s)
    }

    /// Try to create a Symbol, returning None if empty
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        if s.is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_unassigned() {
        assert!(!OrderId::UNASSIGNED.is_assigned());
        assert!(OrderId::new(42).is_assigned());
    }

    #[test]
    fn test_order_id_serialization() {
        let id = OrderId::new(1001);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "1001");

        let deserialized: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_message_id_unique() {
        let id1 = MessageId::new();
        let id2 = MessageId::new();
        assert_ne!(id1, id2, "MessageIds should be unique");
    }

    #[test]
    fn test_message_id_serialization() {
        let id = MessageId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: MessageId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_symbol_creation() {
        let symbol = Symbol::new("BTC-USD");
        assert_eq!(symbol.as_str(), "BTC-USD");
    }

    #[test]
    fn test_symbol_try_new() {
        assert!(Symbol::try_new("ETH-USD").is_some());
        assert!(Symbol::try_new("").is_none());
    }

    #[test]
    #[should_panic(expected = "Symbol must not be empty")]
    fn test_symbol_empty_panics() {
        Symbol::new("");
    }

    #[test]
    fn test_symbol_serialization() {
        let symbol = Symbol::new("BTC-USD");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"BTC-USD\"");

        let deserialized: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(symbol, deserialized);
    }
}
