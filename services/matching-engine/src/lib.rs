//! Matching engine for the spot trading core
//!
//! Price-time priority matching of LIMIT and MARKET orders against per-symbol
//! limit order books, with strictly serialized execution per symbol.
//!
//! **Key invariants:**
//! - Price-time priority: best price first, FIFO within a price level
//! - Trades execute at the maker's price
//! - Conservation of quantity across every match
//! - The book version increases by exactly one per durable commit

pub mod depth;
pub mod engine;
pub mod matching;

pub use engine::{EngineError, MatchEventPublisher, MatchOutcome, MatchingConfig, MatchingCoordinator};
pub use matching::MatchResult;
