//! Primary store interface
//!
//! One trait covers the durable state the matching path touches: orders,
//! trades, and the per-symbol book row. The book row update is conditional on
//! the caller's expected version; a conflict is a normal outcome that the
//! coordinator resolves by re-reading and re-matching.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use types::{Order, OrderBook, OrderId, OrderStatus, Symbol, Trade, TradeId, UserId};

/// Errors surfaced by the primary store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("order book not found: {0}")]
    BookNotFound(Symbol),

    /// Conditional book update matched zero rows
    #[error("version conflict for {symbol}: expected {expected}")]
    VersionConflict { symbol: Symbol, expected: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether a retry of the whole match cycle can resolve this error
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Durable storage for orders, trades, and book snapshots
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Insert a new order, assigning its identity
    async fn insert_order(&self, order: &Order) -> Result<Order, StoreError>;

    /// Look up an order by id
    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// Overwrite an order's mutable fields
    async fn update_order(&self, order: &Order) -> Result<(), StoreError>;

    /// All orders placed by a user, oldest first
    async fn find_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// Orders on a symbol in a given status, oldest first
    async fn find_orders_by_symbol_status(
        &self,
        symbol: &Symbol,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError>;

    /// Look up a trade by id
    async fn find_trade(&self, trade_id: TradeId) -> Result<Option<Trade>, StoreError>;

    /// Trades an order participated in, on either side, oldest first
    async fn find_trades_by_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError>;

    /// Trades on a symbol inside a time window, oldest first
    async fn find_trades_by_symbol(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, StoreError>;

    /// Load the book row for a symbol
    async fn find_book(&self, symbol: &Symbol) -> Result<Option<OrderBook>, StoreError>;

    /// Load the book row, creating an empty version-0 row if absent
    async fn get_or_create_book(&self, symbol: &Symbol) -> Result<OrderBook, StoreError>;

    /// Conditionally overwrite the book row
    ///
    /// Succeeds only if the stored version equals `expected`; the stored
    /// version becomes `expected + 1`.
    async fn save_book(&self, book: &OrderBook, expected: u64) -> Result<(), StoreError>;

    /// Persist one match result atomically
    ///
    /// Updates the taker and every mutated maker, inserts the trades
    /// (assigning their identities), and conditionally bumps the book row
    /// from `expected` to `expected + 1`. All-or-nothing: any failure leaves
    /// durable state untouched.
    async fn commit_match(
        &self,
        taker: &Order,
        makers: &[Order],
        trades: Vec<Trade>,
        book: &OrderBook,
        expected: u64,
    ) -> Result<Vec<Trade>, StoreError>;

    /// All symbols that have a book row (recovery enumeration)
    async fn book_symbols(&self) -> Result<Vec<Symbol>, StoreError>;
}
