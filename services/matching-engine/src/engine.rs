//! Matching coordinator
//!
//! Owns the in-memory books and drives one order through match, persist, and
//! publish. Execution is strictly serial per symbol: every mutation of a
//! book happens under that symbol's writer lock, while different symbols
//! proceed in parallel.
//!
//! Matching runs on a clone of the guarded book, and the clone only replaces
//! the shared copy after the durable commit succeeds. A failed commit
//! therefore leaves both durable and in-memory state untouched, and a version
//! conflict restarts the whole cycle against a re-read book.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use types::errors::CancelError;
use types::events::{OrderStatusEvent, StatusReason, TradeExecutedEvent};
use types::{Order, OrderBook, OrderId, OrderStatus, OrderType, Symbol, Trade, UserId};

use persistence::{PrimaryStore, StoreError, SymbolRegistry};

use crate::depth::{self, DepthView};
use crate::matching;

/// Event publish failure; logged, never reverses a durable commit
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("publish failed: {0}")]
pub struct PublishError(pub String);

/// Post-commit event emission
///
/// Implementations are fire-and-forget toward the broker; the coordinator
/// logs failures and moves on.
#[async_trait]
pub trait MatchEventPublisher: Send + Sync {
    async fn publish_status(&self, event: OrderStatusEvent) -> Result<(), PublishError>;
    async fn publish_trade(&self, event: TradeExecutedEvent) -> Result<(), PublishError>;
}

/// Coordinator failures
#[derive(Error, Debug)]
pub enum EngineError {
    /// No strategy can handle this order's type/price combination
    #[error("no matching strategy for order type {0}")]
    InvalidOrderType(OrderType),

    /// Version conflicts survived every restart of the match cycle
    #[error("persistence conflict for {symbol} after {attempts} attempts")]
    PersistenceConflict { symbol: Symbol, attempts: u32 },

    /// Prerequisite reads (book row, order row) could not be served
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cancel(#[from] CancelError),
}

/// Coordinator tuning
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Max restarts of the match->persist cycle on version conflict
    pub version_retry_max: u32,
    /// Base delay between restarts; grows linearly per attempt
    pub retry_backoff: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            version_retry_max: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Result of processing one order
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// The incoming order with fills and final status
    pub order: Order,
    /// Persisted trades in execution order
    pub trades: Vec<Trade>,
    /// Maker orders mutated by the match
    pub makers: Vec<Order>,
}

/// Per-symbol serialized matching over persistent books
pub struct MatchingCoordinator {
    store: Arc<dyn PrimaryStore>,
    publisher: Arc<dyn MatchEventPublisher>,
    sync_registry: Arc<SymbolRegistry>,
    books: DashMap<Symbol, Arc<Mutex<OrderBook>>>,
    config: MatchingConfig,
}

impl MatchingCoordinator {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        publisher: Arc<dyn MatchEventPublisher>,
        sync_registry: Arc<SymbolRegistry>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            sync_registry,
            books: DashMap::new(),
            config,
        }
    }

    /// Process one order: match, persist atomically, publish, register sync
    pub async fn process(&self, order: Order) -> Result<MatchOutcome, EngineError> {
        let symbol = order.symbol.clone();
        info!(
            order_id = %order.order_id,
            symbol = %symbol,
            side = %order.side,
            order_type = %order.order_type,
            quantity = %order.quantity,
            "processing order"
        );

        let entry = self.book_entry(&symbol).await?;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let mut guard = entry.lock().await;

            let mut working = guard.clone();
            let result = matching::match_order(order.clone(), &mut working)?;
            let expected = guard.version;
            working.updated_at = Utc::now();

            match self
                .store
                .commit_match(
                    &result.taker,
                    &result.makers,
                    result.trades.clone(),
                    &working,
                    expected,
                )
                .await
            {
                Ok(persisted_trades) => {
                    working.version = expected + 1;
                    *guard = working;
                    drop(guard);

                    info!(
                        order_id = %result.taker.order_id,
                        status = %result.taker.status,
                        filled = %result.taker.filled_quantity,
                        quantity = %result.taker.quantity,
                        trades = persisted_trades.len(),
                        version = expected + 1,
                        "order processing complete"
                    );

                    self.publish_match_events(&result.taker, &persisted_trades, &result.makers)
                        .await;
                    self.sync_registry.register(symbol);

                    return Ok(MatchOutcome {
                        order: result.taker,
                        trades: persisted_trades,
                        makers: result.makers,
                    });
                }
                Err(err) if err.is_version_conflict() => {
                    if attempt > self.config.version_retry_max {
                        return Err(EngineError::PersistenceConflict { symbol, attempts: attempt });
                    }
                    warn!(
                        symbol = %symbol,
                        attempt,
                        "version conflict, re-reading book and re-matching"
                    );
                    let reloaded = self
                        .store
                        .find_book(&symbol)
                        .await?
                        .ok_or_else(|| StoreError::BookNotFound(symbol.clone()))?;
                    *guard = reloaded;
                    drop(guard);
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Cancel a resting or pending order on the owner's behalf
    ///
    /// Terminal orders fail deterministically; FILLED, CANCELLED, and
    /// REJECTED each report their own error.
    pub async fn cancel(&self, order_id: OrderId, user_id: UserId) -> Result<Order, EngineError> {
        let mut order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or(CancelError::NotFound(order_id))?;

        if order.user_id != user_id {
            return Err(CancelError::NotAuthorized(order_id).into());
        }
        match order.status {
            OrderStatus::Filled => return Err(CancelError::AlreadyFilled(order_id).into()),
            OrderStatus::Cancelled => return Err(CancelError::AlreadyCancelled(order_id).into()),
            OrderStatus::Rejected => return Err(CancelError::AlreadyRejected(order_id).into()),
            _ => {}
        }

        if order.status.is_resting() {
            if let Some(price) = order.price {
                self.remove_from_book(&order, price).await?;
            }
        }

        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        self.store.update_order(&order).await?;

        info!(order_id = %order_id, user_id = %user_id, "order cancelled");

        let event = OrderStatusEvent::from_order(&order, StatusReason::Cancelled);
        if let Err(e) = self.publisher.publish_status(event).await {
            warn!(order_id = %order_id, error = %e, "failed to publish cancel status");
        }

        Ok(order)
    }

    /// Aggregated depth for a symbol
    pub async fn depth(
        &self,
        symbol: &Symbol,
        limit: Option<usize>,
    ) -> Result<DepthView, EngineError> {
        let entry = self.books.get(symbol).map(|e| e.value().clone());
        if let Some(entry) = entry {
            let guard = entry.lock().await;
            return Ok(depth::aggregate(&guard, limit));
        }

        let book = self
            .store
            .find_book(symbol)
            .await
            .map_err(|e| EngineError::UpstreamUnavailable(e.to_string()))?
            .ok_or_else(|| StoreError::BookNotFound(symbol.clone()))?;
        Ok(depth::aggregate(&book, limit))
    }

    /// Read-only snapshot of the in-memory book (test and admin support)
    pub async fn book_snapshot(&self, symbol: &Symbol) -> Option<OrderBook> {
        let entry = self.books.get(symbol).map(|e| e.value().clone())?;
        let guard = entry.lock().await;
        Some(guard.clone())
    }

    /// Writer-region entry for a symbol, lazily loading the book
    async fn book_entry(&self, symbol: &Symbol) -> Result<Arc<Mutex<OrderBook>>, EngineError> {
        if let Some(entry) = self.books.get(symbol) {
            return Ok(entry.value().clone());
        }

        let book = self
            .store
            .get_or_create_book(symbol)
            .await
            .map_err(|e| EngineError::UpstreamUnavailable(e.to_string()))?;

        // Racing loaders keep the first entry; both read the same durable row
        Ok(self
            .books
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(Mutex::new(book)))
            .clone())
    }

    async fn remove_from_book(&self, order: &Order, price: types::Price) -> Result<(), EngineError> {
        let symbol = order.symbol.clone();
        let entry = self.book_entry(&symbol).await?;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let mut guard = entry.lock().await;

            let mut working = guard.clone();
            // The order may already be gone if a match consumed it concurrently
            let removed = working.remove(order.side, order.order_id, price);
            if removed.is_none() {
                debug!(order_id = %order.order_id, "order not in book at cancel time");
            }
            let expected = guard.version;
            working.updated_at = Utc::now();

            match self.store.save_book(&working, expected).await {
                Ok(()) => {
                    working.version = expected + 1;
                    *guard = working;
                    debug!(order_id = %order.order_id, symbol = %symbol, "order removed from book");
                    return Ok(());
                }
                Err(err) if err.is_version_conflict() => {
                    if attempt > self.config.version_retry_max {
                        return Err(EngineError::PersistenceConflict { symbol, attempts: attempt });
                    }
                    warn!(symbol = %symbol, attempt, "version conflict during cancel, re-reading book");
                    let reloaded = self
                        .store
                        .find_book(&symbol)
                        .await?
                        .ok_or_else(|| StoreError::BookNotFound(symbol.clone()))?;
                    *guard = reloaded;
                    drop(guard);
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Emit status and trade events after a durable commit, best effort
    async fn publish_match_events(&self, taker: &Order, trades: &[Trade], makers: &[Order]) {
        let event = OrderStatusEvent::from_order(taker, StatusReason::Matched);
        if let Err(e) = self.publisher.publish_status(event).await {
            warn!(order_id = %taker.order_id, error = %e, "failed to publish taker status");
        }

        for trade in trades {
            let event = TradeExecutedEvent::from_trade(trade, taker.order_id);
            if let Err(e) = self.publisher.publish_trade(event).await {
                warn!(
                    trade_id = ?trade.trade_id,
                    error = %e,
                    "failed to publish trade event"
                );
            }
        }

        for maker in makers {
            let event = OrderStatusEvent::from_order(maker, StatusReason::Matched);
            if let Err(e) = self.publisher.publish_status(event).await {
                warn!(order_id = %maker.order_id, error = %e, "failed to publish maker status");
            }
        }
    }
}
