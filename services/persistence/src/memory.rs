//! In-memory primary store
//!
//! Mirrors the Postgres store's semantics, including identity assignment and
//! the conditional book update, so the matching and order-flow services can
//! be exercised without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use types::{Order, OrderBook, OrderId, OrderStatus, Symbol, Trade, TradeId, UserId};

use crate::store::{PrimaryStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    trades: Vec<Trade>,
    books: HashMap<Symbol, OrderBook>,
    next_order_id: i64,
    next_trade_id: i64,
}

/// In-memory store with the same observable behavior as the Postgres backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted trades, in insertion order (test support)
    pub fn trades(&self) -> Vec<Trade> {
        self.inner.lock().unwrap().trades.clone()
    }

    /// Number of persisted trades (test support)
    pub fn trade_count(&self) -> usize {
        self.inner.lock().unwrap().trades.len()
    }

    /// Directly install a book row (test support)
    pub fn put_book(&self, book: OrderBook) {
        let mut inner = self.inner.lock().unwrap();
        inner.books.insert(book.symbol.clone(), book);
    }
}

#[async_trait]
impl PrimaryStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_order_id += 1;
        let mut inserted = order.clone();
        inserted.order_id = OrderId::new(inner.next_order_id);
        inner.orders.insert(inserted.order_id, inserted.clone());
        Ok(inserted)
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.lock().unwrap().orders.get(&order_id).cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.orders.get_mut(&order.order_id) {
            Some(stored) => {
                *stored = order.clone();
                Ok(())
            }
            None => Err(StoreError::OrderNotFound(order.order_id)),
        }
    }

    async fn find_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.order_id);
        Ok(orders)
    }

    async fn find_orders_by_symbol_status(
        &self,
        symbol: &Symbol,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| &order.symbol == symbol && order.status == status)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.order_id);
        Ok(orders)
    }

    async fn find_trade(&self, trade_id: TradeId) -> Result<Option<Trade>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .trades
            .iter()
            .find(|trade| trade.trade_id == Some(trade_id))
            .cloned())
    }

    async fn find_trades_by_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .trades
            .iter()
            .filter(|trade| trade.buy_order_id == order_id || trade.sell_order_id == order_id)
            .cloned()
            .collect())
    }

    async fn find_trades_by_symbol(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .trades
            .iter()
            .filter(|trade| {
                &trade.symbol == symbol && trade.created_at >= start && trade.created_at <= end
            })
            .cloned()
            .collect())
    }

    async fn find_book(&self, symbol: &Symbol) -> Result<Option<OrderBook>, StoreError> {
        Ok(self.inner.lock().unwrap().books.get(symbol).cloned())
    }

    async fn get_or_create_book(&self, symbol: &Symbol) -> Result<OrderBook, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .books
            .entry(symbol.clone())
            .or_insert_with(|| OrderBook::new(symbol.clone(), chrono::Utc::now()))
            .clone())
    }

    async fn save_book(&self, book: &OrderBook, expected: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .books
            .get_mut(&book.symbol)
            .ok_or_else(|| StoreError::BookNotFound(book.symbol.clone()))?;

        if stored.version != expected {
            return Err(StoreError::VersionConflict {
                symbol: book.symbol.clone(),
                expected,
            });
        }

        *stored = book.clone();
        stored.version = expected + 1;
        Ok(())
    }

    async fn commit_match(
        &self,
        taker: &Order,
        makers: &[Order],
        trades: Vec<Trade>,
        book: &OrderBook,
        expected: u64,
    ) -> Result<Vec<Trade>, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        // Version check first: a conflict must leave nothing behind
        let stored_version = inner
            .books
            .get(&book.symbol)
            .ok_or_else(|| StoreError::BookNotFound(book.symbol.clone()))?
            .version;
        if stored_version != expected {
            return Err(StoreError::VersionConflict {
                symbol: book.symbol.clone(),
                expected,
            });
        }

        for order in std::iter::once(taker).chain(makers.iter()) {
            inner.orders.insert(order.order_id, order.clone());
        }

        let mut persisted = Vec::with_capacity(trades.len());
        for mut trade in trades {
            inner.next_trade_id += 1;
            trade.trade_id = Some(TradeId::new(inner.next_trade_id));
            inner.trades.push(trade.clone());
            persisted.push(trade);
        }

        let mut saved = book.clone();
        saved.version = expected + 1;
        inner.books.insert(book.symbol.clone(), saved);

        Ok(persisted)
    }

    async fn book_symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        let mut symbols: Vec<Symbol> =
            self.inner.lock().unwrap().books.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use types::{OrderType, Price, Quantity, Side, UserId};

    fn pending_order(symbol: &str) -> Order {
        Order::new_pending(
            UserId::new(1),
            Symbol::new(symbol),
            Side::Buy,
            OrderType::Limit,
            Some(Price::from_u64(50000)),
            Quantity::from_str("1.0").unwrap(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_assigns_monotone_ids() {
        let store = MemoryStore::new();
        let first = store.insert_order(&pending_order("BTC-USD")).await.unwrap();
        let second = store.insert_order(&pending_order("BTC-USD")).await.unwrap();

        assert!(first.order_id.is_assigned());
        assert!(second.order_id > first.order_id);
    }

    #[tokio::test]
    async fn test_find_missing_order() {
        let store = MemoryStore::new();
        assert!(store.find_order(OrderId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_book_is_lazy() {
        let store = MemoryStore::new();
        let symbol = Symbol::new("BTC-USD");

        assert!(store.find_book(&symbol).await.unwrap().is_none());
        let book = store.get_or_create_book(&symbol).await.unwrap();
        assert_eq!(book.version, 0);
        assert!(store.find_book(&symbol).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_book_version_gate() {
        let store = MemoryStore::new();
        let symbol = Symbol::new("BTC-USD");
        let book = store.get_or_create_book(&symbol).await.unwrap();

        store.save_book(&book, 0).await.unwrap();
        assert_eq!(store.find_book(&symbol).await.unwrap().unwrap().version, 1);

        // Stale expected version is rejected
        let err = store.save_book(&book, 0).await.unwrap_err();
        assert!(err.is_version_conflict());
    }

    #[tokio::test]
    async fn test_commit_match_conflict_leaves_state_untouched() {
        let store = MemoryStore::new();
        let symbol = Symbol::new("BTC-USD");
        let book = store.get_or_create_book(&symbol).await.unwrap();
        let taker = store.insert_order(&pending_order("BTC-USD")).await.unwrap();

        let trade = Trade::new(
            taker.order_id,
            OrderId::new(7),
            symbol.clone(),
            Price::from_u64(50000),
            Quantity::from_str("1.0").unwrap(),
            Utc::now(),
        );

        let err = store
            .commit_match(&taker, &[], vec![trade], &book, 5)
            .await
            .unwrap_err();
        assert!(err.is_version_conflict());
        assert_eq!(store.trade_count(), 0);
        assert_eq!(store.find_book(&symbol).await.unwrap().unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_commit_match_assigns_trade_ids_and_bumps_version() {
        let store = MemoryStore::new();
        let symbol = Symbol::new("BTC-USD");
        let book = store.get_or_create_book(&symbol).await.unwrap();
        let taker = store.insert_order(&pending_order("BTC-USD")).await.unwrap();

        let trade = Trade::new(
            taker.order_id,
            OrderId::new(7),
            symbol.clone(),
            Price::from_u64(50000),
            Quantity::from_str("1.0").unwrap(),
            Utc::now(),
        );

        let persisted = store
            .commit_match(&taker, &[], vec![trade], &book, 0)
            .await
            .unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(persisted[0].trade_id.is_some());
        assert_eq!(store.find_book(&symbol).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_order_queries() {
        let store = MemoryStore::new();
        let first = store.insert_order(&pending_order("BTC-USD")).await.unwrap();
        let mut second = pending_order("ETH-USD");
        second.user_id = UserId::new(2);
        let second = store.insert_order(&second).await.unwrap();

        let user_orders = store.find_orders_by_user(UserId::new(1)).await.unwrap();
        assert_eq!(user_orders.len(), 1);
        assert_eq!(user_orders[0].order_id, first.order_id);

        let pending = store
            .find_orders_by_symbol_status(&Symbol::new("ETH-USD"), types::OrderStatus::Pending)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id, second.order_id);

        let none = store
            .find_orders_by_symbol_status(&Symbol::new("ETH-USD"), types::OrderStatus::Filled)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_trade_queries() {
        let store = MemoryStore::new();
        let symbol = Symbol::new("BTC-USD");
        let book = store.get_or_create_book(&symbol).await.unwrap();
        let taker = store.insert_order(&pending_order("BTC-USD")).await.unwrap();

        let created_at = Utc::now();
        let trade = Trade::new(
            taker.order_id,
            OrderId::new(77),
            symbol.clone(),
            Price::from_u64(50000),
            Quantity::from_str("1.0").unwrap(),
            created_at,
        );
        let persisted = store
            .commit_match(&taker, &[], vec![trade], &book, 0)
            .await
            .unwrap();
        let trade_id = persisted[0].trade_id.unwrap();

        assert!(store.find_trade(trade_id).await.unwrap().is_some());
        assert!(store.find_trade(TradeId::new(999)).await.unwrap().is_none());

        let by_order = store.find_trades_by_order(taker.order_id).await.unwrap();
        assert_eq!(by_order.len(), 1);
        let by_maker_side = store.find_trades_by_order(OrderId::new(77)).await.unwrap();
        assert_eq!(by_maker_side.len(), 1);

        let window = store
            .find_trades_by_symbol(
                &symbol,
                created_at - chrono::Duration::seconds(1),
                created_at + chrono::Duration::seconds(1),
            )
            .await
            .unwrap();
        assert_eq!(window.len(), 1);

        let outside = store
            .find_trades_by_symbol(
                &symbol,
                created_at + chrono::Duration::seconds(10),
                created_at + chrono::Duration::seconds(20),
            )
            .await
            .unwrap();
        assert!(outside.is_empty());
    }

    #[tokio::test]
    async fn test_book_symbols_sorted() {
        let store = MemoryStore::new();
        store.get_or_create_book(&Symbol::new("ETH-USD")).await.unwrap();
        store.get_or_create_book(&Symbol::new("BTC-USD")).await.unwrap();

        let symbols = store.book_symbols().await.unwrap();
        assert_eq!(
            symbols,
            vec![Symbol::new("BTC-USD"), Symbol::new("ETH-USD")]
        );
    }
}
