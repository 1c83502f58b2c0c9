//! Postgres-backed primary store
//!
//! Orders and trades use BIGSERIAL identities; the book row keeps both
//! ladders as serialized JSON documents next to the optimistic version
//! column. The conditional update predicate `version = $expected` is the
//! only concurrency control on the row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use types::{
    AskLadder, BidLadder, Order, OrderBook, OrderId, OrderStatus, OrderType, Price, Quantity,
    Side, Symbol, Trade, TradeId, UserId,
};

use crate::store::{PrimaryStore, StoreError};

/// Primary store over a Postgres connection pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
        let side: String = row.try_get("side")?;
        let order_type: String = row.try_get("order_type")?;
        let status: String = row.try_get("status")?;
        let price: Option<Decimal> = row.try_get("price")?;
        let quantity: Decimal = row.try_get("quantity")?;
        let filled: Decimal = row.try_get("filled_quantity")?;

        Ok(Order {
            order_id: OrderId::new(row.try_get::<i64, _>("id")?),
            user_id: UserId::new(row.try_get::<i64, _>("user_id")?),
            symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
            side: side.parse::<Side>().map_err(StoreError::Serialization)?,
            order_type: order_type
                .parse::<OrderType>()
                .map_err(StoreError::Serialization)?,
            price: price
                .map(|p| {
                    Price::try_new(p)
                        .ok_or_else(|| StoreError::Serialization(format!("bad price: {p}")))
                })
                .transpose()?,
            quantity: Quantity::try_new(quantity)
                .ok_or_else(|| StoreError::Serialization(format!("bad quantity: {quantity}")))?,
            filled_quantity: Quantity::try_non_negative(filled)
                .ok_or_else(|| StoreError::Serialization(format!("bad filled: {filled}")))?,
            status: status
                .parse::<OrderStatus>()
                .map_err(StoreError::Serialization)?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn trade_from_row(row: &PgRow) -> Result<Trade, StoreError> {
        let price: Decimal = row.try_get("price")?;
        let quantity: Decimal = row.try_get("quantity")?;

        Ok(Trade {
            trade_id: Some(TradeId::new(row.try_get::<i64, _>("id")?)),
            buy_order_id: OrderId::new(row.try_get::<i64, _>("buy_order_id")?),
            sell_order_id: OrderId::new(row.try_get::<i64, _>("sell_order_id")?),
            symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
            price: Price::try_new(price)
                .ok_or_else(|| StoreError::Serialization(format!("bad price: {price}")))?,
            quantity: Quantity::try_new(quantity)
                .ok_or_else(|| StoreError::Serialization(format!("bad quantity: {quantity}")))?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    fn book_from_row(row: &PgRow) -> Result<OrderBook, StoreError> {
        let bids: BidLadder = serde_json::from_str(&row.try_get::<String, _>("bids")?)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let asks: AskLadder = serde_json::from_str(&row.try_get::<String, _>("asks")?)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(OrderBook {
            symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
            bids,
            asks,
            version: row.try_get::<i64, _>("version")? as u64,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn ladders_to_json(book: &OrderBook) -> Result<(String, String), StoreError> {
        let bids = serde_json::to_string(&book.bids)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let asks = serde_json::to_string(&book.asks)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok((bids, asks))
    }
}

#[async_trait]
impl PrimaryStore for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<Order, StoreError> {
        let row = sqlx::query(
            r"
            INSERT INTO orders (
                user_id, symbol, side, order_type, price, quantity,
                filled_quantity, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            ",
        )
        .bind(order.user_id.as_i64())
        .bind(order.symbol.as_str())
        .bind(order.side.as_str())
        .bind(order.order_type.as_str())
        .bind(order.price.map(|p| p.as_decimal()))
        .bind(order.quantity.as_decimal())
        .bind(order.filled_quantity.as_decimal())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await?;

        let mut inserted = order.clone();
        inserted.order_id = OrderId::new(row.try_get::<i64, _>("id")?);
        debug!(order_id = %inserted.order_id, symbol = %inserted.symbol, "order inserted");
        Ok(inserted)
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::order_from_row).transpose()
    }

    async fn update_order(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE orders
            SET filled_quantity = $1, status = $2, updated_at = $3
            WHERE id = $4
            ",
        )
        .bind(order.filled_quantity.as_decimal())
        .bind(order.status.as_str())
        .bind(order.updated_at)
        .bind(order.order_id.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order.order_id));
        }
        Ok(())
    }

    async fn find_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query("SELECT * FROM orders WHERE user_id = $1 ORDER BY id")
            .bind(user_id.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::order_from_row).collect()
    }

    async fn find_orders_by_symbol_status(
        &self,
        symbol: &Symbol,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM orders WHERE symbol = $1 AND status = $2 ORDER BY id")
                .bind(symbol.as_str())
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(Self::order_from_row).collect()
    }

    async fn find_trade(&self, trade_id: TradeId) -> Result<Option<Trade>, StoreError> {
        let row = sqlx::query("SELECT * FROM trades WHERE id = $1")
            .bind(trade_id.as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::trade_from_row).transpose()
    }

    async fn find_trades_by_order(&self, order_id: OrderId) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM trades WHERE buy_order_id = $1 OR sell_order_id = $1 ORDER BY id",
        )
        .bind(order_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::trade_from_row).collect()
    }

    async fn find_trades_by_symbol(
        &self,
        symbol: &Symbol,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Trade>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT * FROM trades
            WHERE symbol = $1 AND created_at >= $2 AND created_at <= $3
            ORDER BY created_at
            ",
        )
        .bind(symbol.as_str())
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::trade_from_row).collect()
    }

    async fn find_book(&self, symbol: &Symbol) -> Result<Option<OrderBook>, StoreError> {
        let row = sqlx::query("SELECT * FROM order_books WHERE symbol = $1")
            .bind(symbol.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::book_from_row).transpose()
    }

    async fn get_or_create_book(&self, symbol: &Symbol) -> Result<OrderBook, StoreError> {
        if let Some(book) = self.find_book(symbol).await? {
            return Ok(book);
        }

        let fresh = OrderBook::new(symbol.clone(), Utc::now());
        let (bids, asks) = Self::ladders_to_json(&fresh)?;

        // Concurrent creators race benignly: ON CONFLICT keeps the first row
        sqlx::query(
            r"
            INSERT INTO order_books (symbol, bids, asks, version, updated_at)
            VALUES ($1, $2, $3, 0, $4)
            ON CONFLICT (symbol) DO NOTHING
            ",
        )
        .bind(symbol.as_str())
        .bind(bids)
        .bind(asks)
        .bind(fresh.updated_at)
        .execute(&self.pool)
        .await?;

        info!(symbol = %symbol, "created order book row");
        self.find_book(symbol)
            .await?
            .ok_or_else(|| StoreError::BookNotFound(symbol.clone()))
    }

    async fn save_book(&self, book: &OrderBook, expected: u64) -> Result<(), StoreError> {
        let (bids, asks) = Self::ladders_to_json(book)?;

        let result = sqlx::query(
            r"
            UPDATE order_books
            SET bids = $1, asks = $2, version = $3, updated_at = $4
            WHERE symbol = $5 AND version = $6
            ",
        )
        .bind(bids)
        .bind(asks)
        .bind((expected + 1) as i64)
        .bind(book.updated_at)
        .bind(book.symbol.as_str())
        .bind(expected as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(symbol = %book.symbol, expected, "optimistic lock conflict on book row");
            return Err(StoreError::VersionConflict {
                symbol: book.symbol.clone(),
                expected,
            });
        }
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
        let (bids, asks) = Self::ladders_to_json(book)?;
        let mut tx = self.pool.begin().await?;

        for order in std::iter::once(taker).chain(makers.iter()) {
            sqlx::query(
                r"
                UPDATE orders
                SET filled_quantity = $1, status = $2, updated_at = $3
                WHERE id = $4
                ",
            )
            .bind(order.filled_quantity.as_decimal())
            .bind(order.status.as_str())
            .bind(order.updated_at)
            .bind(order.order_id.as_i64())
            .execute(&mut *tx)
            .await?;
        }

        let mut persisted = Vec::with_capacity(trades.len());
        for mut trade in trades {
            let row = sqlx::query(
                r"
                INSERT INTO trades (
                    buy_order_id, sell_order_id, symbol, price, quantity, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id
                ",
            )
            .bind(trade.buy_order_id.as_i64())
            .bind(trade.sell_order_id.as_i64())
            .bind(trade.symbol.as_str())
            .bind(trade.price.as_decimal())
            .bind(trade.quantity.as_decimal())
            .bind(trade.created_at)
            .fetch_one(&mut *tx)
            .await?;

            trade.trade_id = Some(TradeId::new(row.try_get::<i64, _>("id")?));
            persisted.push(trade);
        }

        let result = sqlx::query(
            r"
            UPDATE order_books
            SET bids = $1, asks = $2, version = $3, updated_at = $4
            WHERE symbol = $5 AND version = $6
            ",
        )
        .bind(bids)
        .bind(asks)
        .bind((expected + 1) as i64)
        .bind(book.updated_at)
        .bind(book.symbol.as_str())
        .bind(expected as i64)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls everything back
            warn!(symbol = %book.symbol, expected, "optimistic lock conflict on match commit");
            return Err(StoreError::VersionConflict {
                symbol: book.symbol.clone(),
                expected,
            });
        }

        tx.commit().await?;
        debug!(
            symbol = %book.symbol,
            taker = %taker.order_id,
            makers = makers.len(),
            trades = persisted.len(),
            version = expected + 1,
            "match result committed"
        );
        Ok(persisted)
    }

    async fn book_symbols(&self) -> Result<Vec<Symbol>, StoreError> {
        let rows = sqlx::query("SELECT symbol FROM order_books ORDER BY symbol")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| Ok(Symbol::new(row.try_get::<String, _>("symbol")?)))
            .collect()
    }
}

/// Create the tables used by the primary store
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS orders (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            order_type TEXT NOT NULL,
            price NUMERIC,
            quantity NUMERIC NOT NULL,
            filled_quantity NUMERIC NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_symbol_status ON orders (symbol, status)")
        .execute(pool)
        .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS trades (
            id BIGSERIAL PRIMARY KEY,
            buy_order_id BIGINT NOT NULL,
            sell_order_id BIGINT NOT NULL,
            symbol TEXT NOT NULL,
            price NUMERIC NOT NULL,
            quantity NUMERIC NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades (symbol, created_at)")
        .execute(pool)
        .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS order_books (
            symbol TEXT PRIMARY KEY,
            bids TEXT NOT NULL,
            asks TEXT NOT NULL,
            version BIGINT NOT NULL DEFAULT 0,
            updated_at TIMESTAMPTZ NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    info!("primary store migrations applied");
    Ok(())
}
