//! Cache-store book mirror
//!
//! Holds each symbol's ladders in Redis under a keyed layout:
//! - `orderbook:{symbol}:{side}:prices`: sorted set of price strings; bids
//!   score `-price` and asks `+price` so the natural range order matches each
//!   side's iteration order
//! - `orderbook:{symbol}:{side}:price:{price}`: list of order ids in FIFO order
//! - `order:{order_id}`: field map of the order
//! - `orderbook:{symbol}:metadata`: field map `{version, updated_at}`
//!
//! The write path is one atomic pipeline (delete price sets and metadata,
//! re-insert everything, write metadata), so a reader observes either the
//! prior book or the fully rewritten one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};
use types::{
    Order, OrderBook, OrderId, OrderStatus, OrderType, Price, Quantity, Side, Symbol, UserId,
};

/// Errors surfaced by the cache store
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Fast mirror of per-symbol book state
#[async_trait]
pub trait BookCache: Send + Sync {
    /// Probe availability; sync ticks are skipped when this fails
    async fn ping(&self) -> bool;

    /// Atomically rewrite the symbol's cached book
    async fn save(&self, book: &OrderBook) -> Result<(), CacheError>;

    /// Load the cached book, None if the symbol has no metadata
    async fn load(&self, symbol: &Symbol) -> Result<Option<OrderBook>, CacheError>;
}

fn side_segment(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

fn prices_key(symbol: &Symbol, side: Side) -> String {
    format!("orderbook:{}:{}:prices", symbol, side_segment(side))
}

fn price_list_key(symbol: &Symbol, side: Side, price: Price) -> String {
    format!(
        "orderbook:{}:{}:price:{}",
        symbol,
        side_segment(side),
        price
    )
}

fn order_key(order_id: OrderId) -> String {
    format!("order:{order_id}")
}

fn metadata_key(symbol: &Symbol) -> String {
    format!("orderbook:{symbol}:metadata")
}

/// Sorted-set score: negated for bids so ascending score is best-first
fn price_score(price: Price, side: Side) -> Result<f64, CacheError> {
    let value = price
        .as_decimal()
        .to_f64()
        .ok_or_else(|| CacheError::Corrupt(format!("price not representable: {price}")))?;
    Ok(match side {
        Side::Buy => -value,
        Side::Sell => value,
    })
}

/// Serialize an order into cache hash fields
fn order_fields(order: &Order) -> Vec<(String, String)> {
    let mut fields = vec![
        ("order_id".into(), order.order_id.to_string()),
        ("user_id".into(), order.user_id.to_string()),
        ("symbol".into(), order.symbol.to_string()),
        ("side".into(), order.side.as_str().to_string()),
        ("order_type".into(), order.order_type.as_str().to_string()),
        ("quantity".into(), order.quantity.to_string()),
        ("filled_quantity".into(), order.filled_quantity.to_string()),
        ("status".into(), order.status.as_str().to_string()),
        ("created_at".into(), order.created_at.to_rfc3339()),
        ("updated_at".into(), order.updated_at.to_rfc3339()),
    ];
    if let Some(price) = order.price {
        fields.push(("price".into(), price.to_string()));
    }
    fields
}

fn field<'a>(map: &'a HashMap<String, String>, name: &str) -> Result<&'a str, CacheError> {
    map.get(name)
        .map(String::as_str)
        .ok_or_else(|| CacheError::Corrupt(format!("missing field: {name}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::Corrupt(format!("bad timestamp {raw}: {e}")))
}

/// Rebuild an order from cache hash fields
fn order_from_fields(map: &HashMap<String, String>) -> Result<Order, CacheError> {
    let price = match map.get("price") {
        Some(raw) => Some(
            Decimal::from_str(raw)
                .ok()
                .and_then(Price::try_new)
                .ok_or_else(|| CacheError::Corrupt(format!("bad price: {raw}")))?,
        ),
        None => None,
    };

    let quantity_raw = field(map, "quantity")?;
    let filled_raw = field(map, "filled_quantity")?;

    Ok(Order {
        order_id: OrderId::new(
            field(map, "order_id")?
                .parse::<i64>()
                .map_err(|e| CacheError::Corrupt(e.to_string()))?,
        ),
        user_id: UserId::new(
            field(map, "user_id")?
                .parse::<i64>()
                .map_err(|e| CacheError::Corrupt(e.to_string()))?,
        ),
        symbol: Symbol::try_new(field(map, "symbol")?)
            .ok_or_else(|| CacheError::Corrupt("empty symbol".into()))?,
        side: field(map, "side")?
            .parse::<Side>()
            .map_err(CacheError::Corrupt)?,
        order_type: field(map, "order_type")?
            .parse::<OrderType>()
            .map_err(CacheError::Corrupt)?,
        price,
        quantity: Decimal::from_str(quantity_raw)
            .ok()
            .and_then(Quantity::try_new)
            .ok_or_else(|| CacheError::Corrupt(format!("bad quantity: {quantity_raw}")))?,
        filled_quantity: Decimal::from_str(filled_raw)
            .ok()
            .and_then(Quantity::try_non_negative)
            .ok_or_else(|| CacheError::Corrupt(format!("bad filled: {filled_raw}")))?,
        status: field(map, "status")?
            .parse::<OrderStatus>()
            .map_err(CacheError::Corrupt)?,
        created_at: parse_timestamp(field(map, "created_at")?)?,
        updated_at: parse_timestamp(field(map, "updated_at")?)?,
    })
}

/// Redis-backed book cache
#[derive(Clone)]
pub struct RedisBookCache {
    conn: ConnectionManager,
}

impl RedisBookCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to a Redis instance
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    fn stage_side<'a>(
        pipe: &mut redis::Pipeline,
        symbol: &Symbol,
        side: Side,
        levels: impl Iterator<Item = (&'a Price, &'a types::PriceLevel)>,
    ) -> Result<(), CacheError> {
        let prices_key = prices_key(symbol, side);
        for (price, level) in levels {
            pipe.zadd(&prices_key, price.to_string(), price_score(*price, side)?)
                .ignore();

            let list_key = price_list_key(symbol, side, *price);
            pipe.del(&list_key).ignore();
            for order in level.iter() {
                pipe.rpush(&list_key, order.order_id.to_string()).ignore();
                pipe.hset_multiple(order_key(order.order_id), &order_fields(order))
                    .ignore();
            }
        }
        Ok(())
    }

    async fn load_side(
        &self,
        symbol: &Symbol,
        side: Side,
        book: &mut OrderBook,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let prices: Vec<String> = conn.zrange(prices_key(symbol, side), 0, -1).await?;

        for price_raw in prices {
            let price = Decimal::from_str(&price_raw)
                .ok()
                .and_then(Price::try_new)
                .ok_or_else(|| CacheError::Corrupt(format!("bad cached price: {price_raw}")))?;

            let order_ids: Vec<String> = conn
                .lrange(price_list_key(symbol, side, price), 0, -1)
                .await?;
            if order_ids.is_empty() {
                warn!(symbol = %symbol, side = %side, price = %price, "price level with no orders in cache");
                continue;
            }

            for id_raw in order_ids {
                let fields: HashMap<String, String> = conn
                    .hgetall(order_key(OrderId::new(
                        id_raw
                            .parse::<i64>()
                            .map_err(|e| CacheError::Corrupt(e.to_string()))?,
                    )))
                    .await?;
                if fields.is_empty() {
                    warn!(symbol = %symbol, order_id = %id_raw, "order hash missing in cache");
                    continue;
                }
                book.insert(order_from_fields(&fields)?);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BookCache for RedisBookCache {
    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "cache availability probe failed");
                false
            }
        }
    }

    async fn save(&self, book: &OrderBook) -> Result<(), CacheError> {
        let symbol = &book.symbol;
        let mut pipe = redis::pipe();
        pipe.atomic();

        // Delete price sets and metadata, then rewrite everything
        pipe.del(prices_key(symbol, Side::Buy)).ignore();
        pipe.del(prices_key(symbol, Side::Sell)).ignore();
        pipe.del(metadata_key(symbol)).ignore();

        Self::stage_side(&mut pipe, symbol, Side::Buy, book.bids.iter())?;
        Self::stage_side(&mut pipe, symbol, Side::Sell, book.asks.iter())?;

        pipe.hset_multiple(
            metadata_key(symbol),
            &[
                ("version".to_string(), book.version.to_string()),
                ("updated_at".to_string(), book.updated_at.to_rfc3339()),
            ],
        )
        .ignore();

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;

        debug!(
            symbol = %symbol,
            version = book.version,
            bid_levels = book.bids.level_count(),
            ask_levels = book.asks.level_count(),
            "book saved to cache"
        );
        Ok(())
    }

    async fn load(&self, symbol: &Symbol) -> Result<Option<OrderBook>, CacheError> {
        let mut conn = self.conn.clone();
        let metadata: HashMap<String, String> = conn.hgetall(metadata_key(symbol)).await?;
        if metadata.is_empty() {
            debug!(symbol = %symbol, "book not present in cache");
            return Ok(None);
        }

        let version = field(&metadata, "version")?
            .parse::<u64>()
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let updated_at = parse_timestamp(field(&metadata, "updated_at")?)?;

        let mut book = OrderBook::new(symbol.clone(), updated_at);
        book.version = version;
        self.load_side(symbol, Side::Buy, &mut book).await?;
        self.load_side(symbol, Side::Sell, &mut book).await?;

        debug!(symbol = %symbol, version, "book loaded from cache");
        Ok(Some(book))
    }
}

/// In-memory book cache for tests
#[derive(Debug, Default)]
pub struct MemoryBookCache {
    books: Mutex<HashMap<Symbol, OrderBook>>,
    available: AtomicBool,
}

impl MemoryBookCache {
    pub fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Flip the availability probe (simulates an unreachable cache)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of cached books (test support)
    pub fn len(&self) -> usize {
        self.books.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BookCache for MemoryBookCache {
    async fn ping(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn save(&self, book: &OrderBook) -> Result<(), CacheError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::Corrupt("cache unavailable".into()));
        }
        self.books
            .lock()
            .unwrap()
            .insert(book.symbol.clone(), book.clone());
        Ok(())
    }

    async fn load(&self, symbol: &Symbol) -> Result<Option<OrderBook>, CacheError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CacheError::Corrupt("cache unavailable".into()));
        }
        Ok(self.books.lock().unwrap().get(symbol).cloned())
    }
}
