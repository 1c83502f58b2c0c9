//! Idempotency store
//!
//! Two keyed sets guard the at-least-once stream: "sent" entries written by
//! the upstream producer before publishing, and "processed" entries written
//! by the ingress dispatcher after a successful match. Entries expire after
//! 24 hours; the store is advisory, because a duplicate that slips past an
//! expired entry finds its order already non-PENDING and short-circuits.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use types::{MessageId, OrderId};

use crate::cache::CacheError;

/// TTL applied to sent/processed entries
pub const IDEMPOTENCY_TTL_SECS: u64 = 86_400;

const SENT_PREFIX: &str = "idempotency:sent:";
const PROCESSED_PREFIX: &str = "idempotency:processed:";

/// Duplicate-suppression bookkeeping for stream messages
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Record a message as sent (producer side, before publish)
    async fn record_sent(
        &self,
        message_id: MessageId,
        order_id: OrderId,
    ) -> Result<(), CacheError>;

    /// Remove a sent record (publish failed, allow the producer to retry)
    async fn remove_sent(&self, message_id: MessageId) -> Result<(), CacheError>;

    /// Check whether a message was sent
    async fn is_sent(&self, message_id: MessageId) -> Result<bool, CacheError>;

    /// Mark a message processed (consumer side, after a successful match)
    async fn mark_processed(
        &self,
        message_id: MessageId,
        order_id: OrderId,
    ) -> Result<(), CacheError>;

    /// Check whether a message was already processed
    async fn is_processed(&self, message_id: MessageId) -> Result<bool, CacheError>;
}

/// Redis-backed idempotency store
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    conn: ConnectionManager,
    ttl_secs: u64,
}

impl RedisIdempotencyStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            ttl_secs: IDEMPOTENCY_TTL_SECS,
        }
    }

    pub fn with_ttl(conn: ConnectionManager, ttl_secs: u64) -> Self {
        Self { conn, ttl_secs }
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn record_sent(
        &self,
        message_id: MessageId,
        order_id: OrderId,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(
                format!("{SENT_PREFIX}{message_id}"),
                order_id.to_string(),
                self.ttl_secs,
            )
            .await?;
        debug!(message_id = %message_id, order_id = %order_id, "recorded message sent");
        Ok(())
    }

    async fn remove_sent(&self, message_id: MessageId) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let () = conn.del(format!("{SENT_PREFIX}{message_id}")).await?;
        debug!(message_id = %message_id, "removed message sent record");
        Ok(())
    }

    async fn is_sent(&self, message_id: MessageId) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(format!("{SENT_PREFIX}{message_id}")).await?)
    }

    async fn mark_processed(
        &self,
        message_id: MessageId,
        order_id: OrderId,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let () = conn
            .set_ex(
                format!("{PROCESSED_PREFIX}{message_id}"),
                order_id.to_string(),
                self.ttl_secs,
            )
            .await?;
        debug!(message_id = %message_id, order_id = %order_id, "marked message processed");
        Ok(())
    }

    async fn is_processed(&self, message_id: MessageId) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let processed: bool = conn.exists(format!("{PROCESSED_PREFIX}{message_id}")).await?;
        if processed {
            warn!(message_id = %message_id, "duplicate message detected (already processed)");
        }
        Ok(processed)
    }
}

/// In-memory idempotency store for tests, with real TTL expiry
#[derive(Debug)]
pub struct MemoryIdempotencyStore {
    entries: Mutex<HashMap<String, (OrderId, Instant)>>,
    ttl: Duration,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(IDEMPOTENCY_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn put(&self, key: String, order_id: OrderId) {
        self.entries
            .lock()
            .unwrap()
            .insert(key, (order_id, Instant::now()));
    }

    /// Live entries across both sets (test support)
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap();
        entries
            .values()
            .filter(|(_, inserted)| inserted.elapsed() < self.ttl)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, inserted)) if inserted.elapsed() < self.ttl => true,
            Some(_) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }
}

impl Default for MemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn record_sent(
        &self,
        message_id: MessageId,
        order_id: OrderId,
    ) -> Result<(), CacheError> {
        self.put(format!("{SENT_PREFIX}{message_id}"), order_id);
        Ok(())
    }

    async fn remove_sent(&self, message_id: MessageId) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap()
            .remove(&format!("{SENT_PREFIX}{message_id}"));
        Ok(())
    }

    async fn is_sent(&self, message_id: MessageId) -> Result<bool, CacheError> {
        Ok(self.contains(&format!("{SENT_PREFIX}{message_id}")))
    }

    async fn mark_processed(
        &self,
        message_id: MessageId,
        order_id: OrderId,
    ) -> Result<(), CacheError> {
        self.put(format!("{PROCESSED_PREFIX}{message_id}"), order_id);
        Ok(())
    }

    async fn is_processed(&self, message_id: MessageId) -> Result<bool, CacheError> {
        Ok(self.contains(&format!("{PROCESSED_PREFIX}{message_id}")))
    }
}
