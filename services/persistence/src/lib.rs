//! Persistence for the spot matching core
//!
//! Two tiers back the in-memory books:
//! - the **primary store** (Postgres): orders, trades, and one book row per
//!   symbol guarded by an optimistic version column;
//! - the **cache store** (Redis): a fast ladder mirror under a keyed layout,
//!   refreshed by a scheduler and reconciled against the primary at boot.
//!
//! The idempotency layer lives here too: sent/processed message ids with a
//! 24 hour TTL, shared by the upstream producer and the ingress dispatcher.
//!
//! Every backend is reachable through a trait so the matching and order-flow
//! services can run against in-memory implementations in tests.

pub mod cache;
pub mod idempotency;
pub mod memory;
pub mod postgres;
pub mod recovery;
pub mod store;
pub mod sync;

pub use cache::{BookCache, CacheError, MemoryBookCache, RedisBookCache};
pub use idempotency::{IdempotencyStore, MemoryIdempotencyStore, RedisIdempotencyStore};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use recovery::{RecoveryReport, RecoveryRunner};
pub use store::{PrimaryStore, StoreError};
pub use sync::{BookSyncService, SymbolRegistry, SyncConfig, SyncStats};
