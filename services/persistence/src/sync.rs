//! Scheduled cache sync
//!
//! Symbols are registered on their first match and re-pushed to the cache on
//! a fixed cadence: a tick every 5 seconds after a 10 second warmup. Each
//! tick probes cache availability first and skips the cycle when the cache is
//! unreachable, so a cache outage degrades to primary-store reads only.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use types::Symbol;

use crate::cache::BookCache;
use crate::store::PrimaryStore;

/// Set of symbols that participate in periodic cache sync
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    symbols: DashMap<Symbol, ()>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a symbol; idempotent. Returns true the first time.
    pub fn register(&self, symbol: Symbol) -> bool {
        let is_new = self.symbols.insert(symbol.clone(), ()).is_none();
        if is_new {
            info!(symbol = %symbol, "registered symbol for cache sync");
        }
        is_new
    }

    /// Remove a symbol from periodic sync
    pub fn unregister(&self, symbol: &Symbol) -> bool {
        self.symbols.remove(symbol).is_some()
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Stable snapshot of the registered symbols
    pub fn snapshot(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> =
            self.symbols.iter().map(|entry| entry.key().clone()).collect();
        symbols.sort();
        symbols
    }
}

/// Cadence of the scheduled push
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
    pub initial_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            initial_delay: Duration::from_secs(10),
        }
    }
}

/// Outcome of one sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStats {
    /// Tick skipped because the cache probe failed
    pub skipped: bool,
    pub success: usize,
    pub errors: usize,
}

/// Pushes registered symbols' primary-store books into the cache
pub struct BookSyncService {
    store: Arc<dyn PrimaryStore>,
    cache: Arc<dyn BookCache>,
    registry: Arc<SymbolRegistry>,
    config: SyncConfig,
}

impl BookSyncService {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        cache: Arc<dyn BookCache>,
        registry: Arc<SymbolRegistry>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            config,
        }
    }

    /// Run one sync cycle over every registered symbol
    pub async fn sync_once(&self) -> SyncStats {
        if self.registry.is_empty() {
            debug!("no active symbols to sync");
            return SyncStats::default();
        }

        if !self.cache.ping().await {
            warn!("cache unavailable, skipping sync cycle");
            return SyncStats {
                skipped: true,
                ..SyncStats::default()
            };
        }

        let mut stats = SyncStats::default();
        for symbol in self.registry.snapshot() {
            match self.store.find_book(&symbol).await {
                Ok(Some(book)) => match self.cache.save(&book).await {
                    Ok(()) => stats.success += 1,
                    Err(e) => {
                        error!(symbol = %symbol, error = %e, "error syncing book to cache");
                        stats.errors += 1;
                    }
                },
                Ok(None) => {
                    warn!(symbol = %symbol, "book missing from primary store during sync");
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "error loading book during sync");
                    stats.errors += 1;
                }
            }
        }

        if stats.success > 0 || stats.errors > 0 {
            info!(
                success = stats.success,
                errors = stats.errors,
                active_symbols = self.registry.len(),
                "cache sync cycle complete"
            );
        }
        stats
    }

    /// Run the scheduler loop: initial delay, then a fixed-interval tick
    pub async fn run(&self) {
        tokio::time::sleep(self.config.initial_delay).await;
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            self.sync_once().await;
        }
    }

    /// Spawn the scheduler onto the runtime
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBookCache;
    use crate::memory::MemoryStore;
    use chrono::Utc;
    use types::OrderBook;

    fn service(
        store: Arc<MemoryStore>,
        cache: Arc<MemoryBookCache>,
        registry: Arc<SymbolRegistry>,
    ) -> BookSyncService {
        BookSyncService::new(store, cache, registry, SyncConfig::default())
    }

    #[test]
    fn test_registry_idempotent() {
        let registry = SymbolRegistry::new();
        assert!(registry.register(Symbol::new("BTC-USD")));
        assert!(!registry.register(Symbol::new("BTC-USD")));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(&Symbol::new("BTC-USD")));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_sync_pushes_registered_symbols() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryBookCache::new());
        let registry = Arc::new(SymbolRegistry::new());

        let symbol = Symbol::new("BTC-USD");
        store.put_book(OrderBook::new(symbol.clone(), Utc::now()));
        registry.register(symbol.clone());

        let stats = service(store, cache.clone(), registry).sync_once().await;
        assert_eq!(stats.success, 1);
        assert_eq!(stats.errors, 0);
        assert!(!stats.skipped);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_skips_when_cache_down() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryBookCache::new());
        let registry = Arc::new(SymbolRegistry::new());

        store.put_book(OrderBook::new(Symbol::new("BTC-USD"), Utc::now()));
        registry.register(Symbol::new("BTC-USD"));
        cache.set_available(false);

        let stats = service(store, cache.clone(), registry).sync_once().await;
        assert!(stats.skipped);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn test_sync_noop_without_registrations() {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryBookCache::new());
        let registry = Arc::new(SymbolRegistry::new());

        let stats = service(store, cache, registry).sync_once().await;
        assert_eq!(stats, SyncStats::default());
    }
}
