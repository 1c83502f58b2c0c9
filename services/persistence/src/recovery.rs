//! Boot-time book recovery
//!
//! Runs once before ingress is enabled. For every symbol in the primary
//! store, the primary and cached copies are compared by version (tie broken
//! by `updated_at`) and the older side is overwritten by the newer one. A
//! cache that is unreachable skips recovery entirely; matching then runs off
//! the primary store alone.

use std::sync::Arc;
use tracing::{error, info, warn};
use types::{OrderBook, Symbol};

use crate::cache::BookCache;
use crate::store::{PrimaryStore, StoreError};
use crate::sync::SymbolRegistry;

/// Outcome of a recovery pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryReport {
    /// Recovery skipped because the cache probe failed
    pub cache_unavailable: bool,
    /// Symbols pushed primary -> cache
    pub pushed_to_cache: usize,
    /// Symbols written cache -> primary
    pub written_back: usize,
    pub errors: usize,
}

enum NewerSide {
    Primary,
    Cache,
}

/// Reconciles primary and cache book copies at startup
pub struct RecoveryRunner {
    store: Arc<dyn PrimaryStore>,
    cache: Arc<dyn BookCache>,
    registry: Arc<SymbolRegistry>,
}

impl RecoveryRunner {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        cache: Arc<dyn BookCache>,
        registry: Arc<SymbolRegistry>,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
        }
    }

    /// Run recovery across every symbol known to the primary store
    pub async fn run(&self) -> Result<RecoveryReport, StoreError> {
        info!("starting order book recovery");

        if !self.cache.ping().await {
            warn!("cache unavailable, skipping recovery; primary store is authoritative");
            return Ok(RecoveryReport {
                cache_unavailable: true,
                ..RecoveryReport::default()
            });
        }

        let symbols = self.store.book_symbols().await?;
        if symbols.is_empty() {
            info!("no order books in primary store, nothing to recover");
            return Ok(RecoveryReport::default());
        }

        let mut report = RecoveryReport::default();
        for symbol in symbols {
            match self.recover_symbol(&symbol).await {
                Ok(NewerSide::Primary) => report.pushed_to_cache += 1,
                Ok(NewerSide::Cache) => report.written_back += 1,
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "failed to recover order book");
                    report.errors += 1;
                }
            }
        }

        info!(
            pushed_to_cache = report.pushed_to_cache,
            written_back = report.written_back,
            errors = report.errors,
            "order book recovery complete"
        );
        Ok(report)
    }

    async fn recover_symbol(&self, symbol: &Symbol) -> Result<NewerSide, StoreError> {
        let primary = self.store.find_book(symbol).await?;
        // A corrupt cache entry degrades to "no cache copy"
        let cached = match self.cache.load(symbol).await {
            Ok(book) => book,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "cache copy unreadable, treating as absent");
                None
            }
        };

        let outcome = match (primary, cached) {
            (Some(primary), Some(cached)) => {
                if Self::cache_is_newer(&primary, &cached) {
                    info!(
                        symbol = %symbol,
                        cache_version = cached.version,
                        primary_version = primary.version,
                        "cache copy is newer, writing back to primary"
                    );
                    self.write_back(cached, primary.version).await?;
                    NewerSide::Cache
                } else {
                    info!(
                        symbol = %symbol,
                        primary_version = primary.version,
                        cache_version = cached.version,
                        "primary copy is newer, pushing to cache"
                    );
                    self.push_to_cache(&primary).await?;
                    NewerSide::Primary
                }
            }
            (Some(primary), None) => {
                self.push_to_cache(&primary).await?;
                NewerSide::Primary
            }
            (None, Some(cached)) => {
                warn!(symbol = %symbol, "primary has no book row, adopting cache copy");
                let existing = self.store.get_or_create_book(symbol).await?;
                self.write_back(cached, existing.version).await?;
                NewerSide::Cache
            }
            (None, None) => {
                warn!(symbol = %symbol, "neither primary nor cache holds data");
                NewerSide::Primary
            }
        };

        self.registry.register(symbol.clone());
        Ok(outcome)
    }

    fn cache_is_newer(primary: &OrderBook, cached: &OrderBook) -> bool {
        if cached.version != primary.version {
            return cached.version > primary.version;
        }
        // Versions equal: updated_at breaks the tie, cache wins on equality
        cached.updated_at >= primary.updated_at
    }

    async fn push_to_cache(&self, book: &OrderBook) -> Result<(), StoreError> {
        if let Err(e) = self.cache.save(book).await {
            // Cache writes stay best-effort even during recovery
            warn!(symbol = %book.symbol, error = %e, "failed to push book to cache");
        }
        Ok(())
    }

    /// Adopt the cached ladders into the primary row
    ///
    /// The incoming copy takes the existing row's identity and current
    /// version, then goes through the conditional update (which bumps the
    /// version by one).
    async fn write_back(&self, mut cached: OrderBook, current: u64) -> Result<(), StoreError> {
        cached.version = current;
        self.store.save_book(&cached, current).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBookCache;
    use crate::memory::MemoryStore;
    use chrono::{Duration as ChronoDuration, Utc};
    use types::{Order, OrderId, OrderStatus, OrderType, Price, Quantity, Side, UserId};

    fn resting(id: i64, price: u64, qty: &str) -> Order {
        let mut order = Order::new_pending(
            UserId::new(1),
            Symbol::new("BTC-USD"),
            Side::Sell,
            OrderType::Limit,
            Some(Price::from_u64(price)),
            Quantity::from_str(qty).unwrap(),
            Utc::now(),
        );
        order.order_id = OrderId::new(id);
        order.status = OrderStatus::Open;
        order
    }

    fn harness() -> (
        Arc<MemoryStore>,
        Arc<MemoryBookCache>,
        Arc<SymbolRegistry>,
        RecoveryRunner,
    ) {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryBookCache::new());
        let registry = Arc::new(SymbolRegistry::new());
        let runner = RecoveryRunner::new(store.clone(), cache.clone(), registry.clone());
        (store, cache, registry, runner)
    }

    #[tokio::test]
    async fn test_skips_when_cache_unreachable() {
        let (store, cache, registry, runner) = harness();
        store.put_book(OrderBook::new(Symbol::new("BTC-USD"), Utc::now()));
        cache.set_available(false);

        let report = runner.run().await.unwrap();
        assert!(report.cache_unavailable);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_primary_newer_pushes_to_cache() {
        let (store, cache, registry, runner) = harness();
        let symbol = Symbol::new("BTC-USD");

        let mut primary = OrderBook::new(symbol.clone(), Utc::now());
        primary.insert(resting(1, 50000, "1.0"));
        primary.version = 5;
        store.put_book(primary.clone());

        let mut stale = OrderBook::new(symbol.clone(), Utc::now());
        stale.version = 3;
        cache.save(&stale).await.unwrap();

        let report = runner.run().await.unwrap();
        assert_eq!(report.pushed_to_cache, 1);
        assert_eq!(report.written_back, 0);

        let cached = cache.load(&symbol).await.unwrap().unwrap();
        assert_eq!(cached.version, 5);
        assert_eq!(cached.best_ask(), Some(Price::from_u64(50000)));
        assert!(registry.contains(&symbol));
    }

    #[tokio::test]
    async fn test_cache_newer_writes_back() {
        let (store, cache, registry, runner) = harness();
        let symbol = Symbol::new("BTC-USD");

        let mut primary = OrderBook::new(symbol.clone(), Utc::now());
        primary.version = 2;
        store.put_book(primary);

        let mut fresher = OrderBook::new(symbol.clone(), Utc::now());
        fresher.insert(resting(7, 50100, "0.4"));
        fresher.version = 6;
        cache.save(&fresher).await.unwrap();

        let report = runner.run().await.unwrap();
        assert_eq!(report.written_back, 1);

        // Conditional update bumped the primary from its own version
        let recovered = store.find_book(&symbol).await.unwrap().unwrap();
        assert_eq!(recovered.version, 3);
        assert_eq!(recovered.best_ask(), Some(Price::from_u64(50100)));
        assert!(registry.contains(&symbol));
    }

    #[tokio::test]
    async fn test_version_tie_breaks_on_timestamp() {
        let (store, cache, _registry, runner) = harness();
        let symbol = Symbol::new("BTC-USD");
        let now = Utc::now();

        let mut primary = OrderBook::new(symbol.clone(), now);
        primary.version = 4;
        store.put_book(primary);

        let mut cached = OrderBook::new(symbol.clone(), now + ChronoDuration::seconds(30));
        cached.insert(resting(9, 49900, "0.2"));
        cached.version = 4;
        cache.save(&cached).await.unwrap();

        let report = runner.run().await.unwrap();
        assert_eq!(report.written_back, 1);
        let recovered = store.find_book(&symbol).await.unwrap().unwrap();
        assert_eq!(recovered.best_ask(), Some(Price::from_u64(49900)));
    }

    #[tokio::test]
    async fn test_cache_missing_uses_primary() {
        let (store, cache, _registry, runner) = harness();
        let symbol = Symbol::new("BTC-USD");

        let mut primary = OrderBook::new(symbol.clone(), Utc::now());
        primary.version = 1;
        store.put_book(primary);

        let report = runner.run().await.unwrap();
        assert_eq!(report.pushed_to_cache, 1);
        assert!(cache.load(&symbol).await.unwrap().is_some());
    }
}
