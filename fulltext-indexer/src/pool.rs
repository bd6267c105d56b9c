//! Indexer pool.
//!
//! Process-local registry of tenant indexers. The first request for a tenant
//! installs a pending slot before any asynchronous work starts, so
//! concurrent first requests share one construction. A background sweep
//! closes indexers that have been idle longer than the configured window.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::errors::IndexerError;
use crate::indexer::{IndexerFactory, TenantIndexer};
use fulltext_indexer_shared::TenantKey;

type Construction = Shared<BoxFuture<'static, Result<Arc<PoolEntry>, Arc<IndexerError>>>>;

enum Slot {
    Pending {
        generation: u64,
        construction: Construction,
    },
    Ready {
        generation: u64,
        entry: Arc<PoolEntry>,
    },
}

impl Slot {
    fn generation(&self) -> u64 {
        match self {
            Slot::Pending { generation, .. } | Slot::Ready { generation, .. } => *generation,
        }
    }
}

/// A constructed indexer and its activity bookkeeping.
struct PoolEntry {
    indexer: Arc<TenantIndexer>,
    /// Milliseconds since the pool epoch.
    last_activity: AtomicU64,
    /// Requests currently holding a lease.
    active: AtomicUsize,
}

impl PoolEntry {
    fn is_idle(&self, now: u64, idle_ms: u64) -> bool {
        self.active.load(Ordering::SeqCst) == 0
            && now.saturating_sub(self.last_activity.load(Ordering::SeqCst)) > idle_ms
    }
}

struct PoolInner {
    slots: DashMap<TenantKey, Slot>,
    factory: Arc<dyn IndexerFactory>,
    config: PoolConfig,
    next_generation: AtomicU64,
    epoch: Instant,
    shut_down: AtomicBool,
}

impl PoolInner {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn lease(self: &Arc<Self>, entry: Arc<PoolEntry>) -> IndexerLease {
        entry.active.fetch_add(1, Ordering::SeqCst);
        entry.last_activity.store(self.now_ms(), Ordering::SeqCst);
        IndexerLease {
            entry,
            pool: self.clone(),
        }
    }

    async fn construct(
        self: Arc<Self>,
        tenant: TenantKey,
        generation: u64,
    ) -> Result<Arc<PoolEntry>, Arc<IndexerError>> {
        let indexer = match self.factory.create(&tenant).await {
            Ok(indexer) => indexer,
            Err(e) => {
                error!(tenant = %tenant, error = %e, "Failed to construct tenant indexer");
                // Leave the key absent so the next request retries.
                self.slots
                    .remove_if(&tenant, |_, slot| slot.generation() == generation);
                return Err(Arc::new(e));
            }
        };

        let entry = Arc::new(PoolEntry {
            indexer,
            last_activity: AtomicU64::new(self.now_ms()),
            active: AtomicUsize::new(0),
        });
        let promoted = match self.slots.get_mut(&tenant) {
            Some(mut slot) if slot.generation() == generation => {
                *slot = Slot::Ready {
                    generation,
                    entry: entry.clone(),
                };
                true
            }
            _ => false,
        };

        if !promoted {
            // The pool was shut down while this indexer was being built.
            warn!(tenant = %tenant, "Discarding indexer built after its slot was dropped");
            if let Err(e) = entry.indexer.close().await {
                warn!(tenant = %tenant, error = %e, "Failed to close discarded indexer");
            }
            return Err(Arc::new(IndexerError::ShutDown));
        }

        info!(tenant = %tenant, generation = generation, "Tenant indexer constructed");
        Ok(entry)
    }

    fn evict_idle(&self) -> Vec<JoinHandle<()>> {
        let now = self.now_ms();
        let idle_ms = self.config.idle_timeout.as_millis() as u64;

        let candidates: Vec<(TenantKey, u64)> = self
            .slots
            .iter()
            .filter_map(|item| match item.value() {
                Slot::Ready { generation, entry } if entry.is_idle(now, idle_ms) => {
                    Some((item.key().clone(), *generation))
                }
                _ => None,
            })
            .collect();

        let mut closing = Vec::new();
        for (tenant, generation) in candidates {
            // Only remove the entry that was inspected, and only if it is still idle.
            let removed = self.slots.remove_if(&tenant, |_, slot| match slot {
                Slot::Ready {
                    generation: current,
                    entry,
                } => *current == generation && entry.is_idle(now, idle_ms),
                Slot::Pending { .. } => false,
            });

            if let Some((tenant, Slot::Ready { entry, .. })) = removed {
                info!(tenant = %tenant, "Evicting idle tenant indexer");
                closing.push(tokio::spawn(async move {
                    if let Err(e) = entry.indexer.close().await {
                        warn!(tenant = %tenant, error = %e, "Failed to close evicted indexer");
                    }
                }));
            }
        }
        closing
    }
}

/// A tenant indexer held for the duration of one request.
///
/// While a lease is alive the indexer is not evicted; dropping it records
/// the request as the tenant's latest activity.
pub struct IndexerLease {
    entry: Arc<PoolEntry>,
    pool: Arc<PoolInner>,
}

impl Deref for IndexerLease {
    type Target = TenantIndexer;

    fn deref(&self) -> &TenantIndexer {
        &self.entry.indexer
    }
}

impl Drop for IndexerLease {
    fn drop(&mut self) {
        self.entry
            .last_activity
            .store(self.pool.now_ms(), Ordering::SeqCst);
        self.entry.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registry mapping tenants to their indexers.
pub struct IndexerPool {
    inner: Arc<PoolInner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl IndexerPool {
    /// Create the pool and start its eviction sweep.
    ///
    /// # Arguments
    ///
    /// * `factory` - Builds the indexer of a tenant on first use
    /// * `config` - Idle window and sweep interval
    pub fn start(factory: Arc<dyn IndexerFactory>, config: PoolConfig) -> Self {
        let inner = Arc::new(PoolInner {
            slots: DashMap::new(),
            factory,
            config,
            next_generation: AtomicU64::new(1),
            epoch: Instant::now(),
            shut_down: AtomicBool::new(false),
        });

        let period = inner.config.sweep_interval.max(std::time::Duration::from_millis(1));
        let sweep_inner = inner.clone();
        let sweeper = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let closing = sweep_inner.evict_idle();
                if !closing.is_empty() {
                    debug!(count = closing.len(), "Idle sweep evicted indexers");
                }
            }
        });

        Self {
            inner,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Get the indexer of `tenant`, constructing it on first use.
    pub async fn get(&self, tenant: &TenantKey) -> Result<IndexerLease, IndexerError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(IndexerError::ShutDown);
        }

        let construction = match self.inner.slots.entry(tenant.clone()) {
            MapEntry::Occupied(occupied) => match occupied.get() {
                Slot::Ready { entry, .. } => return Ok(self.inner.lease(entry.clone())),
                Slot::Pending { construction, .. } => construction.clone(),
            },
            MapEntry::Vacant(vacant) => {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
                let construction = self
                    .inner
                    .clone()
                    .construct(tenant.clone(), generation)
                    .boxed()
                    .shared();
                vacant.insert(Slot::Pending {
                    generation,
                    construction: construction.clone(),
                });
                // Finish the construction even if every waiter goes away.
                tokio::spawn(construction.clone());
                debug!(tenant = %tenant, generation = generation, "Constructing tenant indexer");
                construction
            }
        };

        match construction.await {
            Ok(entry) => Ok(self.inner.lease(entry)),
            Err(e) => Err(IndexerError::ConstructionError(e)),
        }
    }

    /// Remove and close every indexer idle beyond the window.
    ///
    /// # Returns
    ///
    /// Handles of the spawned close tasks
    pub fn evict_idle(&self) -> Vec<JoinHandle<()>> {
        self.inner.evict_idle()
    }

    /// Number of tenants with a pending or constructed indexer.
    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    /// Stop the sweep and close every constructed indexer.
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(sweeper) = sweeper.take() {
                sweeper.abort();
            }
        }

        let tenants: Vec<TenantKey> = self.inner.slots.iter().map(|item| item.key().clone()).collect();
        let mut closing = Vec::new();
        for tenant in tenants {
            if let Some((tenant, Slot::Ready { entry, .. })) = self.inner.slots.remove(&tenant) {
                closing.push(async move {
                    if let Err(e) = entry.indexer.close().await {
                        warn!(tenant = %tenant, error = %e, "Failed to close indexer on shutdown");
                    }
                });
            }
        }

        let count = closing.len();
        join_all(closing).await;
        info!(count = count, "Indexer pool shut down");
    }
}

impl Drop for IndexerPool {
    fn drop(&mut self) {
        if let Ok(mut sweeper) = self.sweeper.lock() {
            if let Some(sweeper) = sweeper.take() {
                sweeper.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::tests::{issue, model, services, ISSUE};
    use crate::indexer::{IndexerServices, TenantIndexerFactory};
    use async_trait::async_trait;
    use fulltext_indexer_repository::{ContentAdapter, ContentAdapterFactory, SearchError};
    use fulltext_indexer_shared::{ClassRef, DocumentQuery};
    use std::time::Duration;

    struct CountingContent {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContentAdapter for CountingContent {
        async fn content(
            &self,
            _name: &str,
            _content_type: &str,
            data: &[u8],
        ) -> Result<String, SearchError> {
            Ok(String::from_utf8_lossy(data).into_owned())
        }

        async fn close(&self) -> Result<(), SearchError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingContentFactory {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContentAdapterFactory for CountingContentFactory {
        async fn create(&self, _tenant: &TenantKey) -> Result<Arc<dyn ContentAdapter>, SearchError> {
            Ok(Arc::new(CountingContent {
                closes: self.closes.clone(),
            }))
        }
    }

    /// Wraps the real factory with a delay, scripted failures and counters.
    struct CountingFactory {
        inner: TenantIndexerFactory,
        creates: AtomicUsize,
        failures_left: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl IndexerFactory for CountingFactory {
        async fn create(&self, tenant: &TenantKey) -> Result<Arc<TenantIndexer>, IndexerError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(IndexerError::config("storage unavailable"));
            }
            self.inner.create(tenant).await
        }
    }

    struct Harness {
        factory: Arc<CountingFactory>,
        content_closes: Arc<AtomicUsize>,
    }

    fn harness(failures: usize) -> Harness {
        let content_closes = Arc::new(AtomicUsize::new(0));
        let services = IndexerServices {
            content: Arc::new(CountingContentFactory {
                closes: content_closes.clone(),
            }),
            ..services(model())
        };
        let factory = Arc::new(CountingFactory {
            inner: TenantIndexerFactory::new(services),
            creates: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
            delay: Duration::from_millis(50),
        });
        Harness {
            factory,
            content_closes,
        }
    }

    fn config() -> PoolConfig {
        PoolConfig {
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_requests_share_one_construction() {
        let harness = harness(0);
        let pool = Arc::new(IndexerPool::start(harness.factory.clone(), config()));
        let tenant = TenantKey::new("w1");

        let requests = (0..8).map(|_| {
            let pool = pool.clone();
            let tenant = tenant.clone();
            async move { pool.get(&tenant).await.map(|lease| lease.tenant().clone()) }
        });
        let results = join_all(requests).await;

        assert!(results.iter().all(|r| matches!(r, Ok(t) if t.as_str() == "w1")));
        assert_eq!(harness.factory.creates.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 1);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_indexer_is_evicted_and_closed_once() {
        let harness = harness(0);
        let pool = IndexerPool::start(harness.factory.clone(), config());

        drop(pool.get(&TenantKey::new("idle")).await.unwrap());
        drop(pool.get(&TenantKey::new("busy")).await.unwrap());

        tokio::time::advance(Duration::from_secs(45)).await;
        drop(pool.get(&TenantKey::new("busy")).await.unwrap());
        tokio::time::advance(Duration::from_secs(20)).await;

        for handle in pool.evict_idle() {
            handle.await.unwrap();
        }
        assert_eq!(pool.len(), 1);
        assert_eq!(harness.content_closes.load(Ordering::SeqCst), 1);

        // A second sweep finds nothing more to close.
        assert!(pool.evict_idle().is_empty());
        assert_eq!(harness.content_closes.load(Ordering::SeqCst), 1);

        // The evicted tenant is rebuilt on its next request.
        drop(pool.get(&TenantKey::new("idle")).await.unwrap());
        assert_eq!(harness.factory.creates.load(Ordering::SeqCst), 3);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_evicts_idle_indexer() {
        let harness = harness(0);
        let pool = IndexerPool::start(harness.factory.clone(), config());

        drop(pool.get(&TenantKey::new("w1")).await.unwrap());
        assert_eq!(pool.len(), 1);

        tokio::time::sleep(Duration::from_secs(75)).await;
        // Let the spawned close run.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(pool.is_empty());
        assert_eq!(harness.content_closes.load(Ordering::SeqCst), 1);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_leased_indexer_is_not_evicted() {
        let harness = harness(0);
        let pool = IndexerPool::start(harness.factory.clone(), config());

        let lease = pool.get(&TenantKey::new("w1")).await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;

        assert!(pool.evict_idle().is_empty());
        drop(lease);
        assert!(pool.evict_idle().is_empty());
        assert_eq!(pool.len(), 1);
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_construction_is_retried() {
        let harness = harness(1);
        let pool = IndexerPool::start(harness.factory.clone(), config());
        let tenant = TenantKey::new("w1");

        let first = pool.get(&tenant).await;
        assert!(matches!(first, Err(IndexerError::ConstructionError(_))));
        assert!(pool.is_empty());

        assert!(pool.get(&tenant).await.is_ok());
        assert_eq!(harness.factory.creates.load(Ordering::SeqCst), 2);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let harness = harness(0);
        let pool = IndexerPool::start(harness.factory.clone(), config());
        let query = DocumentQuery::new().with("$search", "outage");

        {
            let w1 = pool.get(&TenantKey::new("w1")).await.unwrap();
            w1.index(vec![issue("i1", "datacenter outage")]).await.unwrap();
        }
        // Closing flushes the tenant's queued writes.
        pool.shutdown().await;

        let pool = IndexerPool::start(harness.factory.clone(), config());
        let w1 = pool.get(&TenantKey::new("w1")).await.unwrap();
        let w2 = pool.get(&TenantKey::new("w2")).await.unwrap();
        let classes = [ClassRef::new(ISSUE)];

        assert_eq!(w1.search(&classes, &query, 10).await.unwrap().len(), 1);
        assert!(w2.search(&classes, &query, 10).await.unwrap().is_empty());
        assert!(!Arc::ptr_eq(w1.full_text(), w2.full_text()));
        drop((w1, w2));
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_indexers_and_rejects_requests() {
        let harness = harness(0);
        let pool = IndexerPool::start(harness.factory.clone(), config());

        drop(pool.get(&TenantKey::new("w1")).await.unwrap());
        drop(pool.get(&TenantKey::new("w2")).await.unwrap());
        pool.shutdown().await;

        assert!(pool.is_empty());
        assert_eq!(harness.content_closes.load(Ordering::SeqCst), 2);
        assert!(matches!(
            pool.get(&TenantKey::new("w1")).await,
            Err(IndexerError::ShutDown)
        ));
    }
}
