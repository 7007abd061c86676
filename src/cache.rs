//! Time-boxed key/value cache with single-flight de-duplication.
//!
//! Entries expire after a TTL and are evicted lazily on access plus by a
//! periodic background sweep. When the cache is full, inserting a new key
//! evicts the oldest still-present key (FIFO by insertion order, not LRU —
//! re-setting an existing key keeps its original position).
//!
//! [`TtlCache::get_or_set`] guarantees that concurrent callers for one
//! missing key run the factory exactly once and share its outcome. A failed
//! factory writes no entry and clears the in-flight marker, so the next
//! caller retries.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::CoreError;

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when `set`/`get_or_set` are called without one. `None`
    /// means entries without an explicit TTL never expire.
    pub default_ttl: Option<Duration>,
    /// Maximum number of entries before FIFO eviction kicks in.
    pub max_size: usize,
    /// Period of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Some(Duration::from_secs(60)),
            max_size: 1000,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Store<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    insertion_order: VecDeque<K>,
}

type InFlight<V> = Shared<BoxFuture<'static, Result<V, CoreError>>>;

struct CacheInner<K, V> {
    store: Mutex<Store<K, V>>,
    inflight: Mutex<HashMap<K, InFlight<V>>>,
    config: CacheConfig,
}

/// Generic TTL cache. Cheap to share behind an [`Arc`]; all methods take
/// `&self`.
pub struct TtlCache<K, V> {
    inner: Arc<CacheInner<K, V>>,
    sweeper: Option<tokio::task::JoinHandle<()>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache. When called inside a tokio runtime, a background
    /// sweep task is spawned; it holds only a weak reference, so dropping
    /// the cache stops the sweep rather than the sweep keeping the cache
    /// alive.
    pub fn new(config: CacheConfig) -> Self {
        let inner = Arc::new(CacheInner {
            store: Mutex::new(Store {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
            }),
            inflight: Mutex::new(HashMap::new()),
            config,
        });

        let sweeper = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let weak = Arc::downgrade(&inner);
            let interval = inner.config.sweep_interval;
            handle.spawn(sweep_loop(weak, interval))
        });

        Self { inner, sweeper }
    }

    /// Fetch a live value. Expired entries count as absent and are evicted.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut store = self.inner.store.lock();
        match store.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {}
            Some(entry) => return Some(entry.value.clone()),
            None => return None,
        }
        store.entries.remove(key);
        store.insertion_order.retain(|k| k != key);
        None
    }

    /// Insert a value with an explicit TTL, or the configured default.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let ttl = ttl.or(self.inner.config.default_ttl);
        let expires_at = ttl.map(|d| Instant::now() + d);
        let mut store = self.inner.store.lock();

        if store.entries.contains_key(&key) {
            // Overwrite in place; insertion position is preserved.
            store
                .entries
                .insert(key, CacheEntry { value, expires_at });
            return;
        }

        if store.entries.len() >= self.inner.config.max_size {
            if let Some(oldest) = store.insertion_order.pop_front() {
                store.entries.remove(&oldest);
            }
        }
        store.insertion_order.push_back(key.clone());
        store.entries.insert(key, CacheEntry { value, expires_at });
    }

    pub fn has(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key. Returns whether it was present (and live).
    pub fn delete(&self, key: &K) -> bool {
        let mut store = self.inner.store.lock();
        let removed = store.entries.remove(key).is_some();
        store.insertion_order.retain(|k| k != key);
        removed
    }

    pub fn clear(&self) {
        let mut store = self.inner.store.lock();
        store.entries.clear();
        store.insertion_order.clear();
    }

    /// Evict every expired entry now. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        self.inner.cleanup()
    }

    /// Number of live entries (expired ones are swept first).
    pub fn len(&self) -> usize {
        self.cleanup();
        self.inner.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value for `key`, or run `factory` to produce it.
    ///
    /// Single-flight: concurrent callers for the same missing key share one
    /// factory invocation and its outcome. Failures are returned to every
    /// waiter but never cached.
    pub async fn get_or_set<F, Fut>(
        &self,
        key: K,
        ttl: Option<Duration>,
        factory: F,
    ) -> Result<V, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CoreError>> + Send + 'static,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let shared = {
            let mut inflight = self.inner.inflight.lock();
            if let Some(existing) = inflight.get(&key) {
                existing.clone()
            } else {
                // Re-check under the in-flight lock: a previous flight may
                // have landed between our miss and taking the lock.
                if let Some(value) = self.get(&key) {
                    return Ok(value);
                }
                let weak = Arc::downgrade(&self.inner);
                let flight_key = key.clone();
                let ttl = ttl.or(self.inner.config.default_ttl);
                let fut = factory();
                let shared: InFlight<V> = async move {
                    let result = fut.await;
                    if let Some(inner) = weak.upgrade() {
                        if let Ok(value) = &result {
                            inner.insert_with_deadline(
                                flight_key.clone(),
                                value.clone(),
                                ttl.map(|d| Instant::now() + d),
                            );
                        }
                        inner.inflight.lock().remove(&flight_key);
                    }
                    result
                }
                .boxed()
                .shared();
                inflight.insert(key.clone(), shared.clone());
                shared
            }
        };

        shared.await
    }
}

impl<K, V> CacheInner<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.lock();
        let before = store.entries.len();
        store.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - store.entries.len();
        if removed > 0 {
            let Store {
                entries,
                insertion_order,
            } = &mut *store;
            insertion_order.retain(|k| entries.contains_key(k));
        }
        removed
    }

    fn insert_with_deadline(&self, key: K, value: V, expires_at: Option<Instant>) {
        let mut store = self.store.lock();
        if store.entries.contains_key(&key) {
            store
                .entries
                .insert(key, CacheEntry { value, expires_at });
            return;
        }
        if store.entries.len() >= self.config.max_size {
            if let Some(oldest) = store.insertion_order.pop_front() {
                store.entries.remove(&oldest);
            }
        }
        store.insertion_order.push_back(key.clone());
        store.entries.insert(key, CacheEntry { value, expires_at });
    }
}

async fn sweep_loop<K, V>(weak: Weak<CacheInner<K, V>>, interval: Duration)
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    loop {
        tokio::time::sleep(interval).await;
        match weak.upgrade() {
            Some(inner) => {
                let removed = inner.cleanup();
                if removed > 0 {
                    tracing::trace!(removed, "cache sweep evicted expired entries");
                }
            }
            None => break,
        }
    }
}

impl<K, V> Drop for TtlCache<K, V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}
