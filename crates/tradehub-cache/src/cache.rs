//! Size-bounded LRU cache of reconstructed image data URLs.
//!
//! Entries are indexed by an [`LruCache`] whose recency order matches the
//! ascending access `timestamp`, so capacity eviction always pops the least
//! recently used end. Capacity is enforced in bytes, not entry count.
//!
//! Every mutation runs its check, evict and insert steps under one lock with no
//! suspension point in between. Writes to the persistent tier happen after the
//! lock is released; their failures are logged and never fail the in-memory
//! operation.
//!
//! Each key carries a generation that every mutation bumps under the lock.
//! Persistent writes are applied one at a time and only while their generation
//! is still the key's current one, so a write that lost a race with a later
//! `invalidate` or `put` never reaches the persistent tier.

use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tradehub_core::constants::{DEFAULT_CACHE_CAPACITY_BYTES, DEFAULT_CACHE_EXPIRY_SECS};
use tradehub_core::{AppError, AppResult, CacheEntry, Config, DataUrl};

use crate::clock::{Clock, SystemClock};
use crate::store::{CacheStore, NullCacheStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity_bytes: u64,
    /// Entries not accessed for longer than this are dropped by a sweep.
    pub expiry: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CACHE_CAPACITY_BYTES,
            expiry: Duration::from_secs(DEFAULT_CACHE_EXPIRY_SECS),
        }
    }
}

impl CacheConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity_bytes: config.cache_capacity_bytes,
            expiry: config.cache_expiry(),
        }
    }

    fn expiry_millis(&self) -> i64 {
        i64::try_from(self.expiry.as_millis()).unwrap_or(i64::MAX)
    }
}

/// A pending fill of one key, taken before the value is fetched.
///
/// Invalidating the key (or clearing the cache) while the fill is pending
/// marks it stale, and [`ImageCache::complete_fill`] then discards the value.
#[derive(Debug)]
pub struct CacheFill {
    key: String,
    stale: Arc<AtomicBool>,
}

impl CacheFill {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }
}

struct Slot {
    data: Arc<str>,
    size: u64,
    timestamp: i64,
}

struct Inner {
    entries: LruCache<String, Slot>,
    total_size: u64,
    /// Keys whose access timestamp changed since the last flush
    dirty: HashSet<String>,
    /// Current generation of every live key and of keys with a pending removal
    generations: HashMap<String, u64>,
    next_generation: u64,
    /// Fills in progress, per key
    fills: HashMap<String, Vec<Weak<AtomicBool>>>,
    disposed: bool,
}

impl Inner {
    fn bump(&mut self, key: &str) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.generations.insert(key.to_string(), generation);
        generation
    }

    fn generation(&mut self, key: &str) -> u64 {
        match self.generations.get(key) {
            Some(generation) => *generation,
            None => self.bump(key),
        }
    }

    fn is_current(&self, key: &str, generation: u64) -> bool {
        self.generations.get(key) == Some(&generation)
    }

    fn stage_remove(&mut self, key: String, persist: &mut Vec<Persist>) {
        let generation = self.bump(&key);
        persist.push(Persist::Remove { key, generation });
    }

    /// Mark every pending fill of `key` stale.
    fn invalidate_fills(&mut self, key: &str) {
        if let Some(fills) = self.fills.remove(key) {
            for stale in fills.iter().filter_map(Weak::upgrade) {
                stale.store(true, Ordering::Release);
            }
        }
    }

    fn forget_fill(&mut self, fill: &CacheFill) {
        if let Some(fills) = self.fills.get_mut(&fill.key) {
            fills.retain(|weak| {
                weak.upgrade()
                    .is_some_and(|stale| !Arc::ptr_eq(&stale, &fill.stale))
            });
            if fills.is_empty() {
                self.fills.remove(&fill.key);
            }
        }
    }
}

enum Persist {
    Save {
        id: String,
        data: Arc<str>,
        timestamp: i64,
        size: u64,
        generation: u64,
    },
    Remove {
        key: String,
        generation: u64,
    },
}

pub struct ImageCache {
    config: CacheConfig,
    inner: Mutex<Inner>,
    /// Serializes writes to the persistent tier
    persist_lock: Mutex<()>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
}

impl ImageCache {
    /// Empty cache; call [`ImageCache::init`] instead to load persisted entries.
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_size: 0,
                dirty: HashSet::new(),
                generations: HashMap::new(),
                next_generation: 0,
                fills: HashMap::new(),
                disposed: false,
            }),
            persist_lock: Mutex::new(()),
            store,
            clock,
        }
    }

    /// Memory-only cache on the system clock.
    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(NullCacheStore), Arc::new(SystemClock))
    }

    /// Build a cache and load the entries of its persistent tier.
    ///
    /// Expired and undecodable entries are dropped, and the oldest entries are
    /// evicted until the capacity bound holds again.
    pub async fn init(
        config: CacheConfig,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Self::new(config, store, clock);
        cache.load().await;
        cache
    }

    async fn load(&self) {
        let mut entries = match self.store.load_all().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted image cache, starting empty");
                return;
            }
        };
        entries.sort_by_key(|entry| entry.timestamp);

        let now = self.clock.now_millis();
        let capacity = self.config.capacity_bytes;
        let mut persist = Vec::new();
        let (count, total_size) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;

            for entry in entries {
                if self.is_expired(entry.timestamp, now) {
                    inner.stage_remove(entry.id, &mut persist);
                    continue;
                }
                let size = match DataUrl::parse(&entry.data) {
                    Ok(url) => url.decoded_len(),
                    Err(_) => {
                        inner.stage_remove(entry.id, &mut persist);
                        continue;
                    }
                };
                if size > capacity {
                    inner.stage_remove(entry.id, &mut persist);
                    continue;
                }

                if let Some(old) = inner.entries.pop(&entry.id) {
                    inner.total_size = inner.total_size.saturating_sub(old.size);
                }
                evict_for(inner, size, capacity, &mut persist);
                inner.bump(&entry.id);
                inner.entries.put(
                    entry.id,
                    Slot {
                        data: Arc::from(entry.data),
                        size,
                        timestamp: entry.timestamp,
                    },
                );
                inner.total_size += size;
            }
            (inner.entries.len(), inner.total_size)
        };

        let dropped = persist.len();
        self.persist(persist).await;

        tracing::info!(
            entries = count,
            dropped = dropped,
            total_size = total_size,
            capacity_bytes = capacity,
            "Image cache loaded"
        );
    }

    fn is_expired(&self, timestamp: i64, now: i64) -> bool {
        now.saturating_sub(timestamp) > self.config.expiry_millis()
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    /// Look up a data URL; a hit refreshes the entry's access time.
    ///
    /// A miss has no side effect. An entry found past its expiry is dropped and
    /// reported as a miss.
    pub async fn get(&self, key: &str) -> Option<Arc<str>> {
        let now = self.clock.now_millis();
        let mut persist = Vec::new();

        let found = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if inner.disposed {
                return None;
            }

            match inner.entries.peek(key).map(|slot| slot.timestamp) {
                None => None,
                Some(timestamp) if self.is_expired(timestamp, now) => {
                    remove_locked(inner, key);
                    inner.stage_remove(key.to_string(), &mut persist);
                    None
                }
                Some(_) => match inner.entries.get_mut(key) {
                    Some(slot) => {
                        slot.timestamp = now;
                        let data = slot.data.clone();
                        inner.dirty.insert(key.to_string());
                        Some(data)
                    }
                    None => None,
                },
            }
        };

        self.persist(persist).await;
        found
    }

    /// Insert or overwrite an entry, evicting least recently used entries
    /// until it fits.
    ///
    /// An entry larger than the whole capacity is rejected with
    /// [`AppError::CapacityExceeded`] and leaves the cache untouched.
    pub async fn put(&self, key: &str, data_url: &DataUrl) -> AppResult<()> {
        self.insert(key, data_url, None).await.map(|_| ())
    }

    /// Register a fill of `key` before fetching its value.
    pub async fn begin_fill(&self, key: &str) -> CacheFill {
        let stale = Arc::new(AtomicBool::new(false));
        let mut guard = self.inner.lock().await;
        let fills = guard.fills.entry(key.to_string()).or_default();
        fills.retain(|weak| weak.strong_count() > 0);
        fills.push(Arc::downgrade(&stale));
        CacheFill {
            key: key.to_string(),
            stale,
        }
    }

    /// Store the value fetched for `fill`, like [`ImageCache::put`].
    ///
    /// Returns `Ok(false)` without touching the cache when the key was
    /// invalidated after the fill began.
    pub async fn complete_fill(&self, fill: CacheFill, data_url: &DataUrl) -> AppResult<bool> {
        self.insert(&fill.key, data_url, Some(&fill)).await
    }

    async fn insert(
        &self,
        key: &str,
        data_url: &DataUrl,
        fill: Option<&CacheFill>,
    ) -> AppResult<bool> {
        let size = data_url.decoded_len();
        let capacity = self.config.capacity_bytes;
        let data: Arc<str> = Arc::from(data_url.to_string());
        let now = self.clock.now_millis();
        let mut persist = Vec::new();

        {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if let Some(fill) = fill {
                inner.forget_fill(fill);
                if fill.is_stale() {
                    tracing::debug!(key = %key, "Key invalidated during fetch, result not cached");
                    return Ok(false);
                }
            }
            if size > capacity {
                return Err(AppError::CapacityExceeded { size, capacity });
            }
            if inner.disposed {
                return Err(AppError::Disposed("image cache".to_string()));
            }

            self.sweep_locked(inner, now, &mut persist);
            remove_locked(inner, key);
            evict_for(inner, size, capacity, &mut persist);

            inner.entries.put(
                key.to_string(),
                Slot {
                    data: data.clone(),
                    size,
                    timestamp: now,
                },
            );
            inner.total_size += size;
            let generation = inner.bump(key);
            persist.push(Persist::Save {
                id: key.to_string(),
                data,
                timestamp: now,
                size,
                generation,
            });
        }

        self.persist(persist).await;

        tracing::debug!(key = %key, size_bytes = size, "Image cached");
        Ok(true)
    }

    /// Drop an entry, e.g. because its blob was deleted.
    ///
    /// Returns whether the entry was present in memory; the persistent copy is
    /// removed either way, and fills still in progress for the key are
    /// discarded when they complete.
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut persist = Vec::new();
        let removed = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            inner.invalidate_fills(key);
            let removed = remove_locked(inner, key);
            inner.stage_remove(key.to_string(), &mut persist);
            removed
        };
        self.persist(persist).await;
        removed
    }

    /// Remove every entry whose last access is older than the expiry.
    /// Returns the number of entries removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut persist = Vec::new();
        let removed = {
            let mut guard = self.inner.lock().await;
            if guard.disposed {
                return 0;
            }
            let inner = &mut *guard;
            inner.fills.retain(|_, fills| {
                fills.retain(|weak| weak.strong_count() > 0);
                !fills.is_empty()
            });
            self.sweep_locked(inner, now, &mut persist)
        };
        self.persist(persist).await;

        if removed > 0 {
            tracing::info!(removed = removed, "Expired image cache entries swept");
        }
        removed
    }

    fn sweep_locked(&self, inner: &mut Inner, now: i64, persist: &mut Vec<Persist>) -> usize {
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, slot)| self.is_expired(slot.timestamp, now))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            remove_locked(inner, &key);
            inner.stage_remove(key, persist);
        }
        count
    }

    /// Write refreshed access timestamps to the persistent tier.
    pub async fn flush(&self) -> usize {
        let persist: Vec<Persist> = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let dirty = std::mem::take(&mut inner.dirty);
            let mut persist = Vec::with_capacity(dirty.len());
            for key in dirty {
                let Some((data, timestamp, size)) = inner
                    .entries
                    .peek(&key)
                    .map(|slot| (slot.data.clone(), slot.timestamp, slot.size))
                else {
                    continue;
                };
                let generation = inner.generation(&key);
                persist.push(Persist::Save {
                    id: key,
                    data,
                    timestamp,
                    size,
                    generation,
                });
            }
            persist
        };
        let flushed = persist.len();
        self.persist(persist).await;
        flushed
    }

    /// Drop every entry, in memory and persisted. Fills in progress are
    /// discarded when they complete.
    pub async fn clear(&self) {
        {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let keys: Vec<String> = inner.fills.keys().cloned().collect();
            for key in keys {
                inner.invalidate_fills(&key);
            }
            inner.entries.clear();
            inner.dirty.clear();
            inner.generations.clear();
            inner.total_size = 0;
        }
        let _serial = self.persist_lock.lock().await;
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear persisted image cache");
        }
    }

    /// Flush pending timestamps and release the in-memory entries.
    ///
    /// Afterwards `get` misses and `put` fails with [`AppError::Disposed`];
    /// persisted entries stay for the next [`ImageCache::init`].
    pub async fn dispose(&self) {
        self.flush().await;
        let mut guard = self.inner.lock().await;
        guard.disposed = true;
        guard.entries.clear();
        guard.dirty.clear();
        guard.total_size = 0;
        tracing::debug!("Image cache disposed");
    }

    pub async fn is_disposed(&self) -> bool {
        self.inner.lock().await.disposed
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Sum of entry sizes in bytes
    pub async fn total_size(&self) -> u64 {
        self.inner.lock().await.total_size
    }

    /// Presence check that does not refresh the access time.
    pub async fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let guard = self.inner.lock().await;
        guard
            .entries
            .peek(key)
            .is_some_and(|slot| !self.is_expired(slot.timestamp, now))
    }

    async fn persist(&self, ops: Vec<Persist>) {
        if ops.is_empty() {
            return;
        }
        let _serial = self.persist_lock.lock().await;

        for op in ops {
            let (key, generation) = match &op {
                Persist::Save { id, generation, .. } => (id.clone(), *generation),
                Persist::Remove { key, generation } => (key.clone(), *generation),
            };
            if !self.inner.lock().await.is_current(&key, generation) {
                tracing::debug!(key = %key, "Superseded image cache write skipped");
                continue;
            }

            let result = match op {
                Persist::Save {
                    id,
                    data,
                    timestamp,
                    size,
                    ..
                } => {
                    let entry = CacheEntry {
                        data: data.to_string(),
                        timestamp,
                        size,
                        id,
                    };
                    self.store.save(&entry).await
                }
                Persist::Remove { key, generation } => {
                    let result = self.store.remove(&key).await;
                    let mut guard = self.inner.lock().await;
                    if guard.is_current(&key, generation) {
                        guard.generations.remove(&key);
                    }
                    result
                }
            };
            if let Err(e) = result {
                tracing::warn!(key = %key, error = %e, "Image cache persistence failed");
            }
        }
    }
}

fn remove_locked(inner: &mut Inner, key: &str) -> bool {
    inner.dirty.remove(key);
    match inner.entries.pop(key) {
        Some(slot) => {
            inner.total_size = inner.total_size.saturating_sub(slot.size);
            true
        }
        None => false,
    }
}

/// Pop least recently used entries until `incoming` more bytes fit.
fn evict_for(inner: &mut Inner, incoming: u64, capacity: u64, persist: &mut Vec<Persist>) {
    while inner.total_size + incoming > capacity {
        let Some((key, slot)) = inner.entries.pop_lru() else {
            break;
        };
        inner.total_size = inner.total_size.saturating_sub(slot.size);
        inner.dirty.remove(&key);
        tracing::debug!(key = %key, size_bytes = slot.size, "Evicted image cache entry");
        inner.stage_remove(key, persist);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::DiskCacheStore;
    use async_trait::async_trait;
    use tempfile::tempdir;

    /// Persistent tier whose saves take a while to land.
    struct SlowSaveStore {
        inner: DiskCacheStore,
        delay: Duration,
    }

    #[async_trait]
    impl CacheStore for SlowSaveStore {
        async fn load_all(&self) -> AppResult<Vec<CacheEntry>> {
            self.inner.load_all().await
        }

        async fn save(&self, entry: &CacheEntry) -> AppResult<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.save(entry).await
        }

        async fn remove(&self, key: &str) -> AppResult<()> {
            self.inner.remove(key).await
        }

        async fn clear(&self) -> AppResult<()> {
            self.inner.clear().await
        }
    }

    /// Data URL whose decoded size is `ceil(len * 3 / 4)`
    fn url(len: usize) -> DataUrl {
        DataUrl::new("image/jpeg", "A".repeat(len))
    }

    fn cache(capacity_bytes: u64, expiry: Duration, clock: Arc<ManualClock>) -> ImageCache {
        ImageCache::new(
            CacheConfig {
                capacity_bytes,
                expiry,
            },
            Arc::new(NullCacheStore),
            clock,
        )
    }

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[tokio::test]
    async fn put_then_get() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(1024, DAY, clock);

        cache.put("products-images/a", &url(8)).await.unwrap();
        assert_eq!(
            cache.get("products-images/a").await.as_deref(),
            Some(format!("data:image/jpeg;base64,{}", "A".repeat(8)).as_str())
        );
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.total_size().await, 6);
        assert!(cache.get("products-images/missing").await.is_none());
    }

    #[tokio::test]
    async fn evicts_least_recently_accessed_first() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(10, DAY, clock.clone());

        for (t, key) in [(1, "a"), (2, "b"), (3, "c")] {
            clock.set(t);
            cache.put(key, &url(4)).await.unwrap();
        }
        assert_eq!(cache.total_size().await, 9);

        clock.set(4);
        cache.put("d", &url(4)).await.unwrap();
        assert!(!cache.contains("a").await);

        // Reading b makes c the oldest entry
        clock.set(5);
        assert!(cache.get("b").await.is_some());

        clock.set(6);
        cache.put("e", &url(4)).await.unwrap();
        assert!(!cache.contains("c").await);
        for key in ["b", "d", "e"] {
            assert!(cache.contains(key).await, "{}", key);
        }
        assert_eq!(cache.total_size().await, 9);
    }

    #[tokio::test]
    async fn evicts_as_many_entries_as_needed() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(12, DAY, clock.clone());

        for (t, key) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
            clock.set(t);
            cache.put(key, &url(4)).await.unwrap();
        }
        clock.set(5);
        cache.put("big", &url(12)).await.unwrap();

        assert!(!cache.contains("a").await);
        assert!(!cache.contains("b").await);
        assert!(!cache.contains("c").await);
        assert!(cache.contains("d").await);
        assert_eq!(cache.total_size().await, 12);
    }

    #[tokio::test]
    async fn capacity_holds_after_any_sequence_of_puts() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(100, DAY, clock.clone());

        for i in 0..200usize {
            clock.set(i as i64);
            let len = (i * 37) % 120 + 1;
            let key = format!("k{}", i % 17);
            let _ = cache.put(&key, &url(len)).await;
            assert!(cache.total_size().await <= 100);
        }
    }

    #[tokio::test]
    async fn rejects_entry_larger_than_capacity() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(10, DAY, clock);
        cache.put("a", &url(4)).await.unwrap();

        let result = cache.put("huge", &url(16)).await;
        assert!(matches!(
            result,
            Err(AppError::CapacityExceeded {
                size: 12,
                capacity: 10
            })
        ));
        assert!(cache.contains("a").await);
        assert_eq!(cache.total_size().await, 3);
    }

    #[tokio::test]
    async fn overwrite_replaces_size() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(100, DAY, clock);

        cache.put("a", &url(40)).await.unwrap();
        cache.put("a", &url(4)).await.unwrap();
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.total_size().await, 3);
    }

    #[tokio::test]
    async fn sweep_respects_expiry_boundary() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(100, Duration::from_millis(1000), clock.clone());
        cache.put("a", &url(4)).await.unwrap();

        clock.set(1000);
        assert_eq!(cache.sweep_expired().await, 0);
        assert!(cache.contains("a").await);

        clock.set(1001);
        assert_eq!(cache.sweep_expired().await, 1);
        assert!(!cache.contains("a").await);
        assert_eq!(cache.total_size().await, 0);

        // Idempotent
        assert_eq!(cache.sweep_expired().await, 0);
    }

    #[tokio::test]
    async fn access_postpones_expiry() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(100, Duration::from_millis(1000), clock.clone());
        cache.put("a", &url(4)).await.unwrap();

        clock.set(900);
        assert!(cache.get("a").await.is_some());
        clock.set(1500);
        assert_eq!(cache.sweep_expired().await, 0);

        clock.set(1901);
        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn invalidate_and_clear() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(100, DAY, clock);
        cache.put("a", &url(4)).await.unwrap();
        cache.put("b", &url(4)).await.unwrap();

        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);
        assert_eq!(cache.total_size().await, 3);

        cache.clear().await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.total_size().await, 0);
    }

    #[tokio::test]
    async fn disposed_cache_rejects_writes() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(100, DAY, clock);
        cache.put("a", &url(4)).await.unwrap();

        cache.dispose().await;
        assert!(cache.is_disposed().await);
        assert!(cache.get("a").await.is_none());
        assert!(matches!(
            cache.put("b", &url(4)).await,
            Err(AppError::Disposed(_))
        ));
    }

    #[tokio::test]
    async fn persisted_entries_survive_restart() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let config = CacheConfig {
            capacity_bytes: 100,
            expiry: Duration::from_millis(1000),
        };

        let store = Arc::new(DiskCacheStore::new(dir.path()).await.unwrap());
        let cache = ImageCache::init(config, store.clone(), clock.clone()).await;
        cache.put("a", &url(4)).await.unwrap();
        clock.set(10);
        cache.put("b", &url(8)).await.unwrap();
        clock.set(800);
        assert!(cache.get("a").await.is_some());
        cache.dispose().await;

        // b was last read at 10 and is expired by now; a was refreshed at 800
        clock.set(1500);
        let cache = ImageCache::init(config, store.clone(), clock.clone()).await;
        assert!(cache.contains("a").await);
        assert!(!cache.contains("b").await);
        assert_eq!(cache.total_size().await, 3);
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn init_restores_capacity_bound() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(DiskCacheStore::new(dir.path()).await.unwrap());

        let roomy = CacheConfig {
            capacity_bytes: 100,
            expiry: DAY,
        };
        let cache = ImageCache::init(roomy, store.clone(), clock.clone()).await;
        for (t, key) in [(1, "a"), (2, "b"), (3, "c")] {
            clock.set(t);
            cache.put(key, &url(8)).await.unwrap();
        }
        cache.dispose().await;

        let tight = CacheConfig {
            capacity_bytes: 12,
            expiry: DAY,
        };
        let cache = ImageCache::init(tight, store, clock).await;
        assert!(!cache.contains("a").await);
        assert!(cache.contains("b").await);
        assert!(cache.contains("c").await);
        assert_eq!(cache.total_size().await, 12);
    }

    #[tokio::test]
    async fn invalidate_during_slow_save_stays_invalidated() {
        let dir = tempdir().unwrap();
        let disk = DiskCacheStore::new(dir.path()).await.unwrap();
        let slow = Arc::new(SlowSaveStore {
            inner: disk.clone(),
            delay: Duration::from_millis(100),
        });
        let clock = Arc::new(ManualClock::new(0));
        let config = CacheConfig {
            capacity_bytes: 100,
            expiry: DAY,
        };
        let cache = Arc::new(ImageCache::init(config, slow, clock.clone()).await);

        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.put("products-images/x", &url(8)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.invalidate("products-images/x").await);
        writer.await.unwrap().unwrap();

        let restarted = ImageCache::init(config, Arc::new(disk.clone()), clock).await;
        assert!(!restarted.contains("products-images/x").await);
        assert!(disk.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flush_racing_invalidate_does_not_resurrect_entry() {
        let dir = tempdir().unwrap();
        let disk = DiskCacheStore::new(dir.path()).await.unwrap();
        let slow = Arc::new(SlowSaveStore {
            inner: disk.clone(),
            delay: Duration::from_millis(50),
        });
        let clock = Arc::new(ManualClock::new(0));
        let config = CacheConfig {
            capacity_bytes: 100,
            expiry: DAY,
        };
        let cache = Arc::new(ImageCache::init(config, slow, clock.clone()).await);
        cache.put("a", &url(8)).await.unwrap();
        clock.set(5);
        assert!(cache.get("a").await.is_some());

        let flusher = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.flush().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate("a").await;
        assert_eq!(flusher.await.unwrap(), 1);

        assert!(disk.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fill_invalidated_while_fetching_is_discarded() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(100, DAY, clock);

        let fill = cache.begin_fill("products-images/x").await;
        assert!(!fill.is_stale());
        cache.invalidate("products-images/x").await;
        assert!(fill.is_stale());

        assert!(!cache.complete_fill(fill, &url(8)).await.unwrap());
        assert!(!cache.contains("products-images/x").await);

        let fill = cache.begin_fill("products-images/x").await;
        assert!(cache.complete_fill(fill, &url(8)).await.unwrap());
        assert!(cache.contains("products-images/x").await);
    }

    #[tokio::test]
    async fn clear_discards_pending_fills() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(100, DAY, clock);

        let a = cache.begin_fill("a").await;
        let b = cache.begin_fill("b").await;
        cache.clear().await;

        assert!(!cache.complete_fill(a, &url(4)).await.unwrap());
        assert!(!cache.complete_fill(b, &url(4)).await.unwrap());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn oversized_fill_is_rejected() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(10, DAY, clock);

        let fill = cache.begin_fill("a").await;
        assert!(matches!(
            cache.complete_fill(fill, &url(40)).await,
            Err(AppError::CapacityExceeded { .. })
        ));
        assert!(cache.is_empty().await);
    }
}
