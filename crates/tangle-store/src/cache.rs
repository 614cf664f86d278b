//! Reference-counted object cache over persisted ledger entities.
//!
//! Every [`CachedHandle`] counts as one reference to its entry. Acquiring or
//! retaining a handle increments the count, dropping or releasing it
//! decrements the count. An entry can only be evicted once its count is zero;
//! unreferenced entries are kept in an LRU list bounded by
//! `max_unreferenced` and evicted oldest-first beyond that bound.
//!
//! Handles are move-only: there is no `Clone`. Sharing a handle with another
//! task requires an explicit [`CachedHandle::retain`], and a released handle
//! is consumed so it cannot be used afterwards.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use tracing::debug;

/// Requirements for cache keys.
pub trait CacheKey: Copy + Eq + Hash + fmt::Debug {}

impl<T: Copy + Eq + Hash + fmt::Debug> CacheKey for T {}

struct CacheEntry<V> {
    value: Arc<V>,
    refs: usize,
    /// Stamp of the entry's latest slot in `order`; valid while `refs == 0`.
    stamp: u64,
}

struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// LRU of unreferenced entries: front = oldest, back = newest.
    ///
    /// A slot is stale once its entry is referenced again or released with
    /// a newer stamp. Stale slots are skipped on eviction and compacted away,
    /// so reacquiring an entry never scans the list.
    order: VecDeque<(K, u64)>,
    /// Number of entries with `refs == 0`.
    unreferenced: usize,
    next_stamp: u64,
    /// Sum of all reference counts.
    outstanding: usize,
}

impl<K: CacheKey, V> CacheInner<K, V> {
    fn is_live_slot(&self, key: &K, stamp: u64) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.refs == 0 && e.stamp == stamp)
    }

    /// Take one reference to `key`, which must be cached.
    fn reference(&mut self, key: K) -> Option<Arc<V>> {
        let entry = self.entries.get_mut(&key)?;
        if entry.refs == 0 {
            self.unreferenced -= 1;
        }
        entry.refs += 1;
        self.outstanding += 1;
        Some(Arc::clone(&entry.value))
    }

    fn evict_beyond(&mut self, max_unreferenced: usize) {
        while self.unreferenced > max_unreferenced {
            let Some((key, stamp)) = self.order.pop_front() else {
                break;
            };
            if self.is_live_slot(&key, stamp) {
                self.entries.remove(&key);
                self.unreferenced -= 1;
                debug!(?key, "evicted unreferenced entry");
            }
        }

        if self.order.len() > 2 * self.unreferenced.max(16) {
            let entries = &self.entries;
            self.order.retain(|(key, stamp)| {
                entries
                    .get(key)
                    .is_some_and(|e| e.refs == 0 && e.stamp == *stamp)
            });
        }
    }
}

struct CacheShared<K, V> {
    max_unreferenced: usize,
    inner: Mutex<CacheInner<K, V>>,
}

impl<K: CacheKey, V> CacheShared<K, V> {
    fn release_one(&self, key: K) {
        // Never panic while a handle is being dropped during unwinding.
        let Ok(mut guard) = self.inner.lock() else {
            return;
        };
        let inner = &mut *guard;

        if let Some(entry) = inner.entries.get_mut(&key) {
            debug_assert!(entry.refs > 0, "released an unreferenced entry");
            if entry.refs > 0 {
                entry.refs -= 1;
                inner.outstanding = inner.outstanding.saturating_sub(1);
                if entry.refs == 0 {
                    entry.stamp = inner.next_stamp;
                    inner.next_stamp += 1;
                    inner.order.push_back((key, entry.stamp));
                    inner.unreferenced += 1;
                }
            }
        }

        inner.evict_beyond(self.max_unreferenced);
    }
}

/// Thread-safe cache handing out reference-counted [`CachedHandle`]s.
///
/// All operations take a single lock. Loading a missing entry from the
/// backing store happens outside the lock.
pub struct ObjectCache<K, V> {
    shared: Arc<CacheShared<K, V>>,
}

impl<K: CacheKey, V> ObjectCache<K, V> {
    /// Create a cache that keeps at most `max_unreferenced` entries alive
    /// once nothing references them.
    ///
    /// A `max_unreferenced` of 0 evicts entries as soon as their last
    /// handle is released.
    pub fn new(max_unreferenced: usize) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                max_unreferenced,
                inner: Mutex::new(CacheInner {
                    entries: HashMap::new(),
                    order: VecDeque::new(),
                    unreferenced: 0,
                    next_stamp: 0,
                    outstanding: 0,
                }),
            }),
        }
    }

    /// Acquire a handle to `key`, loading it with `load` on a miss.
    ///
    /// Returns `Ok(None)` if the entry is neither cached nor found by the
    /// loader. The returned handle holds one reference.
    pub fn acquire_with<E>(
        &self,
        key: K,
        load: impl FnOnce(&K) -> Result<Option<V>, E>,
    ) -> Result<Option<CachedHandle<K, V>>, E> {
        if let Some(handle) = self.acquire_cached(key) {
            return Ok(Some(handle));
        }

        let Some(value) = load(&key)? else {
            return Ok(None);
        };

        let mut guard = self.shared.inner.lock().expect("cache lock poisoned");
        let inner = &mut *guard;

        // Another caller may have loaded the same key while we were unlocked.
        if !inner.entries.contains_key(&key) {
            inner.entries.insert(
                key,
                CacheEntry {
                    value: Arc::new(value),
                    refs: 0,
                    stamp: 0,
                },
            );
            inner.unreferenced += 1;
        }
        let Some(value) = inner.reference(key) else {
            return Ok(None);
        };

        Ok(Some(CachedHandle {
            shared: Arc::clone(&self.shared),
            key,
            value,
        }))
    }

    /// Acquire a handle only if the entry is already cached.
    pub fn acquire_cached(&self, key: K) -> Option<CachedHandle<K, V>> {
        let mut guard = self.shared.inner.lock().expect("cache lock poisoned");
        let inner = &mut *guard;

        let value = inner.reference(key)?;

        Some(CachedHandle {
            shared: Arc::clone(&self.shared),
            key,
            value,
        })
    }

    /// Current reference count of `key` (0 if unreferenced or not cached).
    pub fn ref_count(&self, key: &K) -> usize {
        let inner = self.shared.inner.lock().expect("cache lock poisoned");
        inner.entries.get(key).map_or(0, |e| e.refs)
    }

    /// Total number of live references across all entries.
    pub fn outstanding(&self) -> usize {
        self.shared
            .inner
            .lock()
            .expect("cache lock poisoned")
            .outstanding
    }

    /// Whether `key` is currently held in memory.
    pub fn contains(&self, key: &K) -> bool {
        self.shared
            .inner
            .lock()
            .expect("cache lock poisoned")
            .entries
            .contains_key(key)
    }

    /// Number of entries held in memory (referenced or not).
    pub fn len(&self) -> usize {
        self.shared
            .inner
            .lock()
            .expect("cache lock poisoned")
            .entries
            .len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> fmt::Debug for ObjectCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("max_unreferenced", &self.shared.max_unreferenced)
            .finish_non_exhaustive()
    }
}

/// One counted reference to a cached entity.
///
/// Dropping the handle releases the reference, so every exit path of a
/// function that owns a handle releases it, including `?` returns.
pub struct CachedHandle<K: CacheKey, V> {
    shared: Arc<CacheShared<K, V>>,
    key: K,
    value: Arc<V>,
}

impl<K: CacheKey, V> CachedHandle<K, V> {
    /// The key this handle refers to.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Borrow the cached entity.
    pub fn get(&self) -> &V {
        &self.value
    }

    /// Take an additional, independent reference (count + 1).
    ///
    /// Use this before handing the entity to another task.
    pub fn retain(&self) -> Self {
        {
            let mut inner = self.shared.inner.lock().expect("cache lock poisoned");
            if let Some(entry) = inner.entries.get_mut(&self.key) {
                entry.refs += 1;
            }
            inner.outstanding += 1;
        }
        Self {
            shared: Arc::clone(&self.shared),
            key: self.key,
            value: Arc::clone(&self.value),
        }
    }

    /// Release this reference (count - 1).
    ///
    /// Equivalent to dropping the handle; spelled out where the release is
    /// part of the protocol.
    pub fn release(self) {
        drop(self);
    }
}

impl<K: CacheKey, V> Deref for CachedHandle<K, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<K: CacheKey, V> Drop for CachedHandle<K, V> {
    fn drop(&mut self) {
        self.shared.release_one(self.key);
    }
}

impl<K: CacheKey, V: fmt::Debug> fmt::Debug for CachedHandle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedHandle")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}
