//! # Least Recently Used (LRU) Cache Implementation
//!
//! A capacity-bounded LRU cache with eviction callbacks that never run under
//! the cache lock.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────────────────────────────────┐
//!   │                           LruCache<K, V>                                 │
//!   │                                                                          │
//!   │   on_evict: Option<OnEvict<K, V>>       (runs after the lock is dropped) │
//!   │                                                                          │
//!   │   ┌────────────────────────────────────────────────────────────────────┐ │
//!   │   │             RwLock<LruState { core, shutdown }>                    │ │
//!   │   └────────────────────────────────────────────────────────────────────┘ │
//!   │                                  │                                       │
//!   │                                  ▼                                       │
//!   │   ┌────────────────────────────────────────────────────────────────────┐ │
//!   │   │                         LruCore<K, V>                              │ │
//!   │   │                                                                    │ │
//!   │   │   FxHashMap<K, ListHandle>                                         │ │
//!   │   │        │          │          │                                     │ │
//!   │   │        ▼          ▼          ▼                                     │ │
//!   │   │   OrderedList<Entry { key, value }>                                │ │
//!   │   │   ROOT ──► [A] ◄──► [B] ◄──► [C] ──► ROOT                          │ │
//!   │   │            MRU               LRU                                   │ │
//!   │   └────────────────────────────────────────────────────────────────────┘ │
//!   └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! | Component        | Description                                          |
//! |------------------|------------------------------------------------------|
//! | `LruCore<K, V>`  | Single-threaded core: index + recency list           |
//! | `LruCache<K, V>` | Thread-safe [`Cache`] with shutdown and callbacks    |
//! | `Entry<K, V>`    | Key and value stored in one pooled list slot         |
//!
//! ## Eviction Flow
//!
//! ```text
//!   put(D) on a full cache (capacity = 3)
//!   ═══════════════════════════════════════════════════════════════════════════
//!
//!   1. write lock
//!   2. pop [C] from the back, drop C from the index   ── state is consistent
//!   3. push [D] at the front, index D
//!   4. unlock
//!   5. on_evict(Capacity, C, value)                   ── no lock held
//! ```
//!
//! Because every mutation is committed before the callback runs, a failing
//! or panicking callback cannot leave the cache half-updated, and a callback
//! may call back into the same cache without deadlocking.
//!
//! ## Concurrency Model
//!
//! | Method                 | Lock Type | Notes                               |
//! |------------------------|-----------|-------------------------------------|
//! | `get`                  | Write     | Moves the entry to the front        |
//! | `put` / `delete`       | Write     | May produce evictions               |
//! | `reset` / `shutdown`   | Write     | Drains everything                   |
//! | `peek` / `contains`    | Read      | No reordering                       |
//! | `size` / `traverse`    | Read      |                                     |
//!
//! ## Example Usage
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use evictkit::builder::LruOptions;
//! use evictkit::traits::{Cache, EvictReason};
//!
//! let evicted = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&evicted);
//! let cache = LruOptions::new(2)
//!     .on_evict(move |reason, key: u32, _value: &'static str| {
//!         sink.lock().unwrap().push((reason, key));
//!         Ok(())
//!     })
//!     .build()
//!     .unwrap();
//!
//! cache.put(1, "one").unwrap();
//! cache.put(2, "two").unwrap();
//! cache.get(&1).unwrap();
//! cache.put(3, "three").unwrap();
//!
//! assert_eq!(*evicted.lock().unwrap(), vec![(EvictReason::Capacity, 2)]);
//! assert_eq!(cache.get(&2).unwrap(), None);
//! ```

use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::builder::LruOptions;
use crate::ds::{ListHandle, OrderedList};
use crate::error::{panic_message, CacheError, InvariantError};
use crate::traits::{Cache, EvictReason, OnEvict};

/// Key and value stored in one list slot.
#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
}

/// Single-threaded LRU core: a key index over a recency-ordered list.
///
/// Mutations hand evicted entries back to the caller instead of reporting
/// them, which lets [`LruCache`] run callbacks after releasing its lock.
///
/// A capacity of 0 accepts nothing: `insert` returns the pair straight back
/// as evicted.
pub struct LruCore<K, V> {
    map: FxHashMap<K, ListHandle>,
    list: OrderedList<Entry<K, V>>,
    capacity: usize,
}

impl<K, V> LruCore<K, V> {
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> LruCore<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Creates an empty core holding at most `capacity` entries.
    ///
    /// # Example
    /// ```
    /// use evictkit::policy::lru::LruCore;
    ///
    /// let core: LruCore<u32, String> = LruCore::new(100);
    /// assert_eq!(core.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self {
            map: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            list: OrderedList::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Returns the value for `key` and moves it to the front.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let handle = *self.map.get(key)?;
        self.list.move_to_front(handle).ok()?;
        self.list.get(handle).map(|entry| &entry.value)
    }

    /// Returns the value for `key` without touching recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let handle = *self.map.get(key)?;
        self.list.get(handle).map(|entry| &entry.value)
    }

    /// Inserts or updates `key` at the front.
    ///
    /// An existing key has its value replaced in place. A new key on a full
    /// core first evicts the back entry, which is returned.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if let Some(&handle) = self.map.get(&key) {
            if let Some(entry) = self.list.get_mut(handle) {
                entry.value = value;
            }
            let moved = self.list.move_to_front(handle);
            debug_assert!(moved.is_ok(), "mapped handle missing from the list");
            return None;
        }
        if self.capacity == 0 {
            return Some((key, value));
        }

        let evicted = if self.map.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        let handle = self.list.push_front(Entry {
            key: key.clone(),
            value,
        });
        self.map.insert(key, handle);
        evicted
    }

    /// Removes `key` and returns its entry.
    pub fn remove(&mut self, key: &K) -> Option<(K, V)> {
        let handle = self.map.remove(key)?;
        self.list
            .remove(handle)
            .map(|entry| (entry.key, entry.value))
    }

    /// Removes and returns the least recently used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        let entry = self.list.pop_back()?;
        self.map.remove(&entry.key);
        Some((entry.key, entry.value))
    }

    /// Removes every entry, most recently used first.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.map.len());
        while let Some(entry) = self.list.pop_front() {
            drained.push((entry.key, entry.value));
        }
        self.map.clear();
        self.list.clear();
        drained
    }

    /// Iterates entries most recently used first.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.list.iter().map(|entry| (&entry.key, &entry.value))
    }

    /// Checks that index and list agree and that the list ring is intact.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.list.check_invariants()?;
        if self.map.len() != self.list.len() {
            return Err(InvariantError::new(format!(
                "index holds {} keys but list holds {} entries",
                self.map.len(),
                self.list.len()
            )));
        }
        if self.capacity > 0 && self.map.len() > self.capacity {
            return Err(InvariantError::new(format!(
                "size {} exceeds capacity {}",
                self.map.len(),
                self.capacity
            )));
        }
        for (handle, entry) in self.list.iter_entries() {
            if self.map.get(&entry.key) != Some(&handle) {
                return Err(InvariantError::new(
                    "list entry is not indexed under its key",
                ));
            }
        }
        Ok(())
    }
}

impl<K, V> fmt::Debug for LruCore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCore")
            .field("len", &self.map.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

struct LruState<K, V> {
    core: LruCore<K, V>,
    shutdown: bool,
}

/// Thread-safe LRU cache.
///
/// Build one with [`LruOptions`] or [`LruCache::new`].
pub struct LruCache<K, V> {
    state: RwLock<LruState<K, V>>,
    capacity: usize,
    on_evict: Option<OnEvict<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Creates a cache without an eviction callback.
    ///
    /// # Errors
    ///
    /// [`CacheError::InvalidOptions`] if `capacity` is 0.
    ///
    /// # Example
    /// ```
    /// use evictkit::policy::lru::LruCache;
    /// use evictkit::traits::Cache;
    ///
    /// let cache: LruCache<u32, String> = LruCache::new(100).unwrap();
    /// assert_eq!(cache.capacity(), 100);
    /// assert!(LruCache::<u32, String>::new(0).is_err());
    /// ```
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        LruOptions::new(capacity).build()
    }

    /// Assembles a cache from already validated options.
    pub(crate) fn from_parts(capacity: usize, on_evict: Option<OnEvict<K, V>>) -> Self {
        Self {
            state: RwLock::new(LruState {
                core: LruCore::new(capacity),
                shutdown: false,
            }),
            capacity,
            on_evict,
        }
    }

    /// Returns the value for `key` without updating recency.
    pub fn peek(&self, key: &K) -> Result<Option<V>, CacheError> {
        let state = self.state.read();
        if state.shutdown {
            return Err(CacheError::Shutdown);
        }
        Ok(state.core.peek(key).cloned())
    }

    /// Returns `true` if `key` is cached. Always `false` after shutdown.
    pub fn contains(&self, key: &K) -> bool {
        self.state.read().core.contains(key)
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.read().shutdown
    }

    /// Checks the internal index/list invariants under a read lock.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.state.read().core.check_invariants()
    }

    fn dispatch(&self, reason: EvictReason, evicted: Vec<(K, V)>) {
        let Some(on_evict) = &self.on_evict else {
            return;
        };
        for (key, value) in evicted {
            match panic::catch_unwind(AssertUnwindSafe(|| on_evict(reason, key, value))) {
                Ok(Ok(())) => {},
                Ok(Err(error)) => {
                    tracing::warn!(error = %error, ?reason, "eviction callback failed");
                },
                Err(payload) => {
                    tracing::error!(
                        panic = panic_message(payload.as_ref()),
                        ?reason,
                        "eviction callback panicked"
                    );
                },
            }
        }
    }
}

impl<K, V> Cache<K, V> for LruCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        let mut state = self.state.write();
        if state.shutdown {
            return Err(CacheError::Shutdown);
        }
        Ok(state.core.get(key).cloned())
    }

    fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        let evicted = {
            let mut state = self.state.write();
            if state.shutdown {
                return Err(CacheError::Shutdown);
            }
            state.core.insert(key, value)
        };
        if let Some(entry) = evicted {
            self.dispatch(EvictReason::Capacity, vec![entry]);
        }
        Ok(())
    }

    fn delete(&self, key: &K) -> Result<bool, CacheError> {
        let removed = {
            let mut state = self.state.write();
            if state.shutdown {
                return Err(CacheError::Shutdown);
            }
            state.core.remove(key)
        };
        match removed {
            Some(entry) => {
                self.dispatch(EvictReason::Deleted, vec![entry]);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    fn size(&self) -> usize {
        self.state.read().core.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn reset(&self) -> Result<(), CacheError> {
        let drained = {
            let mut state = self.state.write();
            if state.shutdown {
                return Err(CacheError::Shutdown);
            }
            state.core.drain()
        };
        self.dispatch(EvictReason::Reset, drained);
        Ok(())
    }

    fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> Result<(), CacheError> {
        let state = self.state.read();
        if state.shutdown {
            return Err(CacheError::Shutdown);
        }
        for (key, value) in state.core.iter() {
            if !visit(key, value) {
                break;
            }
        }
        Ok(())
    }

    fn shutdown(&self) {
        let drained = {
            let mut state = self.state.write();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.core.drain()
        };
        tracing::debug!(
            capacity = self.capacity,
            drained = drained.len(),
            "lru cache shut down"
        );
        self.dispatch(EvictReason::Shutdown, drained);
    }
}

impl<K, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("LruCache")
            .field("len", &state.core.len())
            .field("capacity", &self.capacity)
            .field("shutdown", &state.shutdown)
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}
