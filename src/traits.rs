//! # Cache Capability Contract
//!
//! Defines the [`Cache`] trait implemented by every cache in this crate and
//! the callback types used to configure them.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │               Cache<K, V>                    │
//!                 │        (Send + Sync, all methods &self)      │
//!                 │                                              │
//!                 │  get(&K)        → Result<Option<V>>          │
//!                 │  put(K, V)      → Result<()>                 │
//!                 │  delete(&K)     → Result<bool>               │
//!                 │  size()         → usize                      │
//!                 │  capacity()     → usize                      │
//!                 │  reset()        → Result<()>                 │
//!                 │  traverse(visit)→ Result<()>                 │
//!                 │  shutdown()                                  │
//!                 │  get_multi(keys, hit, miss) (provided)       │
//!                 └──────────────────────┬───────────────────────┘
//!                                        │
//!          ┌─────────────────────────────┼─────────────────────────────┐
//!          ▼                             ▼                             ▼
//!   ┌──────────────┐           ┌──────────────────┐           ┌──────────────┐
//!   │ LruCache     │           │ ShardedCache     │           │ NopCache     │
//!   │ capacity-    │  shards   │ routes keys over │  after    │ answers      │
//!   │ bounded LRU  │◄──────────│ N Arc<dyn Cache> │──────────►│ Shutdown     │
//!   └──────────────┘           └──────────────────┘ shutdown  └──────────────┘
//! ```
//!
//! ## Shutdown
//!
//! `shutdown()` is irreversible and idempotent. Afterwards every fallible
//! operation reports [`CacheError::Shutdown`]; a new instance must be built
//! to continue caching.
//!
//! ## Example Usage
//!
//! ```
//! use evictkit::builder::LruOptions;
//! use evictkit::traits::Cache;
//!
//! fn warm<C: Cache<u64, String>>(cache: &C, data: &[(u64, String)]) {
//!     for (k, v) in data {
//!         cache.put(*k, v.clone()).unwrap();
//!     }
//! }
//!
//! let cache = LruOptions::<u64, String>::new(10).build().unwrap();
//! warm(&cache, &[(1, "one".into()), (2, "two".into())]);
//! assert_eq!(cache.size(), 2);
//! ```

use std::error::Error;
use std::sync::Arc;

use crate::error::CacheError;

/// Why an entry left a cache. Passed to the eviction callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictReason {
    /// Displaced by an insert into a full cache.
    Capacity,
    /// Removed by an explicit `delete`.
    Deleted,
    /// Removed by `reset`.
    Reset,
    /// Removed by `shutdown`.
    Shutdown,
}

/// Error type an eviction callback may return. It is logged and dropped.
pub type EvictError = Box<dyn Error + Send + Sync>;

/// Eviction callback: receives ownership of the evicted key and value.
///
/// Runs on the thread that triggered the eviction, after the cache has
/// released its lock, so it may call back into the cache.
pub type OnEvict<K, V> = Arc<dyn Fn(EvictReason, K, V) -> Result<(), EvictError> + Send + Sync>;

/// Maps a key to a shard index. Out-of-range results are masked into range.
pub type ShardFn<K> = Arc<dyn Fn(&K) -> usize + Send + Sync>;

/// Builds one shard for the given per-shard capacity.
pub type ShardFactory<K, V> =
    Arc<dyn Fn(usize) -> Result<Arc<dyn Cache<K, V>>, CacheError> + Send + Sync>;

/// Thread-safe cache with an irreversible shutdown transition.
///
/// All methods take `&self`; implementations synchronise internally so a
/// cache can be shared as `Arc<dyn Cache<K, V>>`.
pub trait Cache<K, V>: Send + Sync {
    /// Returns a clone of the value for `key` and marks it most recently used.
    fn get(&self, key: &K) -> Result<Option<V>, CacheError>;

    /// Inserts or updates `key`, marking it most recently used.
    fn put(&self, key: K, value: V) -> Result<(), CacheError>;

    /// Removes `key`. Returns whether it was present.
    fn delete(&self, key: &K) -> Result<bool, CacheError>;

    /// Number of live entries.
    fn size(&self) -> usize;

    /// Maximum number of entries.
    fn capacity(&self) -> usize;

    /// Removes every entry. The cache stays usable.
    fn reset(&self) -> Result<(), CacheError>;

    /// Visits entries most recently used first until `visit` returns `false`.
    ///
    /// `visit` runs while the cache is locked and must not call back into it.
    fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> Result<(), CacheError>;

    /// Removes every entry and refuses further use.
    fn shutdown(&self);

    /// Looks up each key produced by `keys`, calling `hit` with the key and
    /// value or `miss` with the key.
    ///
    /// Keys are pulled lazily. Stops with [`CacheError::Shutdown`] as soon as
    /// a lookup observes shutdown.
    fn get_multi<I, H, M>(&self, keys: I, mut hit: H, mut miss: M) -> Result<(), CacheError>
    where
        Self: Sized,
        I: IntoIterator<Item = K>,
        H: FnMut(K, V),
        M: FnMut(K),
    {
        for key in keys {
            match self.get(&key)? {
                Some(value) => hit(key, value),
                None => miss(key),
            }
        }
        Ok(())
    }
}
