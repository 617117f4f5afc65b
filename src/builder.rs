//! Option builders for every cache in the crate.
//!
//! Each builder collects options, validates them in `build()` and returns
//! [`CacheError::InvalidOptions`] naming the first rejected option. No
//! object is constructed when validation fails.
//!
//! | Builder           | Builds                                   |
//! |-------------------|------------------------------------------|
//! | [`LruOptions`]    | [`LruCache`]                             |
//! | [`ShardedOptions`]| [`ShardedCache`]                         |
//! | [`ExpiryOptions`] | [`ExpiryMap`] (starts its worker thread) |
//!
//! ## Example
//!
//! ```rust
//! use evictkit::builder::{LruOptions, ShardedOptions};
//! use evictkit::sharded::ShardedCache;
//! use evictkit::traits::Cache;
//!
//! let lru = LruOptions::<u64, String>::new(100).build().unwrap();
//! lru.put(1, "hello".to_string()).unwrap();
//! assert_eq!(lru.get(&1).unwrap(), Some("hello".to_string()));
//!
//! let sharded: ShardedCache<u64, String> = ShardedOptions::new(10_000)
//!     .target_per_shard(1_000)
//!     .cpu_count(1)
//!     .hashed_keys(0)
//!     .lru_shards()
//!     .build()
//!     .unwrap();
//! assert_eq!(sharded.shard_count(), 16);
//! ```

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use crate::ds::shard::{derive_shard_count, per_shard_capacity, round_shard_count, ShardSelector};
use crate::error::CacheError;
use crate::expiry::{ExpiredKeys, ExpiryMap, OnExpiry};
use crate::policy::lru::LruCache;
use crate::sharded::ShardedCache;
use crate::traits::{Cache, EvictError, EvictReason, OnEvict, ShardFactory, ShardFn};

/// Default number of entries each shard aims to hold.
pub const DEFAULT_TARGET_PER_SHARD: usize = 1_024;

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// ---------------------------------------------------------------------------
// LruOptions
// ---------------------------------------------------------------------------

/// Options for an [`LruCache`].
pub struct LruOptions<K, V> {
    capacity: usize,
    on_evict: Option<OnEvict<K, V>>,
}

impl<K, V> LruOptions<K, V> {
    /// Starts a builder for a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            on_evict: None,
        }
    }

    /// Sets the callback run once for every entry leaving the cache.
    ///
    /// Errors it returns and panics it raises are logged and discarded.
    pub fn on_evict<F>(mut self, on_evict: F) -> Self
    where
        F: Fn(EvictReason, K, V) -> Result<(), EvictError> + Send + Sync + 'static,
    {
        self.on_evict = Some(Arc::new(on_evict));
        self
    }

    /// Like [`on_evict`](Self::on_evict) with an already shared callback.
    pub fn on_evict_shared(mut self, on_evict: OnEvict<K, V>) -> Self {
        self.on_evict = Some(on_evict);
        self
    }
}

impl<K, V> LruOptions<K, V>
where
    K: Clone + Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Validates the options and builds the cache.
    ///
    /// # Errors
    ///
    /// `InvalidOptions("capacity must be positive")` when `capacity` is 0.
    pub fn build(self) -> Result<LruCache<K, V>, CacheError> {
        if self.capacity == 0 {
            return Err(CacheError::invalid("capacity must be positive"));
        }
        tracing::debug!(capacity = self.capacity, "lru cache built");
        Ok(LruCache::from_parts(self.capacity, self.on_evict))
    }
}

impl<K, V> fmt::Debug for LruOptions<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruOptions")
            .field("capacity", &self.capacity)
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ShardedOptions
// ---------------------------------------------------------------------------

type DeferredShardFn<K> = Box<dyn FnOnce(usize) -> ShardFn<K> + Send>;

enum Routing<K> {
    Custom(ShardFn<K>),
    // Needs the final shard count, known only in `build`.
    Hashed(DeferredShardFn<K>),
}

/// Options for a [`ShardedCache`].
///
/// Shard count: an explicit [`min_shards`](Self::min_shards) is rounded up to
/// a power of two. Otherwise it is derived as
/// `max(ceil(capacity / target_per_shard), cpu_count * 4)`, rounded up to a
/// power of two and capped at [`MAX_SHARDS`](crate::ds::MAX_SHARDS). Each
/// shard gets `ceil(capacity / shards)` entries.
pub struct ShardedOptions<K, V> {
    capacity: usize,
    target_per_shard: usize,
    min_shards: Option<usize>,
    cpu_count: Option<usize>,
    routing: Option<Routing<K>>,
    shard_factory: Option<ShardFactory<K, V>>,
    _marker: PhantomData<fn() -> V>,
}

impl<K, V> ShardedOptions<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Starts a builder for `capacity` entries in total.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            target_per_shard: DEFAULT_TARGET_PER_SHARD,
            min_shards: None,
            cpu_count: None,
            routing: None,
            shard_factory: None,
            _marker: PhantomData,
        }
    }

    /// Entries each shard should hold when the shard count is derived.
    pub fn target_per_shard(mut self, target: usize) -> Self {
        self.target_per_shard = target;
        self
    }

    /// Fixes the shard count (rounded up to a power of two), bypassing the
    /// derivation heuristic.
    pub fn min_shards(mut self, min_shards: usize) -> Self {
        self.min_shards = Some(min_shards);
        self
    }

    /// CPU count fed to the derivation heuristic. Defaults to
    /// `std::thread::available_parallelism()`.
    pub fn cpu_count(mut self, cpus: usize) -> Self {
        self.cpu_count = Some(cpus);
        self
    }

    /// Routes keys with `shard_fn`. Results are masked into range.
    pub fn shard_fn<F>(mut self, shard_fn: F) -> Self
    where
        F: Fn(&K) -> usize + Send + Sync + 'static,
    {
        self.routing = Some(Routing::Custom(Arc::new(shard_fn)));
        self
    }

    /// Routes keys by a seeded hash through [`ShardSelector`].
    pub fn hashed_keys(mut self, seed: u64) -> Self
    where
        K: Hash,
    {
        self.routing = Some(Routing::Hashed(Box::new(move |shards: usize| {
            let selector = ShardSelector::new(shards, seed);
            let shard_fn: ShardFn<K> = Arc::new(move |key: &K| selector.shard_for_key(key));
            shard_fn
        })));
        self
    }

    /// Builds each shard with `factory(per_shard_capacity)`.
    pub fn shard_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(usize) -> Result<Arc<dyn Cache<K, V>>, CacheError> + Send + Sync + 'static,
    {
        self.shard_factory = Some(Arc::new(factory));
        self
    }

    /// Validates the options and builds every shard.
    ///
    /// # Errors
    ///
    /// `InvalidOptions` for, in order of checking: zero capacity, missing
    /// shard function, missing shard factory, `min_shards(0)`. Otherwise any
    /// error returned by the factory, after shutting down the shards it
    /// already built.
    pub fn build(self) -> Result<ShardedCache<K, V>, CacheError> {
        if self.capacity == 0 {
            return Err(CacheError::invalid("capacity must be positive"));
        }
        let Some(routing) = self.routing else {
            return Err(CacheError::invalid("shard_fn must be provided"));
        };
        let Some(factory) = self.shard_factory else {
            return Err(CacheError::invalid("shard_factory must be provided"));
        };

        let shards = match self.min_shards {
            Some(0) => return Err(CacheError::invalid("min_shards must be positive")),
            Some(min) => round_shard_count(min),
            None => derive_shard_count(
                self.capacity,
                self.target_per_shard,
                self.cpu_count.unwrap_or_else(available_cpus),
            ),
        };
        let per_shard = per_shard_capacity(self.capacity, shards);

        let shard_fn: ShardFn<K> = match routing {
            Routing::Custom(shard_fn) => shard_fn,
            Routing::Hashed(make) => make(shards),
        };

        let cache = ShardedCache::with_factory(shards, per_shard, shard_fn, &factory)?;
        tracing::debug!(
            capacity = self.capacity,
            shards,
            per_shard_capacity = per_shard,
            "sharded cache built"
        );
        Ok(cache)
    }
}

impl<K, V> ShardedOptions<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Uses an [`LruCache`] without callback for every shard.
    pub fn lru_shards(self) -> Self {
        self.shard_factory(|capacity| {
            let shard: Arc<dyn Cache<K, V>> = Arc::new(LruCache::new(capacity)?);
            Ok(shard)
        })
    }

    /// Uses an [`LruCache`] for every shard, all sharing `on_evict`.
    pub fn lru_shards_with<F>(self, on_evict: F) -> Self
    where
        F: Fn(EvictReason, K, V) -> Result<(), EvictError> + Send + Sync + 'static,
    {
        let on_evict: OnEvict<K, V> = Arc::new(on_evict);
        self.shard_factory(move |capacity| {
            let shard = LruOptions::new(capacity)
                .on_evict_shared(Arc::clone(&on_evict))
                .build()?;
            let shard: Arc<dyn Cache<K, V>> = Arc::new(shard);
            Ok(shard)
        })
    }
}

impl<K, V> fmt::Debug for ShardedOptions<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedOptions")
            .field("capacity", &self.capacity)
            .field("target_per_shard", &self.target_per_shard)
            .field("min_shards", &self.min_shards)
            .field("cpu_count", &self.cpu_count)
            .field("routing", &self.routing.is_some())
            .field("shard_factory", &self.shard_factory.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ExpiryOptions
// ---------------------------------------------------------------------------

/// Options for an [`ExpiryMap`].
pub struct ExpiryOptions<K> {
    bucket_width: Duration,
    on_expiry: Option<OnExpiry<K>>,
}

impl<K> ExpiryOptions<K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    /// Starts a builder whose deadlines round up to multiples of
    /// `bucket_width`.
    pub fn new(bucket_width: Duration) -> Self {
        Self {
            bucket_width,
            on_expiry: None,
        }
    }

    /// Sets the callback receiving each due bucket on the worker thread.
    pub fn on_expiry<F>(mut self, on_expiry: F) -> Self
    where
        F: Fn(&ExpiredKeys<K>) + Send + Sync + 'static,
    {
        self.on_expiry = Some(Arc::new(on_expiry));
        self
    }

    /// Validates the options and starts the worker thread.
    ///
    /// # Errors
    ///
    /// `InvalidOptions("bucket_width must be positive")` for a zero width;
    /// [`CacheError::Spawn`] if the thread cannot be started.
    pub fn build(self) -> Result<ExpiryMap<K>, CacheError> {
        if self.bucket_width.is_zero() {
            return Err(CacheError::invalid("bucket_width must be positive"));
        }
        ExpiryMap::start(self.bucket_width, self.on_expiry)
    }
}

impl<K> fmt::Debug for ExpiryOptions<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiryOptions")
            .field("bucket_width", &self.bucket_width)
            .field("on_expiry", &self.on_expiry.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: CacheError) -> String {
        match err {
            CacheError::InvalidOptions(config) => config.message().to_string(),
            other => panic!("expected InvalidOptions, got {other:?}"),
        }
    }

    mod lru {
        use super::*;

        #[test]
        fn rejects_zero_capacity() {
            let err = LruOptions::<u64, u64>::new(0).build().unwrap_err();
            assert_eq!(message(err), "capacity must be positive");
        }

        #[test]
        fn builds_with_capacity() {
            let cache = LruOptions::<u64, u64>::new(7).build().unwrap();
            assert_eq!(cache.capacity(), 7);
            assert_eq!(cache.size(), 0);
        }
    }

    mod sharded {
        use super::*;

        #[test]
        fn validation_order_and_messages() {
            let err = ShardedOptions::<u64, u64>::new(0)
                .shard_fn(|k| *k as usize)
                .lru_shards()
                .build()
                .unwrap_err();
            assert_eq!(message(err), "capacity must be positive");

            let err = ShardedOptions::<u64, u64>::new(8)
                .lru_shards()
                .build()
                .unwrap_err();
            assert_eq!(message(err), "shard_fn must be provided");

            let err = ShardedOptions::<u64, u64>::new(8)
                .shard_fn(|k| *k as usize)
                .build()
                .unwrap_err();
            assert_eq!(message(err), "shard_factory must be provided");

            let err = ShardedOptions::<u64, u64>::new(8)
                .shard_fn(|k| *k as usize)
                .lru_shards()
                .min_shards(0)
                .build()
                .unwrap_err();
            assert_eq!(message(err), "min_shards must be positive");
        }

        #[test]
        fn derives_shard_count_from_capacity() {
            let cache = ShardedOptions::<u64, u64>::new(100_000)
                .target_per_shard(1_000)
                .cpu_count(2)
                .hashed_keys(1)
                .lru_shards()
                .build()
                .unwrap();
            assert_eq!(cache.shard_count(), 128);
            assert_eq!(cache.per_shard_capacity(), 782);
        }

        #[test]
        fn cpu_floor_and_cap() {
            let cache = ShardedOptions::<u64, u64>::new(10)
                .cpu_count(8)
                .hashed_keys(0)
                .lru_shards()
                .build()
                .unwrap();
            assert_eq!(cache.shard_count(), 32);
            assert_eq!(cache.per_shard_capacity(), 1);

            let cache = ShardedOptions::<u64, u64>::new(1_000_000)
                .target_per_shard(1)
                .cpu_count(1)
                .hashed_keys(0)
                .lru_shards()
                .build()
                .unwrap();
            assert_eq!(cache.shard_count(), 256);
        }

        #[test]
        fn explicit_min_shards_is_not_capped() {
            let cache = ShardedOptions::<u64, u64>::new(1_000)
                .min_shards(300)
                .hashed_keys(0)
                .lru_shards()
                .build()
                .unwrap();
            assert_eq!(cache.shard_count(), 512);
            assert_eq!(cache.per_shard_capacity(), 2);
        }

        #[test]
        fn hashed_keys_round_trip() {
            let cache = ShardedOptions::<String, u32>::new(256)
                .min_shards(4)
                .hashed_keys(99)
                .lru_shards()
                .build()
                .unwrap();
            for i in 0..20u32 {
                cache.put(format!("key-{i}"), i).unwrap();
            }
            for i in 0..20u32 {
                assert_eq!(cache.get(&format!("key-{i}")).unwrap(), Some(i));
            }
        }
    }

    mod expiry {
        use super::*;

        #[test]
        fn rejects_zero_width() {
            let err = ExpiryOptions::<u64>::new(Duration::ZERO)
                .build()
                .unwrap_err();
            assert_eq!(message(err), "bucket_width must be positive");
        }

        #[test]
        fn builds_and_reports_width() {
            let map = ExpiryOptions::<u64>::new(Duration::from_secs(5))
                .build()
                .unwrap();
            assert_eq!(map.bucket_width(), Duration::from_secs(5));
            assert!(map.is_empty());
            map.shutdown();
        }
    }
}
