//! Sharded cache router.
//!
//! [`ShardedCache`] owns a power-of-two number of independent caches and
//! routes every key to one of them, so threads touching different shards
//! never contend on the same lock.
//!
//! ## Architecture
//!
//! ```text
//!   key ──shard_fn──► n ──n & (shards - 1)──► slot
//!
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │ ShardedCache<K, V>                                           │
//!   │                                                              │
//!   │  slots: [RwLock<Arc<dyn Cache<K, V>>>; shards]               │
//!   │   ┌────────┬────────┬────────┬────────┐                      │
//!   │   │ shard0 │ shard1 │ shard2 │ shard3 │   (live)             │
//!   │   └────────┴────────┴────────┴────────┘                      │
//!   │                     │ shutdown()                             │
//!   │                     ▼                                        │
//!   │   ┌────────┬────────┬────────┬────────┐                      │
//!   │   │  nop   │  nop   │  nop   │  nop   │   (one shared Arc)   │
//!   │   └────────┴────────┴────────┴────────┘                      │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A call clones the shard's `Arc` out of its slot and releases the slot
//! lock before touching the shard. A call racing with shutdown therefore
//! completes against the live shard or sees the no-op sentinel; it never
//! sees a missing or half-built shard.
//!
//! ## Aggregates
//!
//! `size` and `capacity` sum shards one at a time without a global lock; a
//! concurrent mutation on a shard already summed is not reflected. After
//! shutdown both are 0.
//!
//! ## Example Usage
//!
//! ```
//! use evictkit::builder::ShardedOptions;
//! use evictkit::sharded::ShardedCache;
//! use evictkit::traits::Cache;
//!
//! let cache: ShardedCache<u64, String> = ShardedOptions::new(64)
//!     .min_shards(8)
//!     .shard_fn(|k: &u64| *k as usize)
//!     .lru_shards()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(cache.shard_count(), 8);
//! cache.put(3, "three".to_string()).unwrap();
//! assert_eq!(cache.get(&3).unwrap(), Some("three".to_string()));
//!
//! cache.shutdown();
//! assert!(cache.get(&3).unwrap_err().is_shutdown());
//! ```

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CacheError;
use crate::policy::nop::NopCache;
use crate::traits::{Cache, ShardFactory, ShardFn};

type ShardSlot<K, V> = RwLock<Arc<dyn Cache<K, V>>>;

/// A cache that partitions keys across independent shards.
pub struct ShardedCache<K, V> {
    slots: Box<[ShardSlot<K, V>]>,
    mask: usize,
    shard_fn: ShardFn<K>,
    per_shard_capacity: usize,
    shut_down: AtomicBool,
}

impl<K, V> ShardedCache<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Builds `shard_count` shards through `factory`.
    ///
    /// `shard_count` must be a power of two. If any shard fails to build,
    /// the shards built so far are shut down and the error is returned.
    pub(crate) fn with_factory(
        shard_count: usize,
        per_shard_capacity: usize,
        shard_fn: ShardFn<K>,
        factory: &ShardFactory<K, V>,
    ) -> Result<Self, CacheError> {
        debug_assert!(shard_count.is_power_of_two());

        let mut shards: Vec<Arc<dyn Cache<K, V>>> = Vec::with_capacity(shard_count);
        for index in 0..shard_count {
            match factory(per_shard_capacity) {
                Ok(shard) => shards.push(shard),
                Err(error) => {
                    tracing::warn!(
                        shard = index,
                        error = %error,
                        "shard construction failed; shutting down built shards"
                    );
                    for shard in &shards {
                        shard.shutdown();
                    }
                    return Err(error);
                },
            }
        }

        Ok(Self {
            slots: shards.into_iter().map(RwLock::new).collect(),
            mask: shard_count - 1,
            shard_fn,
            per_shard_capacity,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn shard_count(&self) -> usize {
        self.slots.len()
    }

    /// Capacity each shard was built with.
    pub fn per_shard_capacity(&self) -> usize {
        self.per_shard_capacity
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Index of the shard `key` routes to.
    pub fn shard_index(&self, key: &K) -> usize {
        (self.shard_fn)(key) & self.mask
    }

    fn shard(&self, index: usize) -> Arc<dyn Cache<K, V>> {
        Arc::clone(&self.slots[index].read())
    }

    fn shard_for(&self, key: &K) -> Arc<dyn Cache<K, V>> {
        self.shard(self.shard_index(key))
    }
}

impl<K, V> Cache<K, V> for ShardedCache<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        self.shard_for(key).get(key)
    }

    fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        self.shard_for(&key).put(key, value)
    }

    fn delete(&self, key: &K) -> Result<bool, CacheError> {
        self.shard_for(key).delete(key)
    }

    fn size(&self) -> usize {
        (0..self.slots.len()).map(|i| self.shard(i).size()).sum()
    }

    fn capacity(&self) -> usize {
        (0..self.slots.len()).map(|i| self.shard(i).capacity()).sum()
    }

    /// Resets shards in order, stopping at the first shard that reports
    /// shutdown.
    fn reset(&self) -> Result<(), CacheError> {
        for index in 0..self.slots.len() {
            self.shard(index).reset()?;
        }
        Ok(())
    }

    /// Visits shards in index order, each most recently used first, and stops
    /// everywhere once `visit` returns `false`.
    fn traverse(&self, visit: &mut dyn FnMut(&K, &V) -> bool) -> Result<(), CacheError> {
        for index in 0..self.slots.len() {
            let mut stopped = false;
            self.shard(index).traverse(&mut |key, value| {
                let keep_going = visit(key, value);
                stopped = !keep_going;
                keep_going
            })?;
            if stopped {
                break;
            }
        }
        Ok(())
    }

    fn shutdown(&self) {
        if self
            .shut_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let nop: Arc<dyn Cache<K, V>> = Arc::new(NopCache);
        let detached: Vec<Arc<dyn Cache<K, V>>> = self
            .slots
            .iter()
            .map(|slot| mem::replace(&mut *slot.write(), Arc::clone(&nop)))
            .collect();

        for shard in &detached {
            shard.shutdown();
        }
        tracing::debug!(shards = detached.len(), "sharded cache shut down");
    }
}

impl<K, V> fmt::Debug for ShardedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedCache")
            .field("shards", &self.slots.len())
            .field("per_shard_capacity", &self.per_shard_capacity)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
