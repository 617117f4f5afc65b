//! No-op cache installed in place of shards after shutdown.
//!
//! Every fallible call answers [`CacheError::Shutdown`]; `size` and
//! `capacity` are zero and `shutdown` does nothing. One instance is shared
//! by all slots of a shut-down [`ShardedCache`](crate::sharded::ShardedCache).

use crate::error::CacheError;
use crate::traits::Cache;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NopCache;

impl NopCache {
    pub fn new() -> Self {
        Self
    }
}

impl<K, V> Cache<K, V> for NopCache {
    fn get(&self, _key: &K) -> Result<Option<V>, CacheError> {
        Err(CacheError::Shutdown)
    }

    fn put(&self, _key: K, _value: V) -> Result<(), CacheError> {
        Err(CacheError::Shutdown)
    }

    fn delete(&self, _key: &K) -> Result<bool, CacheError> {
        Err(CacheError::Shutdown)
    }

    fn size(&self) -> usize {
        0
    }

    fn capacity(&self) -> usize {
        0
    }

    fn reset(&self) -> Result<(), CacheError> {
        Err(CacheError::Shutdown)
    }

    fn traverse(&self, _visit: &mut dyn FnMut(&K, &V) -> bool) -> Result<(), CacheError> {
        Err(CacheError::Shutdown)
    }

    fn shutdown(&self) {}
}
