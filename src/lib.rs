//! evictkit: an in-memory LRU cache with deferred eviction callbacks, a
//! sharded cache router and a bucketed key-expiry scheduler.
//!
//! ## Modules
//!
//! - [`policy::lru`]: [`LruCache`], a capacity-bounded LRU cache. Eviction
//!   callbacks run after the cache lock is released.
//! - [`sharded`]: [`ShardedCache`], routing keys over a power-of-two number
//!   of independent caches.
//! - [`expiry`]: [`ExpiryMap`], grouping keys into time buckets and firing
//!   a callback per due bucket on a background thread.
//! - [`builder`]: validated option builders for all of the above.
//! - [`ds`]: the arena, ordered list, heap and shard helpers they are built
//!   from.
//!
//! ## Example
//!
//! ```
//! use evictkit::prelude::*;
//!
//! let cache = LruOptions::<u64, String>::new(2).build().unwrap();
//! cache.put(1, "one".to_string()).unwrap();
//! cache.put(2, "two".to_string()).unwrap();
//! cache.get(&1).unwrap();
//! cache.put(3, "three".to_string()).unwrap();
//!
//! assert_eq!(cache.get(&2).unwrap(), None);
//! assert_eq!(cache.size(), 2);
//! ```

pub mod builder;
pub mod ds;
pub mod error;
pub mod expiry;
pub mod policy;
pub mod prelude;
pub mod sharded;
pub mod traits;

pub use crate::builder::{ExpiryOptions, LruOptions, ShardedOptions};
pub use crate::error::{CacheError, ConfigError};
pub use crate::expiry::{ExpiredKeys, ExpiryMap, Handle};
pub use crate::policy::lru::LruCache;
pub use crate::policy::nop::NopCache;
pub use crate::sharded::ShardedCache;
pub use crate::traits::{Cache, EvictReason};
