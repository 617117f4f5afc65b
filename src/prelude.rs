//! Common imports: `use evictkit::prelude::*;`

pub use crate::builder::{ExpiryOptions, LruOptions, ShardedOptions};
pub use crate::error::CacheError;
pub use crate::expiry::{ExpiredKeys, ExpiryMap};
pub use crate::policy::lru::LruCache;
pub use crate::sharded::ShardedCache;
pub use crate::traits::{Cache, EvictError, EvictReason};
