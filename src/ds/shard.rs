//! Shard selection and shard-count derivation.
//!
//! [`ShardSelector`] maps a `Hash`able key onto one of a power-of-two number
//! of shards and is the default shard function used by
//! [`ShardedOptions`](crate::builder::ShardedOptions). The free functions
//! size a shard set for a total capacity.
//!
//! ## Architecture
//!
//! ```text
//!   capacity = 10_000, target_per_shard = 1_000, cpu_count = 4
//!
//!   raw     = max(ceil(10_000 / 1_000), 4 * 4) = max(10, 16) = 16
//!   rounded = next_power_of_two(16)              = 16
//!   shards  = min(16, MAX_SHARDS)                = 16
//!   per     = ceil(10_000 / 16)                  = 625
//!
//!   key ──hash(seed, key)──► h ──h & (shards - 1)──► shard index
//! ```
//!
//! ## Example Usage
//!
//! ```
//! use evictkit::ds::{derive_shard_count, per_shard_capacity, ShardSelector};
//!
//! let shards = derive_shard_count(10_000, 1_000, 4);
//! assert_eq!(shards, 16);
//! assert_eq!(per_shard_capacity(10_000, shards), 625);
//!
//! let selector = ShardSelector::new(shards, 0);
//! let shard = selector.shard_for_key(&"user:123");
//! assert!(shard < shards);
//! assert_eq!(selector.shard_for_key(&"user:123"), shard);
//! ```
//!
//! ## Performance
//!
//! - `shard_for_key`: O(1) with cost of hashing the key

use std::hash::{BuildHasher, Hash};

use rustc_hash::FxBuildHasher;

/// Upper bound applied to heuristically derived shard counts.
pub const MAX_SHARDS: usize = 256;

/// Derives a power-of-two shard count for `capacity` entries.
///
/// Takes the larger of `ceil(capacity / target_per_shard)` and
/// `cpu_count * 4`, rounds it up to a power of two and caps it at
/// [`MAX_SHARDS`]. A `target_per_shard` of zero leaves the CPU floor alone
/// in charge. The result is always at least 1.
pub fn derive_shard_count(capacity: usize, target_per_shard: usize, cpu_count: usize) -> usize {
    let by_capacity = if target_per_shard == 0 {
        0
    } else {
        capacity.div_ceil(target_per_shard)
    };
    let raw = by_capacity.max(cpu_count.saturating_mul(4)).max(1);
    raw.checked_next_power_of_two()
        .unwrap_or(MAX_SHARDS)
        .min(MAX_SHARDS)
}

/// Rounds an explicit shard minimum up to a power of two.
///
/// Not capped by [`MAX_SHARDS`].
pub fn round_shard_count(min_shards: usize) -> usize {
    min_shards
        .max(1)
        .checked_next_power_of_two()
        .unwrap_or(1 << (usize::BITS - 1))
}

/// Capacity given to each of `shards` shards: `ceil(capacity / shards)`.
pub fn per_shard_capacity(capacity: usize, shards: usize) -> usize {
    capacity.div_ceil(shards.max(1))
}

/// Deterministic shard selector using a seeded hash.
///
/// Maps any `Hash`able key to a shard index in `[0, shards)`. The same
/// `(key, seed, shards)` tuple always produces the same result. The shard
/// count is rounded up to a power of two so the index is a mask, not a
/// division.
///
/// # Example
///
/// ```
/// use evictkit::ds::ShardSelector;
///
/// let selector = ShardSelector::new(6, 42);
/// assert_eq!(selector.shard_count(), 8);
///
/// let shard = selector.shard_for_key(&"my_key");
/// assert_eq!(selector.shard_for_key(&"my_key"), shard);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSelector {
    shards: usize,
    seed: u64,
}

impl ShardSelector {
    /// Creates a selector for `shards` shards with the given `seed`.
    ///
    /// The shard count is rounded up to a power of two, minimum 1.
    pub fn new(shards: usize, seed: u64) -> Self {
        Self {
            shards: round_shard_count(shards),
            seed,
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards
    }

    /// Maps a key to a shard index in `[0, shards)`.
    pub fn shard_for_key<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let hash = FxBuildHasher.hash_one((self.seed, key));
        // Fx mixes poorly into the low bits; fold the high half down.
        let folded = hash ^ (hash >> 32);
        (folded as usize) & (self.shards - 1)
    }
}

impl Default for ShardSelector {
    /// Creates a single-shard selector with seed 0.
    fn default() -> Self {
        Self::new(1, 0)
    }
}
