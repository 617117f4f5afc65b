//! Error types for the evictkit library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned when construction options are invalid
//!   (zero capacity, missing shard function, zero bucket width).
//! - [`CacheError`]: Returned by every fallible cache operation. Wraps
//!   [`ConfigError`] at construction time and reports use after shutdown.
//! - [`NodeError`]: Returned when an [`OrderedList`](crate::ds::OrderedList)
//!   handle is used on the wrong list or after its node was removed.
//! - [`InvariantError`]: Returned by `check_invariants` methods when an
//!   internal data-structure invariant is violated.
//!
//! ## Example Usage
//!
//! ```
//! use evictkit::builder::LruOptions;
//! use evictkit::error::CacheError;
//! use evictkit::traits::Cache;
//!
//! let bad = LruOptions::<u64, String>::new(0).build();
//! assert!(matches!(bad, Err(CacheError::InvalidOptions(_))));
//!
//! let cache = LruOptions::<u64, String>::new(2).build().unwrap();
//! cache.shutdown();
//! assert!(matches!(cache.get(&1), Err(CacheError::Shutdown)));
//! ```

use thiserror::Error;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when construction options are invalid.
///
/// Produced by the `build()` methods in [`builder`](crate::builder). Carries
/// a human-readable description of which option failed validation.
///
/// # Example
///
/// ```
/// use evictkit::builder::LruOptions;
/// use evictkit::error::CacheError;
///
/// match LruOptions::<u64, u64>::new(0).build() {
///     Err(CacheError::InvalidOptions(err)) => {
///         assert_eq!(err.message(), "capacity must be positive");
///     },
///     _ => unreachable!(),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Error returned by cache construction and cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Construction options were rejected. No object was produced.
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] ConfigError),

    /// The cache has been shut down; construct a new instance to continue.
    #[error("the cache has been shut down")]
    Shutdown,

    /// The expiry worker thread could not be started.
    #[error("failed to spawn expiry worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl CacheError {
    /// Shorthand for an [`InvalidOptions`](Self::InvalidOptions) error.
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(ConfigError::new(msg))
    }

    /// Returns `true` if this error reports use after shutdown.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}

// ---------------------------------------------------------------------------
// NodeError
// ---------------------------------------------------------------------------

/// Error returned when an ordered-list handle cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NodeError {
    /// The handle was issued by a different list (or by this list before it
    /// was cleared).
    #[error("node belongs to a different list")]
    ForeignNode,

    /// The node was already removed from this list.
    #[error("node has been removed")]
    StaleNode,
}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when internal invariants are violated.
///
/// Produced by `check_invariants` methods (for example
/// [`OrderedList::check_invariants`](crate::ds::OrderedList::check_invariants)).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvariantError(String);

impl InvariantError {
    /// Creates a new `InvariantError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Renders a `catch_unwind` payload for logging.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
