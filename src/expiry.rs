//! Bucketed key-expiry scheduler.
//!
//! [`ExpiryMap`] groups registrations into time buckets of a fixed width and
//! reports each bucket's keys once wall-clock time reaches the bucket
//! boundary. One background thread per map waits on the earliest deadline.
//!
//! ## Architecture
//!
//! ```text
//!   register(k, t) ──► bucket = round_up(t, width)
//!
//!   ┌───────────────────────── Mutex<ExpiryState<K>> ─────────────────────────┐
//!   │  buckets: FxHashMap<SystemTime, FxHashSet<K>>                           │
//!   │      12:00:30 → {1, 2}                                                  │
//!   │      12:01:00 → {4}                                                     │
//!   │  heap:    MinHeap<SystemTime>  [12:00:30, 12:01:00]  (one per bucket)   │
//!   │  pool:    Vec<FxHashSet<K>>    (recycled key sets)                      │
//!   │  next_deadline: Option<SystemTime>  (what the worker armed for)         │
//!   └─────────────────────────────────────────────────────────────────────────┘
//!
//!   worker loop
//!   ───────────
//!     arm timer for heap.peek() (or wait forever if empty)
//!     select! {
//!         quit  ─► exit
//!         wake  ─► re-arm            (earlier bucket added / bucket emptied)
//!         timer ─► pop due bucket ─► on_expiry(&keys) ─► recycle set
//!     }
//! ```
//!
//! ## Wake signals
//!
//! The wake channel holds at most one pending signal and senders never
//! block, so repeated wakes coalesce. The worker always recomputes its
//! deadline from current state, never from the signal.
//!
//! ## Example Usage
//!
//! ```
//! use std::time::{Duration, SystemTime};
//!
//! use evictkit::builder::ExpiryOptions;
//!
//! let expiry = ExpiryOptions::<u64>::new(Duration::from_secs(30))
//!     .on_expiry(|expired| {
//!         for key in expired {
//!             println!("expired {key}");
//!         }
//!     })
//!     .build()
//!     .unwrap();
//!
//! let handle = expiry.register(7, SystemTime::now() + Duration::from_secs(60));
//! assert!(expiry.unregister(handle, &7));
//! expiry.shutdown();
//! ```

use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ds::{HeapIndex, MinHeap};
use crate::error::{panic_message, CacheError};

/// Weight of history in the moving average of bucket sizes.
const AVG_SET_SIZE_SMOOTHING: usize = 16;
const INITIAL_AVG_SET_SIZE: usize = 64;
/// Upper bound on pooled key sets kept for reuse.
const MAX_POOLED_SETS: usize = 64;

/// Expiry callback. Receives each due bucket once, on the worker thread.
pub type OnExpiry<K> = Arc<dyn Fn(&ExpiredKeys<K>) + Send + Sync>;

/// Token returned by [`ExpiryMap::register`], naming the bucket a key was
/// placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    deadline: SystemTime,
}

impl Handle {
    /// The rounded bucket deadline.
    pub fn deadline(&self) -> SystemTime {
        self.deadline
    }
}

/// Keys of one due bucket, lent to the expiry callback.
#[derive(Debug)]
pub struct ExpiredKeys<K> {
    deadline: SystemTime,
    keys: FxHashSet<K>,
}

impl<K: Eq + Hash> ExpiredKeys<K> {
    pub fn deadline(&self) -> SystemTime {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.keys.iter()
    }
}

impl<'a, K> IntoIterator for &'a ExpiredKeys<K> {
    type Item = &'a K;
    type IntoIter = std::collections::hash_set::Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Rounds `t` up to the next multiple of `width` since the Unix epoch.
///
/// Times before the epoch clamp to the epoch. `width` must be non-zero.
pub(crate) fn round_up(t: SystemTime, width: Duration) -> SystemTime {
    let since = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
    let width_ns = width.as_nanos().max(1);
    let ns = since.as_nanos();
    let rem = ns % width_ns;
    let rounded = if rem == 0 { ns } else { ns - rem + width_ns };
    let secs = u64::try_from(rounded / 1_000_000_000).unwrap_or(u64::MAX);
    let nanos = (rounded % 1_000_000_000) as u32;
    UNIX_EPOCH
        .checked_add(Duration::new(secs, nanos))
        .unwrap_or(t)
}

type DeadlineHeap =
    MinHeap<SystemTime, fn(&SystemTime, &SystemTime) -> bool, HeapIndex<SystemTime>>;

fn deadline_less(a: &SystemTime, b: &SystemTime) -> bool {
    a < b
}

/// Bucket bookkeeping shared by the map and its worker.
///
/// A bucket is present in `buckets` iff it is non-empty iff its deadline is
/// in `heap` exactly once.
struct ExpiryState<K> {
    buckets: FxHashMap<SystemTime, FxHashSet<K>>,
    heap: DeadlineHeap,
    next_deadline: Option<SystemTime>,
    pool: Vec<FxHashSet<K>>,
    avg_set_size: usize,
}

impl<K: Eq + Hash> ExpiryState<K> {
    fn new() -> Self {
        Self {
            buckets: FxHashMap::default(),
            heap: MinHeap::indexed(deadline_less as fn(&SystemTime, &SystemTime) -> bool),
            next_deadline: None,
            pool: Vec::new(),
            avg_set_size: INITIAL_AVG_SET_SIZE,
        }
    }

    /// Adds `key` to the bucket at `deadline`. Returns `true` if the worker
    /// must re-arm.
    fn register(&mut self, key: K, deadline: SystemTime) -> bool {
        if let Some(set) = self.buckets.get_mut(&deadline) {
            set.insert(key);
            return false;
        }

        let mut set = self.pool.pop().unwrap_or_default();
        set.insert(key);
        self.buckets.insert(deadline, set);
        self.heap.push(deadline);
        self.next_deadline.map_or(true, |armed| deadline < armed)
    }

    /// Removes `key` from the bucket at `deadline`. Returns `(removed, wake)`.
    ///
    /// An emptied bucket leaves the heap in O(log n).
    fn unregister(&mut self, deadline: SystemTime, key: &K) -> (bool, bool) {
        let Some(set) = self.buckets.get_mut(&deadline) else {
            return (false, false);
        };
        if !set.remove(key) {
            return (false, false);
        }
        if !set.is_empty() {
            return (true, false);
        }

        if let Some(set) = self.buckets.remove(&deadline) {
            self.recycle(set);
        }
        if let Some(index) = self.heap.index_of(&deadline) {
            self.heap.remove(index);
        }
        (true, true)
    }

    /// Records and returns the earliest pending deadline.
    fn arm(&mut self) -> Option<SystemTime> {
        self.next_deadline = self.heap.peek().copied();
        self.next_deadline
    }

    /// Detaches the earliest bucket if its deadline is at or before `now`.
    fn take_due(&mut self, now: SystemTime) -> Option<ExpiredKeys<K>> {
        let deadline = *self.heap.peek()?;
        if deadline > now {
            return None;
        }
        self.heap.pop();
        let keys = self.buckets.remove(&deadline)?;
        self.avg_set_size =
            (self.avg_set_size * (AVG_SET_SIZE_SMOOTHING - 1) + keys.len()) / AVG_SET_SIZE_SMOOTHING;
        Some(ExpiredKeys { deadline, keys })
    }

    /// Returns a set to the pool unless it is oversized or the pool is full.
    fn recycle(&mut self, mut set: FxHashSet<K>) {
        if set.len() > self.avg_set_size * 2 || self.pool.len() >= MAX_POOLED_SETS {
            return;
        }
        set.clear();
        self.pool.push(set);
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }
}

struct Shared<K> {
    state: Mutex<ExpiryState<K>>,
    on_expiry: Option<OnExpiry<K>>,
}

impl<K: Eq + Hash> Shared<K> {
    fn notify(&self, expired: &ExpiredKeys<K>) {
        let Some(on_expiry) = &self.on_expiry else {
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| on_expiry(expired))) {
            tracing::error!(
                panic = panic_message(payload.as_ref()),
                keys = expired.len(),
                "expiry callback panicked"
            );
        }
    }
}

/// Time-bucketed expiry scheduler with one background worker thread.
///
/// Build one with [`ExpiryOptions`](crate::builder::ExpiryOptions).
/// Dropping the map shuts the worker down.
pub struct ExpiryMap<K> {
    shared: Arc<Shared<K>>,
    bucket_width: Duration,
    wake_tx: Sender<()>,
    quit_tx: Mutex<Option<Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl<K> ExpiryMap<K>
where
    K: Eq + Hash + Send + Sync + 'static,
{
    /// Starts the worker. `bucket_width` must already be validated non-zero.
    pub(crate) fn start(
        bucket_width: Duration,
        on_expiry: Option<OnExpiry<K>>,
    ) -> Result<Self, CacheError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(ExpiryState::new()),
            on_expiry,
        });
        let (wake_tx, wake_rx) = bounded(1);
        let (quit_tx, quit_rx) = bounded(0);

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("evictkit-expiry".to_string())
            .spawn(move || run(worker_shared, wake_rx, quit_rx))?;

        tracing::debug!(bucket_width = ?bucket_width, "expiry worker started");
        let worker_id = worker.thread().id();
        Ok(Self {
            shared,
            bucket_width,
            wake_tx,
            quit_tx: Mutex::new(Some(quit_tx)),
            worker: Mutex::new(Some(worker)),
            worker_id,
        })
    }

    /// Registers `key` to expire at `at`, rounded up to the bucket boundary.
    ///
    /// Registering the same key twice in one bucket is a no-op; a key may sit
    /// in several buckets at once, one per handle.
    pub fn register(&self, key: K, at: SystemTime) -> Handle {
        let deadline = self.bucket_for(at);
        let wake = self.shared.state.lock().register(key, deadline);
        if wake {
            self.wake();
        }
        Handle { deadline }
    }

    /// Removes `key` from the bucket named by `handle`. Returns whether the
    /// key was still pending there.
    pub fn unregister(&self, handle: Handle, key: &K) -> bool {
        let (removed, wake) = self.shared.state.lock().unregister(handle.deadline, key);
        if wake {
            self.wake();
        }
        removed
    }

    /// Bucket boundary `at` is rounded up to.
    pub fn bucket_for(&self, at: SystemTime) -> SystemTime {
        round_up(at, self.bucket_width)
    }

    pub fn bucket_width(&self) -> Duration {
        self.bucket_width
    }

    /// Number of pending buckets.
    pub fn len(&self) -> usize {
        self.shared.state.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops the worker and waits for it to exit. Idempotent.
    ///
    /// Every caller off the worker thread returns only once the worker has
    /// exited, including callers racing another `shutdown`. Pending buckets
    /// are discarded without being reported.
    pub fn shutdown(&self) {
        // Dropping the only quit sender disconnects the worker's quit arm.
        drop(self.quit_tx.lock().take());
        if thread::current().id() == self.worker_id {
            // Called from the expiry callback; the loop exits on its own.
            return;
        }
        // Held across the join so concurrent callers wait for the exit.
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return;
        };
        if handle.join().is_err() {
            tracing::error!("expiry worker exited with a panic");
        }
        tracing::debug!("expiry worker stopped");
    }

    fn wake(&self) {
        // A full channel already holds a pending wake.
        let _ = self.wake_tx.try_send(());
    }
}

impl<K> Drop for ExpiryMap<K> {
    fn drop(&mut self) {
        drop(self.quit_tx.get_mut().take());
        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.join();
        }
    }
}

impl<K> fmt::Debug for ExpiryMap<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpiryMap")
            .field("bucket_width", &self.bucket_width)
            .field("running", &self.quit_tx.lock().is_some())
            .finish_non_exhaustive()
    }
}

fn run<K: Eq + Hash>(shared: Arc<Shared<K>>, wake_rx: Receiver<()>, quit_rx: Receiver<()>) {
    loop {
        let armed = shared.state.lock().arm();
        let timer = match armed {
            Some(deadline) => {
                let delay = deadline
                    .duration_since(SystemTime::now())
                    .unwrap_or(Duration::ZERO);
                tracing::trace!(delay = ?delay, "expiry timer armed");
                after(delay)
            },
            None => never(),
        };

        select! {
            recv(quit_rx) -> _ => break,
            recv(wake_rx) -> _ => continue,
            recv(timer) -> _ => {},
        }

        let Some(expired) = shared.state.lock().take_due(SystemTime::now()) else {
            continue;
        };
        tracing::trace!(keys = expired.len(), "expiry bucket fired");
        shared.notify(&expired);
        shared.state.lock().recycle(expired.keys);
    }
}
