//! Binary min-heap ordered by a caller-supplied comparator.
//!
//! Unlike `std::collections::BinaryHeap`, the ordering is a closure rather
//! than an `Ord` impl, and the backing vector is exposed by index so callers
//! can mutate a tracked element in place and then restore heap order with
//! [`fix`](MinHeap::fix), or drop an arbitrary element with
//! [`remove`](MinHeap::remove).
//!
//! ## Architecture
//!
//! ```text
//!   data: [ 10 | 30 | 20 | 40 | 50 ]
//!
//!                 10            parent(i) = (i - 1) / 2
//!               /    \          left(i)   = 2i + 1
//!             30      20        right(i)  = 2i + 2
//!            /  \
//!          40    50
//! ```
//!
//! ## Operations
//!
//! | Operation  | Description                              | Complexity |
//! |------------|------------------------------------------|------------|
//! | `push`     | Insert and sift up                       | O(log n)   |
//! | `pop`      | Remove the minimum                       | O(log n)   |
//! | `peek`     | Borrow the minimum                       | O(1)       |
//! | `fix`      | Restore order after mutating index `i`   | O(log n)   |
//! | `remove`   | Remove the element at index `i`          | O(log n)   |
//! | `position` | Linear search by predicate               | O(n)       |
//! | `index_of` | Index of an element (indexed heaps only) | O(1)       |
//!
//! ## Example Usage
//!
//! ```
//! use evictkit::ds::MinHeap;
//!
//! let mut heap = MinHeap::new(|a: &u32, b: &u32| a < b);
//! heap.push(30);
//! heap.push(10);
//! heap.push(20);
//!
//! assert_eq!(heap.peek(), Some(&10));
//! assert_eq!(heap.pop(), Some(10));
//!
//! // Mutate a tracked element, then restore heap order.
//! let i = heap.position(|v| *v == 30).unwrap();
//! *heap.get_mut(i).unwrap() = 5;
//! heap.fix(i);
//! assert_eq!(heap.pop(), Some(5));
//! ```
//!
//! [`MinHeap::indexed`] builds a heap that keeps an element-to-index map
//! current through every move, for callers that remove by value.
//!
//! ## Thread Safety
//!
//! `MinHeap` is not thread-safe. The expiry engine keeps it under its state
//! lock.

use std::fmt;
use std::hash::Hash;

use rustc_hash::FxHashMap;

/// Observer told where each element sits after every heap move.
pub trait HeapPositions<T> {
    /// `item` now lives at `index`.
    fn moved(&mut self, item: &T, index: usize);
    /// `item` left the heap.
    fn removed(&mut self, item: &T);
    fn clear(&mut self);
}

/// Position observer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPositions;

impl<T> HeapPositions<T> for NoPositions {
    #[inline]
    fn moved(&mut self, _item: &T, _index: usize) {}
    #[inline]
    fn removed(&mut self, _item: &T) {}
    #[inline]
    fn clear(&mut self) {}
}

/// Element-to-index map for heaps whose elements are unique.
#[derive(Debug, Clone)]
pub struct HeapIndex<T> {
    positions: FxHashMap<T, usize>,
}

impl<T> Default for HeapIndex<T> {
    fn default() -> Self {
        Self {
            positions: FxHashMap::default(),
        }
    }
}

impl<T: Clone + Eq + Hash> HeapPositions<T> for HeapIndex<T> {
    fn moved(&mut self, item: &T, index: usize) {
        match self.positions.get_mut(item) {
            Some(slot) => *slot = index,
            None => {
                self.positions.insert(item.clone(), index);
            },
        }
    }

    fn removed(&mut self, item: &T) {
        self.positions.remove(item);
    }

    fn clear(&mut self) {
        self.positions.clear();
    }
}

/// Binary min-heap over `T`, ordered by `less`.
///
/// `less(a, b)` must be a strict weak order: it returns `true` when `a`
/// should be popped before `b`. `P` observes element moves; see
/// [`MinHeap::indexed`].
pub struct MinHeap<T, F, P = NoPositions> {
    data: Vec<T>,
    less: F,
    positions: P,
}

impl<T, F> MinHeap<T, F, NoPositions>
where
    F: Fn(&T, &T) -> bool,
{
    /// Creates an empty heap ordered by `less`.
    pub fn new(less: F) -> Self {
        Self {
            data: Vec::new(),
            less,
            positions: NoPositions,
        }
    }

    /// Creates an empty heap with room for `capacity` elements.
    pub fn with_capacity(capacity: usize, less: F) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            less,
            positions: NoPositions,
        }
    }

    /// Mutable access by index. Call [`fix`](Self::fix) afterwards if the
    /// change affects ordering.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.data.get_mut(index)
    }
}

impl<T, F> MinHeap<T, F, HeapIndex<T>>
where
    T: Clone + Eq + Hash,
    F: Fn(&T, &T) -> bool,
{
    /// Creates an empty heap that tracks where each element sits, so
    /// [`index_of`](Self::index_of) is O(1). Elements must be unique.
    ///
    /// ```
    /// use evictkit::ds::MinHeap;
    ///
    /// let mut heap = MinHeap::indexed(|a: &u32, b: &u32| a < b);
    /// heap.push(30);
    /// heap.push(10);
    /// heap.push(20);
    ///
    /// let i = heap.index_of(&20).unwrap();
    /// assert_eq!(heap.remove(i), Some(20));
    /// assert_eq!(heap.index_of(&20), None);
    /// assert_eq!(heap.index_of(&10), Some(0));
    /// ```
    pub fn indexed(less: F) -> Self {
        Self {
            data: Vec::new(),
            less,
            positions: HeapIndex::default(),
        }
    }

    /// Current index of `item`.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.positions.positions.get(item).copied()
    }
}

impl<T, F, P> MinHeap<T, F, P>
where
    F: Fn(&T, &T) -> bool,
    P: HeapPositions<T>,
{
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Inserts `item`.
    pub fn push(&mut self, item: T) {
        let last = self.data.len();
        self.positions.moved(&item, last);
        self.data.push(item);
        self.sift_up(last);
    }

    /// Removes and returns the minimum, or `None` if the heap is empty.
    pub fn pop(&mut self) -> Option<T> {
        self.remove(0)
    }

    /// Borrows the minimum without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.data.first()
    }

    /// Restores heap order after the element at `index` was changed.
    /// Out-of-range indices are ignored.
    pub fn fix(&mut self, index: usize) {
        if index >= self.data.len() {
            return;
        }
        if !self.sift_down(index) {
            self.sift_up(index);
        }
    }

    /// Removes and returns the element at `index`.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.data.len() {
            return None;
        }
        let item = self.data.swap_remove(index);
        self.positions.removed(&item);
        if index < self.data.len() {
            self.positions.moved(&self.data[index], index);
            self.fix(index);
        }
        Some(item)
    }

    /// Returns the index of the first element matching `pred`.
    ///
    /// The index is only valid until the next mutation.
    pub fn position<Q>(&self, pred: Q) -> Option<usize>
    where
        Q: FnMut(&T) -> bool,
    {
        self.data.iter().position(pred)
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.positions.clear();
    }

    /// Returns the backing storage in heap order (not sorted).
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.data.swap(a, b);
        self.positions.moved(&self.data[a], a);
        self.positions.moved(&self.data[b], b);
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !(self.less)(&self.data[index], &self.data[parent]) {
                break;
            }
            self.swap(index, parent);
            index = parent;
        }
    }

    /// Returns `true` if the element moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.data.len();
        let mut index = start;
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && (self.less)(&self.data[right], &self.data[left]) {
                smallest = right;
            }
            if !(self.less)(&self.data[smallest], &self.data[index]) {
                break;
            }
            self.swap(index, smallest);
            index = smallest;
        }
        index > start
    }

    #[cfg(any(test, debug_assertions))]
    pub(crate) fn is_valid_heap(&self) -> bool {
        (1..self.data.len()).all(|i| !(self.less)(&self.data[i], &self.data[(i - 1) / 2]))
    }
}

impl<T: fmt::Debug, F, P> fmt::Debug for MinHeap<T, F, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MinHeap").field("data", &self.data).finish()
    }
}
