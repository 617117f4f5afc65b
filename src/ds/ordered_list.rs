//! Recency-ordered doubly linked list backed by `SlotArena`.
//!
//! Nodes live in a [`SlotArena`] and link to each other by slot index. A
//! sentinel root closes the chain into a ring, so insertion and unlinking
//! never special-case the head or the tail. The arena's free list doubles
//! as the node pool: removed nodes give their slot back for the next push.
//!
//! ## Architecture
//!
//! ```text
//!   arena (SlotArena<Node<T>>)
//!   ┌───────┬──────────────────────────────────────────┐
//!   │ index │ Node { value, prev, next }               │
//!   ├───────┼──────────────────────────────────────────┤
//!   │   0   │ { value: A, prev: ROOT, next: 2 }        │
//!   │   1   │ (free)                                   │
//!   │   2   │ { value: C, prev: 0,    next: ROOT }     │
//!   └───────┴──────────────────────────────────────────┘
//!
//!        ┌──────────────────────────────────────┐
//!        ▼                                      │
//!   ROOT ──► [0: A] ◄──► [2: C] ──► ROOT ───────┘
//!   front (MRU)                back (LRU)
//! ```
//!
//! ## Handles
//!
//! [`ListHandle`] pairs the owning list's id with a generation-checked
//! [`SlotId`]. Handles from another list are rejected with
//! [`NodeError::ForeignNode`]; handles whose node was removed resolve to
//! nothing or [`NodeError::StaleNode`]. [`clear`](OrderedList::clear)
//! re-keys the list, so every handle issued before it becomes foreign.
//!
//! ## Performance
//! - `push_front` / `push_back` / `pop_front` / `pop_back`: O(1)
//! - `move_to_front` / `remove`: O(1)
//! - `iter`: O(n)
//!
//! ## Example Usage
//!
//! ```
//! use evictkit::ds::OrderedList;
//!
//! let mut list = OrderedList::new();
//! let a = list.push_front("a");
//! let b = list.push_front("b");
//!
//! assert_eq!(list.iter().copied().collect::<Vec<_>>(), vec!["b", "a"]);
//!
//! list.move_to_front(a).unwrap();
//! assert_eq!(list.front().and_then(|h| list.get(h)), Some(&"a"));
//!
//! assert_eq!(list.remove(b), Some("b"));
//! assert_eq!(list.len(), 1);
//! ```
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::error::{InvariantError, NodeError};

/// Index of the sentinel root in link fields.
const ROOT: usize = usize::MAX;

static NEXT_LIST_ID: AtomicU64 = AtomicU64::new(1);

fn next_list_id() -> u64 {
    NEXT_LIST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Opaque handle to a node of an [`OrderedList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListHandle {
    list: u64,
    slot: SlotId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Links {
    prev: usize,
    next: usize,
}

impl Links {
    const DETACHED: Links = Links {
        prev: ROOT,
        next: ROOT,
    };
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    links: Links,
}

/// Doubly linked list with a sentinel root, stored in a `SlotArena`.
#[derive(Debug)]
pub struct OrderedList<T> {
    id: u64,
    arena: SlotArena<Node<T>>,
    root: Links,
}

impl<T> OrderedList<T> {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            id: next_list_id(),
            arena: SlotArena::new(),
            root: Links::DETACHED,
        }
    }

    /// Creates an empty list with `capacity` pooled node slots reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: next_list_id(),
            arena: SlotArena::with_capacity(capacity),
            root: Links::DETACHED,
        }
    }

    /// Returns the number of nodes in the list.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// Returns `true` if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Returns `true` if `handle` names a live node of this list.
    pub fn contains(&self, handle: ListHandle) -> bool {
        self.check(handle).is_ok()
    }

    /// Returns the handle of the front (most recently used) node.
    pub fn front(&self) -> Option<ListHandle> {
        self.handle_at(self.root.next)
    }

    /// Returns the handle of the back (least recently used) node.
    pub fn back(&self) -> Option<ListHandle> {
        self.handle_at(self.root.prev)
    }

    /// Returns the value for `handle`, if it names a live node of this list.
    pub fn get(&self, handle: ListHandle) -> Option<&T> {
        if handle.list != self.id {
            return None;
        }
        self.arena.get(handle.slot).map(|node| &node.value)
    }

    /// Returns a mutable reference to the value for `handle`.
    pub fn get_mut(&mut self, handle: ListHandle) -> Option<&mut T> {
        if handle.list != self.id {
            return None;
        }
        self.arena.get_mut(handle.slot).map(|node| &mut node.value)
    }

    /// Inserts a new node at the front and returns its handle.
    pub fn push_front(&mut self, value: T) -> ListHandle {
        let slot = self.arena.insert(Node {
            value,
            links: Links::DETACHED,
        });
        self.link_after(slot.index(), ROOT);
        ListHandle {
            list: self.id,
            slot,
        }
    }

    /// Inserts a new node at the back and returns its handle.
    pub fn push_back(&mut self, value: T) -> ListHandle {
        let slot = self.arena.insert(Node {
            value,
            links: Links::DETACHED,
        });
        self.link_after(slot.index(), self.root.prev);
        ListHandle {
            list: self.id,
            slot,
        }
    }

    /// Moves the node to the front.
    ///
    /// Fails without touching either list if `handle` belongs to another
    /// list or names a removed node.
    pub fn move_to_front(&mut self, handle: ListHandle) -> Result<(), NodeError> {
        self.check(handle)?;
        let index = handle.slot.index();
        if self.root.next != index {
            self.unlink(index);
            self.link_after(index, ROOT);
        }
        Ok(())
    }

    /// Removes the node and returns its value.
    ///
    /// Foreign or stale handles are ignored and yield `None`.
    pub fn remove(&mut self, handle: ListHandle) -> Option<T> {
        self.check(handle).ok()?;
        self.unlink(handle.slot.index());
        self.arena.remove(handle.slot).map(|node| node.value)
    }

    /// Removes and returns the front value.
    pub fn pop_front(&mut self) -> Option<T> {
        let handle = self.front()?;
        self.remove(handle)
    }

    /// Removes and returns the back value.
    pub fn pop_back(&mut self) -> Option<T> {
        let handle = self.back()?;
        self.remove(handle)
    }

    /// Drops every node and re-keys the list.
    ///
    /// Handles issued before the clear are reported as foreign afterwards.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = Links::DETACHED;
        self.id = next_list_id();
    }

    /// Returns an iterator over values from front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            current: self.root.next,
            remaining: self.len(),
        }
    }

    /// Returns an iterator over `(handle, &value)` pairs from front to back.
    pub fn iter_entries(&self) -> EntryIter<'_, T> {
        EntryIter {
            list: self,
            current: self.root.next,
            remaining: self.len(),
        }
    }

    /// Verifies the ring: walking `next` from the root returns to the root
    /// after exactly `len()` steps, and so does walking `prev`.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let expected = self.len();

        let mut steps = 0usize;
        let mut prev = ROOT;
        let mut current = self.root.next;
        while current != ROOT {
            let links = self
                .links(current)
                .ok_or_else(|| InvariantError::new(format!("dangling next link {current}")))?;
            if links.prev != prev {
                return Err(InvariantError::new(format!(
                    "node {current} has prev {} but was reached from {prev}",
                    links.prev
                )));
            }
            steps += 1;
            if steps > expected {
                return Err(InvariantError::new("forward walk exceeds list length"));
            }
            prev = current;
            current = links.next;
        }
        if self.root.prev != prev {
            return Err(InvariantError::new("root prev does not name the last node"));
        }
        if steps != expected {
            return Err(InvariantError::new(format!(
                "forward walk visited {steps} nodes, expected {expected}"
            )));
        }

        let mut steps = 0usize;
        let mut current = self.root.prev;
        while current != ROOT {
            let links = self
                .links(current)
                .ok_or_else(|| InvariantError::new(format!("dangling prev link {current}")))?;
            steps += 1;
            if steps > expected {
                return Err(InvariantError::new("backward walk exceeds list length"));
            }
            current = links.prev;
        }
        if steps != expected {
            return Err(InvariantError::new(format!(
                "backward walk visited {steps} nodes, expected {expected}"
            )));
        }
        Ok(())
    }

    fn check(&self, handle: ListHandle) -> Result<(), NodeError> {
        if handle.list != self.id {
            return Err(NodeError::ForeignNode);
        }
        if !self.arena.contains(handle.slot) {
            return Err(NodeError::StaleNode);
        }
        Ok(())
    }

    fn handle_at(&self, index: usize) -> Option<ListHandle> {
        if index == ROOT {
            return None;
        }
        self.arena.id_at(index).map(|slot| ListHandle {
            list: self.id,
            slot,
        })
    }

    fn links(&self, index: usize) -> Option<Links> {
        if index == ROOT {
            Some(self.root)
        } else {
            self.arena.get_at(index).map(|node| node.links)
        }
    }

    fn links_mut(&mut self, index: usize) -> Option<&mut Links> {
        if index == ROOT {
            Some(&mut self.root)
        } else {
            self.arena.get_at_mut(index).map(|node| &mut node.links)
        }
    }

    fn unlink(&mut self, index: usize) {
        let Some(Links { prev, next }) = self.links(index) else {
            return;
        };
        if let Some(links) = self.links_mut(prev) {
            links.next = next;
        }
        if let Some(links) = self.links_mut(next) {
            links.prev = prev;
        }
        if let Some(links) = self.links_mut(index) {
            *links = Links::DETACHED;
        }
    }

    fn link_after(&mut self, index: usize, at: usize) {
        let Some(next) = self.links(at).map(|links| links.next) else {
            return;
        };
        if let Some(links) = self.links_mut(index) {
            links.prev = at;
            links.next = next;
        }
        if let Some(links) = self.links_mut(at) {
            links.next = index;
        }
        if let Some(links) = self.links_mut(next) {
            links.prev = index;
        }
    }
}

impl<T> Default for OrderedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over values from front to back.
pub struct Iter<'a, T> {
    list: &'a OrderedList<T>,
    current: usize,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == ROOT || self.remaining == 0 {
            return None;
        }
        let node = self.list.arena.get_at(self.current)?;
        self.current = node.links.next;
        self.remaining -= 1;
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Iterator over `(ListHandle, &T)` pairs from front to back.
pub struct EntryIter<'a, T> {
    list: &'a OrderedList<T>,
    current: usize,
    remaining: usize,
}

impl<'a, T> Iterator for EntryIter<'a, T> {
    type Item = (ListHandle, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == ROOT || self.remaining == 0 {
            return None;
        }
        let handle = self.list.handle_at(self.current)?;
        let node = self.list.arena.get_at(self.current)?;
        self.current = node.links.next;
        self.remaining -= 1;
        Some((handle, &node.value))
    }
}
