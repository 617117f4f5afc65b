pub mod min_heap;
pub mod ordered_list;
pub mod shard;
pub mod slot_arena;

pub use min_heap::{HeapIndex, HeapPositions, MinHeap, NoPositions};
pub use ordered_list::{ListHandle, OrderedList};
pub use shard::{derive_shard_count, per_shard_capacity, round_shard_count, ShardSelector, MAX_SHARDS};
pub use slot_arena::{SlotArena, SlotId};
