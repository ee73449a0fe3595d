//! Internal data structures shared by the index and eviction layers.

pub mod intrusive_list;
pub mod slot_arena;
