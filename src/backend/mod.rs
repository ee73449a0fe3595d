//! Persistence layer: optional write-behind durable store.
//!
//! A backend is advisory: any operation may refuse and the façade surfaces
//! the refusal while the in-memory state stays as updated. Because the
//! façade holds its exclusive lock across backend calls, implementations
//! must not block on durable I/O: they queue the write, mark the element
//! [`Flags::DIRTY`](crate::element::Flags::DIRTY), and report immediate
//! acceptance. `drain` is the completion side, and the only place allowed
//! to clear `DIRTY` or honour `NEED_FREE`.

pub mod memory;

pub use memory::MemoryBackend;

use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::element::Element;

/// Persistence capability set.
pub trait Backend {
    /// Called once when the owning storage is constructed.
    fn init(&mut self) {}

    /// Queues a durable write for a fresh element; may mark it dirty.
    fn insert(&mut self, key: &[u8], slot: SlotId, elt: &mut Element) -> bool;

    /// Queues a durable overwrite; may mark the element dirty.
    fn replace(&mut self, key: &[u8], slot: SlotId, elt: &mut Element) -> bool;

    /// Returns a fresh copy of a persisted element for a key the index no
    /// longer holds; the façade hoists it back into the cache.
    fn lookup(&mut self, key: &[u8]) -> Option<Element>;

    /// Queues durable removal.
    fn delete(&mut self, key: &[u8]) -> bool;

    /// Applies completed writes: clears `DIRTY` on the affected elements and
    /// frees the slots of elements flagged `NEED_FREE`. Returns the number
    /// of entries drained.
    fn drain(&mut self, arena: &mut SlotArena<Element>) -> usize;

    /// Flushes pending state and releases backend resources.
    fn destroy(&mut self);
}
