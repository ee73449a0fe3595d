//! Eviction layer: decides which element leaves under pressure.
//!
//! An expire policy tracks every element's position in its own order and is
//! consulted by the storage façade whenever an insertion would exceed a
//! cap. One `step` evicts at most one batch of victims; the façade loops,
//! re-checking the caps, and gives up after a bounded number of steps. The
//! policy adjusts accounting itself as elements leave, so a step is
//! externally visible through the counters even before the façade
//! re-checks.

pub mod lru;

pub use lru::LruExpire;

use crate::cache::Cache;
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::element::Element;
use crate::storage::Accounting;

/// Eviction capability set.
pub trait Expire {
    /// Called once when the owning storage is constructed.
    fn init(&mut self) {}

    /// Registers a freshly inserted element.
    fn insert(&mut self, arena: &mut SlotArena<Element>, slot: SlotId);

    /// Forgets an element that is leaving the storage.
    fn delete(&mut self, arena: &mut SlotArena<Element>, slot: SlotId);

    /// Runs one eviction step at time `now`. Non-forced steps skip
    /// persistent and dirty candidates; forced steps may take them (a dirty
    /// victim keeps its slot under `NEED_FREE`). Returns `true` when at
    /// least one element was evicted.
    fn step(
        &mut self,
        cache: &mut dyn Cache,
        arena: &mut SlotArena<Element>,
        tally: &mut Accounting,
        now: u64,
        forced: bool,
    ) -> bool;

    /// Drops all eviction state.
    fn clear(&mut self);
}
