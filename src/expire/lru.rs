//! LRU eviction: a queue in insertion order, evicted from the head.
//!
//! The queue is an intrusive list of slots; each element carries the handle
//! of its own queue node, so `delete` unlinks in O(1) from anywhere. A step
//! first drains the contiguous run of already-expired elements at the head;
//! if the head is still live it becomes the oldest candidate and is evicted
//! to relieve pressure. Persistent and dirty elements are skipped unless
//! the step is forced, and a dirty victim keeps its slot under `NEED_FREE`
//! for the backend to release.

use crate::cache::{release_stolen, Cache};
use crate::ds::intrusive_list::IntrusiveList;
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::element::{Element, Flags};
use crate::expire::Expire;
use crate::storage::Accounting;

/// LRU expire policy.
#[derive(Debug, Default)]
pub struct LruExpire {
    queue: IntrusiveList<SlotId>,
}

impl LruExpire {
    /// Creates an empty LRU queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn stale(elt: &Element, now: u64) -> bool {
        now.saturating_sub(elt.age()) > u64::from(elt.expire())
    }

    /// Steals `slot` from the index, settles accounting, unlinks its queue
    /// node, and releases the slot per the dirty rule.
    fn evict(
        &mut self,
        cache: &mut dyn Cache,
        arena: &mut SlotArena<Element>,
        tally: &mut Accounting,
        slot: SlotId,
    ) {
        let (footprint, link) = {
            let Some(elt) = arena.get(slot) else {
                return;
            };
            cache.steal(elt);
            (elt.footprint(), elt.queue_link)
        };
        match link {
            Some(node) => {
                self.queue.remove(node);
            }
            None => {
                // Stale link; make sure the head cannot wedge on this slot.
                if self.queue.front() == Some(&slot) {
                    self.queue.pop_front();
                }
            }
        }
        if let Some(elt) = arena.get_mut(slot) {
            elt.queue_link = None;
        }
        tally.elts = tally.elts.saturating_sub(1);
        tally.memory = tally.memory.saturating_sub(footprint);
        tally.evictions += 1;
        release_stolen(arena, slot);
    }
}

impl Expire for LruExpire {
    fn insert(&mut self, arena: &mut SlotArena<Element>, slot: SlotId) {
        let node = self.queue.push_back(slot);
        if let Some(elt) = arena.get_mut(slot) {
            elt.queue_link = Some(node);
        }
    }

    fn delete(&mut self, arena: &mut SlotArena<Element>, slot: SlotId) {
        if let Some(elt) = arena.get_mut(slot) {
            if let Some(node) = elt.queue_link.take() {
                self.queue.remove(node);
            }
        }
    }

    fn step(
        &mut self,
        cache: &mut dyn Cache,
        arena: &mut SlotArena<Element>,
        tally: &mut Accounting,
        now: u64,
        forced: bool,
    ) -> bool {
        // The head must name a live element.
        let slot = loop {
            let Some(&slot) = self.queue.front() else {
                return false;
            };
            if arena.contains(slot) {
                break slot;
            }
            self.queue.pop_front();
        };

        let (flags, stale) = {
            let Some(elt) = arena.get(slot) else {
                return false;
            };
            (elt.flags(), Self::stale(elt, now))
        };

        if !forced && flags.intersects(Flags::PERSISTENT | Flags::DIRTY) {
            return false;
        }

        self.evict(cache, arena, tally, slot);
        if stale {
            // Drain the contiguous run of also-expired clean elements.
            while let Some(&next) = self.queue.front() {
                let Some(elt) = arena.get(next) else {
                    self.queue.pop_front();
                    continue;
                };
                if elt.flags().intersects(Flags::PERSISTENT | Flags::DIRTY)
                    || !Self::stale(elt, now)
                {
                    break;
                }
                self.evict(cache, arena, tally, next);
            }
        }
        true
    }

    fn clear(&mut self) {
        self.queue.clear();
    }
}
