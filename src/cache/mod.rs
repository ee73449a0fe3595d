//! Index layer: maps keys to element slots.
//!
//! A cache owns no elements; it holds [`SlotId`] handles into the storage
//! arena and leaves every lifetime decision to the façade and the expire
//! policy. The one lifetime-adjacent primitive a cache does provide is
//! `steal`: unlink an element from the index *without* releasing its slot,
//! which is what lets dirty elements outlive their logical removal.
//!
//! ## Variants
//!
//! | Variant | Key space | Backing structure |
//! |---|---|---|
//! | [`HashCache`] | case-insensitive byte strings | `FxHashMap` |
//! | [`RadixCache`] | IPv4 dotted quads | 32-level binary radix tree |
//! | [`TrieCache`] | case-insensitive byte strings, sorted | digital trie |

pub mod hash;
pub mod radix;
pub mod trie;

pub use hash::HashCache;
pub use radix::RadixCache;
pub use trie::TrieCache;

use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::element::{Element, Flags};

/// Index capability set.
///
/// `insert` is the only allocating operation: it builds the element in the
/// arena, stamps its age and hash, and indexes it. A displaced previous
/// entry is stolen and released per the dirty rule; callers must have
/// already detached it from the eviction queue.
pub trait Cache {
    /// Called once when the owning storage is constructed.
    fn init(&mut self) {}

    /// Allocates a fresh element for `key`/`value` in the arena and indexes
    /// it. Returns the new slot, or `None` when the variant rejects the key.
    fn insert(
        &mut self,
        arena: &mut SlotArena<Element>,
        key: &[u8],
        value: &[u8],
        now: u64,
    ) -> Option<SlotId>;

    /// Returns the slot indexed under `key`, if any.
    fn lookup(&self, key: &[u8]) -> Option<SlotId>;

    /// Swaps the entry for `key` to `slot`, releasing the old element per
    /// the dirty rule. Fails when `key` is absent.
    fn replace(&mut self, arena: &mut SlotArena<Element>, key: &[u8], slot: SlotId) -> bool;

    /// Unlinks and returns the slot for `key` without releasing it.
    fn delete(&mut self, key: &[u8]) -> Option<SlotId>;

    /// Unlinks the element's index entry without releasing its slot.
    fn steal(&mut self, elt: &Element);

    /// Number of reachable entries.
    fn len(&self) -> usize;

    /// Returns `true` if the index holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The reachable slots, used by accounting checks and teardown.
    fn slots(&self) -> Vec<SlotId>;

    /// Drops all index entries (slot release is the caller's business).
    fn clear(&mut self);
}

/// Case-folds a key for the byte-string indexes.
pub(crate) fn fold_key(key: &[u8]) -> Vec<u8> {
    key.to_ascii_lowercase()
}

/// Releases a stolen slot honouring the dirty rule: a dirty element is
/// flagged for deferred free and keeps its slot for the backend; a clean
/// element leaves the arena immediately.
pub(crate) fn release_stolen(arena: &mut SlotArena<Element>, slot: SlotId) {
    let dirty = match arena.get(slot) {
        Some(elt) => elt.flags().contains(Flags::DIRTY),
        None => return,
    };
    if dirty {
        if let Some(elt) = arena.get_mut(slot) {
            elt.flags_mut().insert(Flags::NEED_FREE);
        }
    } else {
        arena.remove(slot);
    }
}
