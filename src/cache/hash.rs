//! General-purpose hash index over case-insensitive keys.
//!
//! The map is keyed by the case-folded key bytes, so `"Key"` and `"key"`
//! name the same element while the element keeps the spelling it was
//! inserted with. A duplicate insert steals the previous entry and releases
//! it per the dirty rule before installing the fresh element.

use rustc_hash::FxHashMap;

use crate::cache::{fold_key, release_stolen, Cache};
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::element::Element;

/// Hash index mapping case-folded keys to element slots.
#[derive(Debug, Default)]
pub struct HashCache {
    map: FxHashMap<Box<[u8]>, SlotId>,
}

impl HashCache {
    /// Creates an empty hash cache.
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }
}

impl Cache for HashCache {
    fn insert(
        &mut self,
        arena: &mut SlotArena<Element>,
        key: &[u8],
        value: &[u8],
        now: u64,
    ) -> Option<SlotId> {
        let elt = Element::new(key, value, now)?;
        let folded = fold_key(key);
        if let Some(old) = self.map.remove(folded.as_slice()) {
            release_stolen(arena, old);
        }
        let slot = arena.insert(elt);
        self.map.insert(folded.into_boxed_slice(), slot);
        Some(slot)
    }

    fn lookup(&self, key: &[u8]) -> Option<SlotId> {
        self.map.get(fold_key(key).as_slice()).copied()
    }

    fn replace(&mut self, arena: &mut SlotArena<Element>, key: &[u8], slot: SlotId) -> bool {
        let folded = fold_key(key);
        let Some(entry) = self.map.get_mut(folded.as_slice()) else {
            return false;
        };
        let old = std::mem::replace(entry, slot);
        release_stolen(arena, old);
        true
    }

    fn delete(&mut self, key: &[u8]) -> Option<SlotId> {
        self.map.remove(fold_key(key).as_slice())
    }

    fn steal(&mut self, elt: &Element) {
        self.map.remove(fold_key(elt.key()).as_slice());
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn slots(&self) -> Vec<SlotId> {
        self.map.values().copied().collect()
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}
