//! Digital trie index over case-insensitive keys.
//!
//! Same contract as the hash cache, but the index walks the case-folded key
//! byte by byte through a trie whose children are ordered, so the reachable
//! slots come back sorted by key. Worth the pointer chasing when callers
//! iterate the key space in order; otherwise the hash cache is the better
//! default.

use std::collections::BTreeMap;

use crate::cache::{fold_key, release_stolen, Cache};
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::element::Element;

#[derive(Debug, Default)]
struct TrieNode {
    slot: Option<SlotId>,
    children: BTreeMap<u8, TrieNode>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.slot.is_none() && self.children.is_empty()
    }
}

/// Byte-trie index mapping case-folded keys to element slots.
#[derive(Debug, Default)]
pub struct TrieCache {
    root: TrieNode,
    len: usize,
}

impl TrieCache {
    /// Creates an empty trie cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, folded: &[u8]) -> Option<SlotId> {
        let mut node = &self.root;
        for &b in folded {
            node = node.children.get(&b)?;
        }
        node.slot
    }

    fn insert_folded(&mut self, folded: &[u8], slot: SlotId) -> Option<SlotId> {
        let mut node = &mut self.root;
        for &b in folded {
            node = node.children.entry(b).or_default();
        }
        let old = node.slot.replace(slot);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    /// Removes `folded` and prunes branches left empty behind it.
    fn remove_folded(node: &mut TrieNode, folded: &[u8]) -> Option<SlotId> {
        match folded.split_first() {
            None => node.slot.take(),
            Some((&b, rest)) => {
                let child = node.children.get_mut(&b)?;
                let removed = Self::remove_folded(child, rest);
                if removed.is_some() && child.is_empty() {
                    node.children.remove(&b);
                }
                removed
            }
        }
    }

    fn collect(node: &TrieNode, out: &mut Vec<SlotId>) {
        if let Some(slot) = node.slot {
            out.push(slot);
        }
        for child in node.children.values() {
            Self::collect(child, out);
        }
    }
}

impl Cache for TrieCache {
    fn insert(
        &mut self,
        arena: &mut SlotArena<Element>,
        key: &[u8],
        value: &[u8],
        now: u64,
    ) -> Option<SlotId> {
        let folded = fold_key(key);
        let elt = Element::new(key, value, now)?;
        let slot = arena.insert(elt);
        if let Some(old) = self.insert_folded(&folded, slot) {
            release_stolen(arena, old);
        }
        Some(slot)
    }

    fn lookup(&self, key: &[u8]) -> Option<SlotId> {
        self.find(&fold_key(key))
    }

    fn replace(&mut self, arena: &mut SlotArena<Element>, key: &[u8], slot: SlotId) -> bool {
        let folded = fold_key(key);
        if self.find(&folded).is_none() {
            return false;
        }
        if let Some(old) = self.insert_folded(&folded, slot) {
            release_stolen(arena, old);
        }
        true
    }

    fn delete(&mut self, key: &[u8]) -> Option<SlotId> {
        let removed = Self::remove_folded(&mut self.root, &fold_key(key));
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn steal(&mut self, elt: &Element) {
        if Self::remove_folded(&mut self.root, &fold_key(elt.key())).is_some() {
            self.len -= 1;
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    /// Reachable slots in sorted (case-folded) key order.
    fn slots(&self) -> Vec<SlotId> {
        let mut out = Vec::with_capacity(self.len);
        Self::collect(&self.root, &mut out);
        out
    }

    fn clear(&mut self) {
        self.root = TrieNode::default();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Flags;

    #[test]
    fn keys_share_prefixes_and_ignore_case() {
        let mut arena = SlotArena::new();
        let mut cache = TrieCache::new();

        let ab = cache.insert(&mut arena, b"ab", b"1", 0).unwrap();
        let abc = cache.insert(&mut arena, b"abc", b"2", 0).unwrap();

        assert_eq!(cache.lookup(b"AB"), Some(ab));
        assert_eq!(cache.lookup(b"aBc"), Some(abc));
        assert_eq!(cache.lookup(b"a"), None);
        assert_eq!(cache.lookup(b"abcd"), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn slots_come_back_in_key_order() {
        let mut arena = SlotArena::new();
        let mut cache = TrieCache::new();

        let bee = cache.insert(&mut arena, b"bee", b"2", 0).unwrap();
        let ant = cache.insert(&mut arena, b"ant", b"1", 0).unwrap();
        let cow = cache.insert(&mut arena, b"Cow", b"3", 0).unwrap();

        assert_eq!(cache.slots(), vec![ant, bee, cow]);
    }

    #[test]
    fn delete_prunes_dead_branches() {
        let mut arena = SlotArena::new();
        let mut cache = TrieCache::new();

        let ab = cache.insert(&mut arena, b"ab", b"1", 0).unwrap();
        let abcd = cache.insert(&mut arena, b"abcd", b"2", 0).unwrap();

        assert_eq!(cache.delete(b"abcd"), Some(abcd));
        assert_eq!(cache.lookup(b"abcd"), None);
        assert_eq!(cache.lookup(b"ab"), Some(ab));
        assert_eq!(cache.len(), 1);
        assert!(arena.contains(abcd));

        assert_eq!(cache.delete(b"ab"), Some(ab));
        assert!(cache.root.is_empty());
    }

    #[test]
    fn duplicate_insert_honours_dirty_rule() {
        let mut arena = SlotArena::new();
        let mut cache = TrieCache::new();

        let first = cache.insert(&mut arena, b"k", b"one", 0).unwrap();
        arena
            .get_mut(first)
            .unwrap()
            .flags_mut()
            .insert(Flags::DIRTY);
        let second = cache.insert(&mut arena, b"k", b"two", 0).unwrap();

        assert_eq!(cache.lookup(b"k"), Some(second));
        assert!(arena.get(first).unwrap().flags().contains(Flags::NEED_FREE));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn steal_removes_by_element_key() {
        let mut arena = SlotArena::new();
        let mut cache = TrieCache::new();

        let slot = cache.insert(&mut arena, b"Walk", b"v", 0).unwrap();
        let elt = arena.get(slot).unwrap().clone();
        cache.steal(&elt);
        assert_eq!(cache.lookup(b"walk"), None);
        assert!(arena.contains(slot));
        assert!(cache.is_empty());
    }
}
