//! IPv4 index backed by a binary radix tree.
//!
//! Keys are dotted-quad strings; the effective key is the parsed 32-bit
//! address, walked most-significant-bit first through a binary tree with a
//! full /32 mask, so only exact addresses carry values. Keys that do not
//! parse, or parse to 0.0.0.0 (the sentinel for "no address"), are
//! rejected on insert and miss on lookup.

use std::net::Ipv4Addr;

use crate::cache::{release_stolen, Cache};
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::element::Element;

#[derive(Debug, Default)]
struct RadixNode {
    zero: Option<Box<RadixNode>>,
    one: Option<Box<RadixNode>>,
    slot: Option<SlotId>,
}

/// Radix index mapping IPv4 addresses to element slots.
#[derive(Debug, Default)]
pub struct RadixCache {
    root: RadixNode,
    len: usize,
}

/// Parses a dotted-quad key to its 32-bit address; 0 is reserved as the
/// invalid sentinel.
fn parse_key(key: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(key).ok()?;
    let addr: Ipv4Addr = text.parse().ok()?;
    let bits = u32::from(addr);
    if bits == 0 {
        return None;
    }
    Some(bits)
}

impl RadixCache {
    /// Creates an empty radix cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, bits: u32) -> Option<SlotId> {
        let mut node = &self.root;
        for i in (0..32).rev() {
            let next = if (bits >> i) & 1 == 0 {
                node.zero.as_deref()
            } else {
                node.one.as_deref()
            };
            node = next?;
        }
        node.slot
    }

    fn insert_bits(&mut self, bits: u32, slot: SlotId) -> Option<SlotId> {
        let mut node = &mut self.root;
        for i in (0..32).rev() {
            let branch = if (bits >> i) & 1 == 0 {
                &mut node.zero
            } else {
                &mut node.one
            };
            node = branch.get_or_insert_with(Box::default);
        }
        let old = node.slot.replace(slot);
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    fn remove_bits(&mut self, bits: u32) -> Option<SlotId> {
        let mut node = &mut self.root;
        for i in (0..32).rev() {
            let next = if (bits >> i) & 1 == 0 {
                node.zero.as_deref_mut()
            } else {
                node.one.as_deref_mut()
            };
            node = next?;
        }
        let slot = node.slot.take();
        if slot.is_some() {
            self.len -= 1;
        }
        slot
    }

    fn collect(node: &RadixNode, out: &mut Vec<SlotId>) {
        if let Some(slot) = node.slot {
            out.push(slot);
        }
        if let Some(zero) = &node.zero {
            Self::collect(zero, out);
        }
        if let Some(one) = &node.one {
            Self::collect(one, out);
        }
    }
}

impl Cache for RadixCache {
    fn insert(
        &mut self,
        arena: &mut SlotArena<Element>,
        key: &[u8],
        value: &[u8],
        now: u64,
    ) -> Option<SlotId> {
        let bits = parse_key(key)?;
        let mut elt = Element::new(key, value, now)?;
        elt.set_hash(bits);
        let slot = arena.insert(elt);
        if let Some(old) = self.insert_bits(bits, slot) {
            release_stolen(arena, old);
        }
        Some(slot)
    }

    fn lookup(&self, key: &[u8]) -> Option<SlotId> {
        self.find(parse_key(key)?)
    }

    fn replace(&mut self, arena: &mut SlotArena<Element>, key: &[u8], slot: SlotId) -> bool {
        let Some(bits) = parse_key(key) else {
            return false;
        };
        if self.find(bits).is_none() {
            return false;
        }
        if let Some(old) = self.insert_bits(bits, slot) {
            release_stolen(arena, old);
        }
        true
    }

    fn delete(&mut self, key: &[u8]) -> Option<SlotId> {
        self.remove_bits(parse_key(key)?)
    }

    fn steal(&mut self, elt: &Element) {
        // The element's hash carries the parsed address.
        self.remove_bits(elt.hash());
    }

    fn len(&self) -> usize {
        self.len
    }

    fn slots(&self) -> Vec<SlotId> {
        let mut out = Vec::with_capacity(self.len);
        Self::collect(&self.root, &mut out);
        out
    }

    fn clear(&mut self) {
        self.root = RadixNode::default();
        self.len = 0;
    }
}
