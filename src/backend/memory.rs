//! Write-behind in-memory backend.
//!
//! The reference backend: writes and deletes accumulate in a pending queue
//! and apply to the durable map only when drained, which is exactly the
//! window the dirty discipline protects. Blobs are stored in the element
//! wire layout, so a hoisting lookup decodes a fresh element without
//! touching the arena. Useful on its own for tests and as the template for
//! real backends.

use rustc_hash::FxHashMap;

use crate::backend::Backend;
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::element::{Element, Flags};

#[derive(Debug)]
enum Pending {
    Write {
        key: Box<[u8]>,
        slot: SlotId,
        blob: Vec<u8>,
    },
    Delete {
        key: Box<[u8]>,
    },
}

/// In-memory write-behind backend storing wire-encoded elements.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: FxHashMap<Box<[u8]>, Vec<u8>>,
    pending: Vec<Pending>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes and deletes waiting to be drained.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of durably stored entries.
    pub fn stored_len(&self) -> usize {
        self.store.len()
    }

    fn queue_write(&mut self, key: &[u8], slot: SlotId, elt: &mut Element) -> bool {
        // The blob carries durable flags only; DIRTY and NEED_FREE describe
        // in-process state.
        let in_process = elt.flags();
        elt.flags_mut().remove(Flags::DIRTY | Flags::NEED_FREE);
        let blob = elt.encode();
        elt.set_flags(in_process);
        elt.flags_mut().insert(Flags::DIRTY);
        self.pending.push(Pending::Write {
            key: key.to_vec().into_boxed_slice(),
            slot,
            blob,
        });
        true
    }
}

impl Backend for MemoryBackend {
    fn insert(&mut self, key: &[u8], slot: SlotId, elt: &mut Element) -> bool {
        self.queue_write(key, slot, elt)
    }

    fn replace(&mut self, key: &[u8], slot: SlotId, elt: &mut Element) -> bool {
        self.queue_write(key, slot, elt)
    }

    fn lookup(&mut self, key: &[u8]) -> Option<Element> {
        self.store.get(key).and_then(|blob| Element::decode(blob))
    }

    fn delete(&mut self, key: &[u8]) -> bool {
        self.pending.push(Pending::Delete {
            key: key.to_vec().into_boxed_slice(),
        });
        true
    }

    fn drain(&mut self, arena: &mut SlotArena<Element>) -> usize {
        let mut drained = 0;
        for op in self.pending.drain(..) {
            match op {
                Pending::Write { key, slot, blob } => {
                    self.store.insert(key, blob);
                    if let Some(elt) = arena.get_mut(slot) {
                        elt.flags_mut().remove(Flags::DIRTY);
                        if elt.flags().contains(Flags::NEED_FREE) {
                            arena.remove(slot);
                        }
                    }
                }
                Pending::Delete { key } => {
                    self.store.remove(&key);
                }
            }
            drained += 1;
        }
        drained
    }

    fn destroy(&mut self) {
        self.pending.clear();
        self.store.clear();
    }
}
