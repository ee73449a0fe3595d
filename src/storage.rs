//! Storage façade: caps, accounting, and strategy sequencing.
//!
//! A `Storage` owns the element arena and the three strategies, and is the
//! only place their views of an element's lifetime are stitched together.
//! Every mutation runs under the storage's writer lock in a fixed order
//! (expire-delete of the old element, cache steal/insert, backend notify,
//! expire-insert of the new element, accounting), so the eviction queue
//! never holds a handle to a released slot and the caps are never exceeded
//! between steps.
//!
//! ## Capacity
//!
//! Two independent caps, both `0 = unlimited`: `max_elts` bounds the entry
//! count and `max_memory` bounds the summed element footprints
//! (header + key + NUL + value). Before an insertion that would exceed
//! either cap, the façade loops over [`Expire::step`]; the first step is
//! polite, later steps are forced, and after [`MAX_EXPIRE_STEPS`] the
//! insertion fails rather than storm the queue.
//!
//! ## Locking
//!
//! One `parking_lot::RwLock` per storage, the sole synchronisation
//! primitive. Lookups take an upgradable read and only upgrade when a
//! backend hoist has to mutate the cache, the eviction queue, and the
//! accounting. Strategy implementations are not internally synchronised.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::{release_stolen, Cache};
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::element::{self, Element, Flags};
use crate::expire::Expire;

/// Eviction attempts per insertion before the insertion fails.
pub const MAX_EXPIRE_STEPS: u32 = 10;

/// Boxed cache strategy.
pub type DynCache = Box<dyn Cache + Send + Sync>;
/// Boxed expire strategy.
pub type DynExpire = Box<dyn Expire + Send + Sync>;
/// Boxed backend strategy.
pub type DynBackend = Box<dyn Backend + Send + Sync>;

/// Wall-clock seconds, the time base for element ages.
pub fn wall_clock() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Live accounting, kept in step by mutations and eviction alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accounting {
    /// Elements reachable through the cache.
    pub elts: usize,
    /// Summed footprints of reachable elements.
    pub memory: usize,
    /// Elements evicted by the expire policy since creation.
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    removes: AtomicU64,
}

/// Point-in-time view of a storage's activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub removes: u64,
    pub evictions: u64,
}

struct StorageInner {
    arena: SlotArena<Element>,
    cache: DynCache,
    expire: Option<DynExpire>,
    backend: Option<DynBackend>,
    tally: Accounting,
    max_elts: usize,
    max_memory: usize,
}

/// Bounded key-value storage over pluggable strategies.
pub struct Storage {
    id: u32,
    name: String,
    counters: Counters,
    inner: RwLock<StorageInner>,
}

impl Storage {
    /// Creates a storage over the given strategies and runs their init
    /// hooks. A missing name defaults to the decimal id.
    pub fn new(
        id: u32,
        name: Option<String>,
        mut cache: DynCache,
        expire: Option<DynExpire>,
        backend: Option<DynBackend>,
        max_elts: usize,
        max_memory: usize,
    ) -> Storage {
        cache.init();
        let mut expire = expire;
        if let Some(e) = expire.as_mut() {
            e.init();
        }
        let mut backend = backend;
        if let Some(b) = backend.as_mut() {
            b.init();
        }
        Storage {
            id,
            name: name.unwrap_or_else(|| id.to_string()),
            counters: Counters::default(),
            inner: RwLock::new(StorageInner {
                arena: SlotArena::new(),
                cache,
                expire,
                backend,
                tally: Accounting::default(),
                max_elts,
                max_memory,
            }),
        }
    }

    /// Returns the storage id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the printable storage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current element count.
    pub fn elts(&self) -> usize {
        self.inner.read().tally.elts
    }

    /// Current accounted memory in bytes.
    pub fn memory(&self) -> usize {
        self.inner.read().tally.memory
    }

    /// Entry-count cap; 0 means unlimited.
    pub fn max_elts(&self) -> usize {
        self.inner.read().max_elts
    }

    /// Memory cap in bytes; 0 means unlimited.
    pub fn max_memory(&self) -> usize {
        self.inner.read().max_memory
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.elts() == 0
    }

    /// Snapshot of the activity counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        let evictions = self.inner.read().tally.evictions;
        MetricsSnapshot {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            removes: self.counters.removes.load(Ordering::Relaxed),
            evictions,
        }
    }

    /// Installs or replaces the entry for `key`.
    ///
    /// On success the new value is the unique entry for `key` across cache,
    /// expire, and backend. A TTL of 0 merges the implicit
    /// [`Flags::PERSISTENT`]. Returns `false` when the caps cannot be met
    /// within the eviction budget or the backend refuses the write; any
    /// pre-existing entry for `key` has already been retired by then.
    pub fn insert(&self, key: &[u8], value: &[u8], flags: Flags, ttl: u32) -> bool {
        let now = wall_clock();
        let mut inner = self.inner.write();

        // Retire any pre-existing entry before opening the eviction gate:
        // the fresh element may differ in size, flags, or backend state,
        // and the gate must not count the entry being replaced, or a
        // re-insert at the cap sacrifices an unrelated victim.
        if let Some(old) = inner.cache.lookup(key) {
            inner.retire(old);
        }

        let footprint = Element::footprint_for(key.len(), value.len());
        if !inner.make_room(footprint, now, true) {
            return false;
        }

        let StorageInner {
            arena,
            cache,
            expire,
            backend,
            tally,
            ..
        } = &mut *inner;
        let Some(slot) = cache.insert(arena, key, value, now) else {
            return false;
        };

        let mut flags = flags;
        if ttl == 0 {
            flags.insert(Flags::PERSISTENT);
        }
        if let Some(elt) = arena.get_mut(slot) {
            elt.set_flags(flags);
            elt.set_expire(ttl);
        }

        let mut res = true;
        if let Some(b) = backend.as_mut() {
            if let Some(elt) = arena.get_mut(slot) {
                res = b.insert(key, slot, elt);
            }
        }
        if let Some(e) = expire.as_mut() {
            e.insert(arena, slot);
        }

        tally.elts += 1;
        tally.memory += footprint;
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);
        res
    }

    /// Replaces the element stored under `key`; fails when `key` is absent.
    /// Accounting is adjusted by the footprint delta, and only the net
    /// growth over the old element is charged against the caps.
    pub fn replace(&self, key: &[u8], elt: Element) -> bool {
        let now = wall_clock();
        let mut inner = self.inner.write();
        let Some(old_slot) = inner.cache.lookup(key) else {
            return false;
        };
        let Some(old_footprint) = inner.arena.get(old_slot).map(Element::footprint) else {
            return false;
        };
        let new_footprint = elt.footprint();

        // Take the old element out of the eviction queue before opening the
        // gate, so the loop cannot evict the very entry being replaced. Its
        // footprint is about to be freed, so only the net growth needs room.
        {
            let StorageInner { arena, expire, .. } = &mut *inner;
            if let Some(e) = expire.as_mut() {
                e.delete(arena, old_slot);
            }
        }
        if !inner.make_room(new_footprint.saturating_sub(old_footprint), now, false) {
            // The replace failed; the old element goes back on the queue.
            let StorageInner { arena, expire, .. } = &mut *inner;
            if let Some(e) = expire.as_mut() {
                e.insert(arena, old_slot);
            }
            return false;
        }

        let StorageInner {
            arena,
            cache,
            expire,
            backend,
            tally,
            ..
        } = &mut *inner;
        let new_slot = arena.insert(elt);
        if !cache.replace(arena, key, new_slot) {
            arena.remove(new_slot);
            return false;
        }
        if let Some(e) = expire.as_mut() {
            e.insert(arena, new_slot);
        }
        let mut res = true;
        if let Some(b) = backend.as_mut() {
            if let Some(elt) = arena.get_mut(new_slot) {
                res = b.replace(key, new_slot, elt);
            }
        }
        tally.memory = tally.memory.saturating_sub(old_footprint) + new_footprint;
        res
    }

    /// Looks `key` up in the cache, falling back to the backend on miss
    /// (hoisting the persisted element back into the cache). An element
    /// whose TTL has elapsed at `now` is reported absent without being
    /// deleted.
    pub fn lookup(&self, key: &[u8], now: u64) -> Option<Element> {
        let inner = self.inner.upgradable_read();
        if let Some(slot) = inner.cache.lookup(key) {
            let found = inner
                .arena
                .get(slot)
                .filter(|elt| !elt.is_expired(now))
                .cloned();
            return self.tally_lookup(found);
        }
        if inner.backend.is_none() {
            return self.tally_lookup(None);
        }

        // Miss with a backend configured: the hoist mutates cache, expire,
        // and accounting, so promote to the exclusive lock.
        let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
        let slot = inner.lookup_slot(key, now);
        let found = slot.and_then(|slot| inner.arena.get(slot).cloned());
        self.tally_lookup(found)
    }

    /// Removes `key` from cache and backend, notifies expire, and returns
    /// the detached element. A dirty element keeps its arena slot under
    /// `NEED_FREE`; the caller receives a copy either way.
    pub fn delete(&self, key: &[u8]) -> Option<Element> {
        let mut inner = self.inner.write();
        let StorageInner {
            arena,
            cache,
            expire,
            backend,
            tally,
            ..
        } = &mut *inner;
        let slot = cache.delete(key);
        if let Some(b) = backend.as_mut() {
            b.delete(key);
        }
        let slot = slot?;
        if let Some(e) = expire.as_mut() {
            e.delete(arena, slot);
        }

        let dirty = arena
            .get(slot)
            .map(|elt| elt.flags().contains(Flags::DIRTY))
            .unwrap_or(false);
        let out = if dirty {
            let elt = arena.get_mut(slot)?;
            elt.flags_mut().insert(Flags::NEED_FREE);
            elt.clone()
        } else {
            arena.remove(slot)?
        };
        tally.elts = tally.elts.saturating_sub(1);
        tally.memory = tally.memory.saturating_sub(out.footprint());
        self.counters.removes.fetch_add(1, Ordering::Relaxed);
        Some(out)
    }

    /// Installs an array element: one machine word holding `slot_size`
    /// followed by `data` verbatim. Fails when `slot_size` is 0 or `data`
    /// is not a whole number of slots.
    pub fn insert_array(
        &self,
        key: &[u8],
        slot_size: usize,
        data: &[u8],
        flags: Flags,
        ttl: u32,
    ) -> bool {
        if slot_size == 0 || data.len() % slot_size != 0 {
            return false;
        }
        let value = element::array_value(slot_size, data);
        let now = wall_clock();
        let mut inner = self.inner.write();
        if let Some(old) = inner.cache.lookup(key) {
            inner.retire(old);
        }
        let Some(slot) = inner.insert_internal(key, &value, flags | Flags::ARRAY, ttl, now) else {
            return false;
        };
        self.counters.inserts.fetch_add(1, Ordering::Relaxed);

        let StorageInner { arena, backend, .. } = &mut *inner;
        if let Some(b) = backend.as_mut() {
            if let Some(elt) = arena.get_mut(slot) {
                return b.insert(key, slot, elt);
            }
        }
        true
    }

    /// Overwrites slot `index` of the array stored under `key` in place.
    /// Fails on absent or TTL-expired keys, non-array elements,
    /// out-of-range indices, and data that is not exactly one slot wide.
    pub fn set_array(&self, key: &[u8], index: usize, data: &[u8], now: u64) -> bool {
        let mut inner = self.inner.write();
        let Some(slot) = inner.lookup_slot(key, now) else {
            return false;
        };
        let StorageInner { arena, backend, .. } = &mut *inner;
        let Some(elt) = arena.get_mut(slot) else {
            return false;
        };
        if !elt.array_set(index, data) {
            return false;
        }
        if let Some(b) = backend.as_mut() {
            return b.replace(key, slot, elt);
        }
        true
    }

    /// Reads slot `index` of the array stored under `key`.
    pub fn get_array(&self, key: &[u8], index: usize, now: u64) -> Option<Vec<u8>> {
        let inner = self.inner.upgradable_read();
        if let Some(slot) = inner.cache.lookup(key) {
            let elt = inner.arena.get(slot)?;
            if elt.is_expired(now) {
                return None;
            }
            return elt.array_get(index).map(<[u8]>::to_vec);
        }
        if inner.backend.is_none() {
            return None;
        }
        let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
        let slot = inner.lookup_slot(key, now)?;
        inner.arena.get(slot)?.array_get(index).map(<[u8]>::to_vec)
    }

    /// Drains completed backend writes: the backend clears `DIRTY` on the
    /// affected elements and frees `NEED_FREE` slots. Returns the number of
    /// drained entries.
    pub fn sync_backend(&self) -> usize {
        let mut inner = self.inner.write();
        let StorageInner { arena, backend, .. } = &mut *inner;
        let Some(b) = backend.as_mut() else {
            return 0;
        };
        let drained = b.drain(arena);
        if drained > 0 {
            debug!(storage = %self.name, drained, "drained backend queue");
        }
        drained
    }

    fn tally_lookup(&self, found: Option<Element>) -> Option<Element> {
        if found.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let inner = self.inner.read();
        let slots = inner.cache.slots();
        assert_eq!(slots.len(), inner.tally.elts);
        let total: usize = slots
            .iter()
            .filter_map(|&slot| inner.arena.get(slot))
            .map(Element::footprint)
            .sum();
        assert_eq!(total, inner.tally.memory);
    }
}

impl StorageInner {
    fn over_caps(&self, new_len: usize, grows_elts: bool) -> bool {
        (self.max_memory > 0 && self.tally.memory + new_len > self.max_memory)
            || (grows_elts && self.max_elts > 0 && self.tally.elts >= self.max_elts)
    }

    /// The eviction gate: evicts until `new_len` more bytes (and, for
    /// growing insertions, one more element) fit under the caps, or the
    /// step budget runs out.
    fn make_room(&mut self, new_len: usize, now: u64, grows_elts: bool) -> bool {
        if self.max_memory > 0 && new_len > self.max_memory {
            warn!(
                len = new_len,
                limit = self.max_memory,
                "value exceeds the storage memory cap"
            );
            return false;
        }
        let mut steps = 0u32;
        while self.over_caps(new_len, grows_elts) {
            if steps >= MAX_EXPIRE_STEPS {
                warn!(steps, "cannot evict enough elements");
                return false;
            }
            let StorageInner {
                arena,
                cache,
                expire,
                tally,
                ..
            } = self;
            match expire.as_mut() {
                Some(e) => {
                    e.step(cache.as_mut(), arena, tally, now, steps > 0);
                }
                None => {
                    warn!("storage is full and no expire policy is configured");
                    return false;
                }
            }
            steps += 1;
        }
        true
    }

    /// Detaches `slot` from the eviction queue and the index, settles
    /// accounting, and releases it per the dirty rule.
    fn retire(&mut self, slot: SlotId) {
        let StorageInner {
            arena,
            cache,
            expire,
            tally,
            ..
        } = self;
        if let Some(e) = expire.as_mut() {
            e.delete(arena, slot);
        }
        let footprint = match arena.get(slot) {
            Some(elt) => {
                cache.steal(elt);
                elt.footprint()
            }
            None => return,
        };
        tally.elts = tally.elts.saturating_sub(1);
        tally.memory = tally.memory.saturating_sub(footprint);
        release_stolen(arena, slot);
    }

    /// Cache-or-backend probe shared by the array operations and the
    /// upgraded lookup path. Hoists a backend hit into the cache, then
    /// applies the TTL.
    fn lookup_slot(&mut self, key: &[u8], now: u64) -> Option<SlotId> {
        let slot = match self.cache.lookup(key) {
            Some(slot) => slot,
            None => {
                let belt = self.backend.as_mut()?.lookup(key)?;
                debug!(key_len = key.len(), "hoisting element from backend");
                self.insert_internal(key, belt.value(), belt.flags(), belt.expire(), now)?
            }
        };
        let elt = self.arena.get(slot)?;
        if elt.is_expired(now) {
            return None;
        }
        Some(slot)
    }

    /// Insertion without the backend write: used when hoisting persisted
    /// elements back into the cache and by the array installer. Runs the
    /// eviction gate, stamps flags and TTL, registers with expire, and
    /// settles accounting.
    fn insert_internal(
        &mut self,
        key: &[u8],
        value: &[u8],
        flags: Flags,
        ttl: u32,
        now: u64,
    ) -> Option<SlotId> {
        let footprint = Element::footprint_for(key.len(), value.len());
        if !self.make_room(footprint, now, true) {
            return None;
        }
        let StorageInner {
            arena,
            cache,
            expire,
            tally,
            ..
        } = self;
        let slot = cache.insert(arena, key, value, now)?;
        let mut flags = flags;
        if ttl == 0 {
            flags.insert(Flags::PERSISTENT);
        }
        if let Some(elt) = arena.get_mut(slot) {
            elt.set_flags(flags);
            elt.set_expire(ttl);
        }
        if let Some(e) = expire.as_mut() {
            e.insert(arena, slot);
        }
        tally.elts += 1;
        tally.memory += footprint;
        Some(slot)
    }
}

impl Drop for StorageInner {
    // Teardown order: index, then backend, then eviction state.
    fn drop(&mut self) {
        self.cache.clear();
        if let Some(b) = self.backend.as_mut() {
            b.destroy();
        }
        if let Some(e) = self.expire.as_mut() {
            e.clear();
        }
        self.arena.clear();
    }
}
