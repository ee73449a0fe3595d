// ==============================================
// END-TO-END STORAGE SCENARIOS (integration)
// ==============================================
//
// Exercises the storage façade through its public surface the way the
// filtering host drives it: TTL expiry, forced eviction under caps, array
// mutation, the IPv4 index, and the dirty/deferred-free hand-off to a
// write-behind backend.

use kvkit::backend::MemoryBackend;
use kvkit::builder::{CacheKind, StorageBuilder};
use kvkit::element::Flags;
use kvkit::storage::wall_clock;

#[test]
fn basic_ttl_expiry() {
    let storage = StorageBuilder::new(1)
        .cache(CacheKind::Hash)
        .lru_expire()
        .max_elts(1024)
        .max_memory(1 << 20)
        .build()
        .unwrap();

    let t0 = wall_clock();
    assert!(storage.insert(b"k", b"v", Flags::empty(), 1));

    let elt = storage.lookup(b"k", t0).unwrap();
    assert_eq!(elt.value(), b"v");

    // Three seconds past insertion the one-second TTL has elapsed, and the
    // expired element is reported absent without being deleted.
    assert!(storage.lookup(b"k", t0 + 3).is_none());
    assert_eq!(storage.elts(), 1);
    storage.debug_validate_invariants();
}

#[test]
fn forced_eviction_on_full_storage() {
    let storage = StorageBuilder::new(1)
        .cache(CacheKind::Hash)
        .lru_expire()
        .max_elts(2)
        .build()
        .unwrap();

    assert!(storage.insert(b"k1", b"1", Flags::empty(), 0));
    assert!(storage.insert(b"k2", b"2", Flags::empty(), 0));
    assert!(storage.insert(b"k3", b"3", Flags::empty(), 0));

    assert_eq!(storage.elts(), 2);
    let now = wall_clock();
    let reachable = [b"k1".as_slice(), b"k2".as_slice(), b"k3".as_slice()]
        .iter()
        .filter(|key| storage.lookup(key, now).is_some())
        .count();
    assert_eq!(reachable, 2);
    // The newest key always survives its own insertion.
    assert!(storage.lookup(b"k3", now).is_some());
    assert_eq!(storage.metrics().evictions, 1);
    storage.debug_validate_invariants();
}

#[test]
fn lru_eviction_follows_insertion_order() {
    let storage = StorageBuilder::new(1)
        .cache(CacheKind::Hash)
        .lru_expire()
        .max_elts(3)
        .build()
        .unwrap();

    assert!(storage.insert(b"a", b"1", Flags::empty(), 600));
    assert!(storage.insert(b"b", b"2", Flags::empty(), 600));
    assert!(storage.insert(b"c", b"3", Flags::empty(), 600));
    assert!(storage.insert(b"d", b"4", Flags::empty(), 600));

    let now = wall_clock();
    assert!(storage.lookup(b"a", now).is_none());
    assert!(storage.lookup(b"b", now).is_some());
    assert!(storage.lookup(b"c", now).is_some());
    assert!(storage.lookup(b"d", now).is_some());
}

#[test]
fn array_mutation() {
    let storage = StorageBuilder::new(1)
        .cache(CacheKind::Hash)
        .lru_expire()
        .build()
        .unwrap();

    let buf: [u8; 16] = [4, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0];
    assert!(storage.insert_array(b"arr", 4, &buf, Flags::empty(), 0));

    let now = wall_clock();
    assert_eq!(storage.get_array(b"arr", 1, now), Some(vec![1, 0, 0, 0]));

    assert!(storage.set_array(b"arr", 1, &[9, 0, 0, 0], now));
    assert_eq!(storage.get_array(b"arr", 1, now), Some(vec![9, 0, 0, 0]));
    // Other slots are untouched by the in-place write.
    assert_eq!(storage.get_array(b"arr", 0, now), Some(vec![4, 0, 0, 0]));
    assert_eq!(storage.get_array(b"arr", 3, now), Some(vec![3, 0, 0, 0]));

    // Out-of-range, including one-past-the-end, fails.
    assert!(!storage.set_array(b"arr", 5, &[9, 0, 0, 0], now));
    assert!(!storage.set_array(b"arr", 4, &[9, 0, 0, 0], now));
    assert_eq!(storage.get_array(b"arr", 4, now), None);
    // So does a write that is not exactly one slot wide.
    assert!(!storage.set_array(b"arr", 1, &[9, 0], now));

    // Non-array elements reject slot operations.
    assert!(storage.insert(b"plain", b"v", Flags::empty(), 0));
    assert!(!storage.set_array(b"plain", 0, &[0, 0, 0, 0], now));
    assert_eq!(storage.get_array(b"plain", 0, now), None);
    storage.debug_validate_invariants();
}

#[test]
fn array_rejects_ragged_buffers() {
    let storage = StorageBuilder::new(1).build().unwrap();
    assert!(!storage.insert_array(b"arr", 4, &[1, 2, 3], Flags::empty(), 0));
    assert!(!storage.insert_array(b"arr", 0, &[1, 2, 3, 4], Flags::empty(), 0));
    assert_eq!(storage.elts(), 0);
}

#[test]
fn ipv4_radix_cache() {
    let storage = StorageBuilder::new(1)
        .cache(CacheKind::Radix)
        .lru_expire()
        .build()
        .unwrap();

    assert!(storage.insert(b"10.0.0.1", b"a", Flags::empty(), 0));
    assert!(storage.insert(b"10.0.0.2", b"b", Flags::empty(), 0));
    assert!(!storage.insert(b"bogus", b"c", Flags::empty(), 0));

    let now = wall_clock();
    assert_eq!(storage.lookup(b"10.0.0.1", now).unwrap().value(), b"a");
    assert_eq!(storage.lookup(b"10.0.0.2", now).unwrap().value(), b"b");
    assert!(storage.lookup(b"bogus", now).is_none());
    assert_eq!(storage.elts(), 2);
    storage.debug_validate_invariants();
}

#[test]
fn dirty_elements_survive_eviction_until_drained() {
    let storage = StorageBuilder::new(1)
        .cache(CacheKind::Hash)
        .lru_expire()
        .backend(MemoryBackend::new())
        .max_elts(1)
        .build()
        .unwrap();

    // The write-behind backend marks the element dirty and holds the write
    // until drained.
    assert!(storage.insert(b"k1", b"v1", Flags::empty(), 0));

    // A capacity-exceeding insert forces the dirty element out of the
    // cache; it is flagged for deferred free rather than destroyed.
    assert!(storage.insert(b"k2", b"v2", Flags::empty(), 0));
    assert_eq!(storage.elts(), 1);
    assert_eq!(storage.metrics().evictions, 1);

    // Unreachable through the cache, and the backend has not applied the
    // write yet either.
    let now = wall_clock();
    assert!(storage.lookup(b"k1", now).is_none());

    // Draining applies both pending writes, clears the dirty bits, and
    // releases the deferred-free element.
    assert_eq!(storage.sync_backend(), 2);

    // The durable copy is now visible and hoists back into the cache; the
    // one-element cap forces the resident key out to make room.
    let hoisted = storage.lookup(b"k1", now).unwrap();
    assert_eq!(hoisted.value(), b"v1");
    assert_eq!(storage.elts(), 1);
    assert_eq!(storage.metrics().evictions, 2);
    storage.debug_validate_invariants();
}

#[test]
fn deleted_dirty_element_is_returned_and_deferred() {
    let storage = StorageBuilder::new(1)
        .cache(CacheKind::Hash)
        .lru_expire()
        .backend(MemoryBackend::new())
        .build()
        .unwrap();

    assert!(storage.insert(b"k", b"v", Flags::empty(), 0));

    // Deleting while the write is pending still yields the element.
    let detached = storage.delete(b"k").unwrap();
    assert_eq!(detached.value(), b"v");
    assert!(detached.flags().contains(Flags::DIRTY));
    assert!(detached.flags().contains(Flags::NEED_FREE));
    assert_eq!(storage.elts(), 0);

    // The drain applies the write and then the queued delete.
    assert_eq!(storage.sync_backend(), 2);
    assert!(storage.lookup(b"k", wall_clock()).is_none());
}

#[test]
fn trie_cache_matches_hash_semantics() {
    let storage = StorageBuilder::new(1)
        .cache(CacheKind::Trie)
        .lru_expire()
        .max_elts(2)
        .build()
        .unwrap();

    assert!(storage.insert(b"Alpha", b"1", Flags::empty(), 0));
    assert!(storage.insert(b"beta", b"2", Flags::empty(), 0));

    let now = wall_clock();
    assert_eq!(storage.lookup(b"alpha", now).unwrap().value(), b"1");
    assert_eq!(storage.lookup(b"BETA", now).unwrap().value(), b"2");

    // Cap pressure evicts in insertion order here too.
    assert!(storage.insert(b"gamma", b"3", Flags::empty(), 0));
    assert!(storage.lookup(b"alpha", now).is_none());
    assert_eq!(storage.elts(), 2);
    storage.debug_validate_invariants();
}

#[test]
fn accounting_stays_exact_across_mixed_operations() {
    let storage = StorageBuilder::new(1)
        .cache(CacheKind::Hash)
        .lru_expire()
        .max_elts(64)
        .max_memory(1 << 16)
        .build()
        .unwrap();

    for i in 0..32u32 {
        let key = format!("key-{i}");
        let value = vec![b'x'; (i as usize % 7) * 16];
        assert!(storage.insert(key.as_bytes(), &value, Flags::empty(), 300));
        storage.debug_validate_invariants();
    }
    for i in (0..32u32).step_by(3) {
        let key = format!("key-{i}");
        storage.delete(key.as_bytes());
        storage.debug_validate_invariants();
    }
    for i in 0..16u32 {
        let key = format!("key-{i}");
        let value = vec![b'y'; 64];
        assert!(storage.insert(key.as_bytes(), &value, Flags::empty(), 300));
        storage.debug_validate_invariants();
    }
}
