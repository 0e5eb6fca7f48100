// Garbage Collection Tests for slabcache
// These tests pin down when collection fires, what it reclaims, and how the
// directory looks afterwards.

use slabcache::pool::Adjustment;
use slabcache::store::MemoryStore;
use slabcache::{BlockAddr, GcReport, Options, PutOutcome, SlabCache, SlabId};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn key(i: usize) -> Vec<u8> {
    format!("key_{:04}", i).into_bytes()
}

fn pressure_cache(purge: bool) -> SlabCache<MemoryStore> {
    let options = Options::default()
        .total_slabs(40)
        .blocks_per_slab(2)
        .block_size(4)
        .gc_min_threshold(4)
        .purge_on_evict(purge);
    SlabCache::new(MemoryStore::new(), options).unwrap()
}

/// Collection fires on exactly the put where the free pool drops below half
/// the low watermark with the reserve exhausted
#[test]
fn test_gc_fires_at_escalation_point() {
    init_logger();
    let cache = pressure_cache(true);

    let snapshot = cache.pool_snapshot();
    assert_eq!((snapshot.low_watermark, snapshot.high_watermark), (5, 27));
    assert_eq!((snapshot.free, snapshot.reserve), (32, 8));

    for i in 0..65 {
        assert!(cache.put(&key(i), b"v").unwrap().is_stored());
        assert_eq!(cache.stats().gc_runs, 0, "collection fired early at put {}", i);
    }

    let before = cache.pool_snapshot();
    assert_eq!((before.free, before.reserve, before.active), (7, 0, 33));
    assert_eq!((before.low_watermark, before.high_watermark), (8, 36));

    let outcome = cache.put(&key(65), b"v").unwrap();
    assert_eq!(outcome, PutOutcome::Stored(BlockAddr::new(SlabId::new(0), 1)));

    let report = cache.last_rebalance();
    assert_eq!(report.adjustment, Some(Adjustment::Grew));
    assert_eq!((report.low_watermark, report.high_watermark), (16, 36));
    assert_eq!((report.free_at_escalation, report.reserve_at_escalation), (7, 0));
    assert!(report.escalated);
    assert_eq!(
        report.gc,
        Some(GcReport {
            active_before: 33,
            target: 16,
            slabs_freed: 16,
            blocks_freed: 32,
            entries_purged: 32,
            store_errors: 0,
        })
    );

    let after = cache.pool_snapshot();
    assert_eq!((after.free, after.reserve, after.active), (23, 0, 17));

    let stats = cache.stats();
    assert_eq!(stats.gc_runs, 1);
    assert_eq!(stats.slabs_reclaimed, 16);
    assert_eq!(stats.entries_purged, 32);
    cache.verify_integrity().unwrap();
}

/// The oldest slabs are reclaimed and their keys purged
#[test]
fn test_gc_purges_oldest_keys() {
    let cache = pressure_cache(true);
    for i in 0..66 {
        assert!(cache.put(&key(i), b"v").unwrap().is_stored());
    }

    assert_eq!(cache.len(), 34);
    for i in 0..32 {
        assert!(!cache.contains_key(&key(i)), "key {} survived collection", i);
        assert_eq!(cache.get(&key(i)).unwrap(), None);
    }
    for i in 32..66 {
        assert_eq!(cache.get(&key(i)).unwrap(), Some(b"v\0\0\0".to_vec()));
    }

    // Reclaimed records are gone from the store
    assert_eq!(cache.store().len(), 34);
}

/// Without purging, entries for reclaimed slabs stay behind and miss
#[test]
fn test_gc_without_purge_leaves_dangling_entries() {
    let cache = pressure_cache(false);
    for i in 0..66 {
        assert!(cache.put(&key(i), b"v").unwrap().is_stored());
    }

    assert_eq!(cache.stats().gc_runs, 1);
    assert_eq!(cache.stats().entries_purged, 0);
    assert_eq!(cache.len(), 66);
    assert_eq!(cache.store().len(), 34);

    // The block behind key 0 was erased and has not been reused yet
    assert!(cache.lookup(&key(0)).is_some());
    assert_eq!(cache.get(&key(0)).unwrap(), None);
    cache.verify_integrity().unwrap();
}

/// A read promotes the whole slab, so its neighbour survives collection too
#[test]
fn test_read_promotes_slab() {
    let cache = pressure_cache(true);
    for i in 0..65 {
        assert!(cache.put(&key(i), b"v").unwrap().is_stored());
    }

    // key 0 and key 1 share the first slab written
    assert_eq!(cache.lookup(&key(0)).map(|a| a.slab), cache.lookup(&key(1)).map(|a| a.slab));
    assert!(cache.get(&key(0)).unwrap().is_some());

    assert!(cache.put(&key(65), b"v").unwrap().is_stored());
    assert_eq!(cache.stats().gc_runs, 1);

    assert!(cache.contains_key(&key(0)));
    assert!(cache.contains_key(&key(1)));
    // The next oldest slabs took its place
    assert!(!cache.contains_key(&key(2)));
    assert!(!cache.contains_key(&key(33)));
    assert!(cache.contains_key(&key(34)));
    cache.verify_integrity().unwrap();
}

/// Sustained writes keep cycling slabs without dropping anything
#[test]
fn test_sustained_writes_never_drop() {
    init_logger();
    let options = Options::default()
        .total_slabs(40)
        .blocks_per_slab(3)
        .block_size(8)
        .gc_min_threshold(2);
    let cache = SlabCache::new(MemoryStore::new(), options).unwrap();

    for i in 0..400 {
        let outcome = cache.put(&key(i), &(i as u32).to_le_bytes()).unwrap();
        assert!(outcome.is_stored(), "put {} dropped", i);
    }

    let stats = cache.stats();
    assert_eq!(stats.dropped_puts, 0);
    assert_eq!(stats.gc_runs, 7);

    // The newest key is always readable
    let mut expected = 399u32.to_le_bytes().to_vec();
    expected.resize(8, 0);
    assert_eq!(cache.get(&key(399)).unwrap(), Some(expected));
    assert_eq!(cache.pool_snapshot().pooled(), 40);
    cache.verify_integrity().unwrap();
}

/// An operator trigger reruns the policy; with slack it collects nothing
#[test]
fn test_trigger_gc_without_pressure() {
    let cache = pressure_cache(true);
    assert!(cache.put(b"k", b"v").unwrap().is_stored());

    let report = cache.trigger_gc();
    assert!(!report.escalated);
    assert!(report.gc.is_none());
    assert_eq!(cache.last_rebalance(), report);
    assert_eq!(cache.stats().gc_runs, 0);
    assert!(cache.contains_key(b"k"));
}

/// Deleted keys leave empty slabs active until collection returns them
#[test]
fn test_emptied_slabs_reclaimed_by_gc() {
    let cache = pressure_cache(true);
    for i in 0..10 {
        assert!(cache.put(&key(i), b"v").unwrap().is_stored());
    }
    let active = cache.pool_snapshot().active;
    for i in 0..10 {
        assert!(cache.delete(&key(i)).unwrap());
    }
    assert_eq!(cache.pool_snapshot().active, active);
    assert!(cache.is_empty());

    // Keep writing until collection runs. The open slab is refilled first, so
    // four of the five emptied slabs stay empty and are the oldest victims.
    let mut i = 10;
    while cache.stats().gc_runs == 0 {
        assert!(cache.put(&key(i), b"v").unwrap().is_stored());
        i += 1;
    }
    assert_eq!(i, 68);

    let gc = cache.last_rebalance().gc.unwrap();
    assert_eq!(gc.slabs_freed, 16);
    assert_eq!(gc.blocks_freed, 2 * (16 - 4));
    cache.verify_integrity().unwrap();
}
