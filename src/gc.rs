//! Slab-granular garbage collection.
//!
//! The collector runs only when the pool policy escalates: the free pool is
//! below half the low watermark and the reserve is empty. It reclaims whole
//! slabs, least recently touched first, until it has freed at least half of
//! the active pool (and never fewer than the configured minimum), or runs out
//! of candidates. Every allocated block in a victim is erased from the store
//! and released, and the victim goes to the back of the free pool.
//!
//! Reclaiming a slab invalidates every directory entry pointing into it. With
//! `purge_directory` those entries are removed, so later reads are clean
//! misses. Without it they are left dangling and a read returns whatever the
//! store holds at the recycled block.

use crate::directory::Directory;
use crate::pool::PoolManager;
use crate::slab::{BlockAddr, SlabArena};
use crate::store::{BlockAdapter, BlockStore};
use serde::Serialize;

/// Fraction of the active pool one pass aims to reclaim.
const ACTIVE_FRACTION: f64 = 0.5;

/// Outcome of one collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    /// Active slabs when the pass started
    pub active_before: usize,
    /// Number of slabs the pass aimed to reclaim
    pub target: usize,
    /// Slabs returned to the free pool
    pub slabs_freed: usize,
    /// Allocated blocks released
    pub blocks_freed: usize,
    /// Directory entries removed
    pub entries_purged: usize,
    /// Store deletes that failed and were skipped
    pub store_errors: usize,
}

/// Reclaims least recently used slabs.
#[derive(Debug, Clone)]
pub struct GarbageCollector {
    min_threshold: usize,
    purge_directory: bool,
}

impl GarbageCollector {
    /// Create a collector that frees at least `min_threshold` slabs per pass
    /// when that many are available.
    pub fn new(min_threshold: usize, purge_directory: bool) -> Self {
        Self { min_threshold, purge_directory }
    }

    /// Number of slabs a pass over `active` active slabs aims to free.
    pub fn target(&self, active: usize) -> usize {
        ((active as f64 * ACTIVE_FRACTION) as usize).max(self.min_threshold)
    }

    /// Run one pass.
    ///
    /// An empty eviction index is not an error; the pass reports nothing freed.
    pub fn collect<S: BlockStore>(
        &self,
        arena: &mut SlabArena,
        pools: &mut PoolManager,
        directory: &mut Directory,
        adapter: &BlockAdapter<S>,
    ) -> GcReport {
        let mut report = GcReport { active_before: pools.active_len(), ..GcReport::default() };

        if pools.eviction().is_empty() {
            log::info!("GC: no slabs available for collection");
            return report;
        }

        report.target = self.target(report.active_before);

        while report.slabs_freed < report.target {
            let Some(victim) = pools.pop_victim() else {
                break;
            };

            let now = arena.tick();
            let slab = arena.slab_mut(victim);
            let used: Vec<u32> = slab.used_blocks().collect();
            for index in used {
                let addr = BlockAddr::new(victim, index);
                if let Err(e) = adapter.erase_block(addr) {
                    log::warn!("GC: failed to erase {}: {}", addr, e);
                    report.store_errors += 1;
                }
                slab.release(index, now);
                if directory.reclaim(&addr, self.purge_directory) {
                    report.entries_purged += 1;
                }
                report.blocks_freed += 1;
            }

            pools.retire(victim);
            report.slabs_freed += 1;
        }

        log::info!(
            "GC: freed {} slabs ({} blocks, {} entries purged), target {} of {} active",
            report.slabs_freed,
            report.blocks_freed,
            report.entries_purged,
            report.target,
            report.active_before
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slab::SlabId;
    use crate::store::MemoryStore;

    struct Fixture {
        arena: SlabArena,
        pools: PoolManager,
        directory: Directory,
        adapter: BlockAdapter<MemoryStore>,
    }

    impl Fixture {
        fn new(total: u32, blocks: u32) -> Self {
            let arena = SlabArena::new(total, blocks, 1);
            let pools = PoolManager::new(arena.ids());
            let adapter = BlockAdapter::new(MemoryStore::new(), 4);
            Self { arena, pools, directory: Directory::new(), adapter }
        }

        /// Take a free slab and fill `count` blocks with keys `prefix:i`.
        fn fill(&mut self, prefix: &str, count: u32) -> SlabId {
            let id = self.pools.take_free().unwrap();
            for i in 0..count {
                let now = self.arena.tick();
                let index = self.arena.slab_mut(id).allocate(now).unwrap();
                self.pools.touch(id, now);
                let addr = BlockAddr::new(id, index);
                self.adapter.write_block(addr, b"v").unwrap();
                self.directory.insert(format!("{}:{}", prefix, i).as_bytes(), addr);
            }
            id
        }

        fn collect(&mut self, gc: &GarbageCollector) -> GcReport {
            gc.collect(&mut self.arena, &mut self.pools, &mut self.directory, &self.adapter)
        }
    }

    #[test]
    fn test_empty_index_is_noop() {
        let mut fx = Fixture::new(4, 2);
        let report = fx.collect(&GarbageCollector::new(1, true));
        assert_eq!(report.slabs_freed, 0);
        assert_eq!(report.target, 0);
        assert_eq!(fx.pools.free_len(), 4);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut fx = Fixture::new(6, 2);
        let a = fx.fill("a", 2);
        let b = fx.fill("b", 2);
        let c = fx.fill("c", 1);

        // Touch `a` so `b` becomes the oldest
        let now = fx.arena.tick();
        fx.arena.slab_mut(a).touch(now);
        fx.pools.touch(a, now);

        let report = fx.collect(&GarbageCollector::new(1, true));
        // target = max(3 / 2, 1) = 1
        assert_eq!(report.target, 1);
        assert_eq!(report.slabs_freed, 1);
        assert_eq!(report.blocks_freed, 2);
        assert_eq!(report.entries_purged, 2);

        assert!(!fx.pools.is_active(b));
        assert!(fx.pools.is_active(a));
        assert!(fx.pools.is_active(c));
        assert_eq!(fx.arena.slab(b).free_count(), 2);
        assert!(!fx.adapter.store().contains(b"slab_1:0"));
        assert!(fx.directory.get(b"b:0").is_none());
        assert!(fx.directory.get(b"a:0").is_some());
    }

    #[test]
    fn test_min_threshold_bounded_by_candidates() {
        let mut fx = Fixture::new(5, 2);
        for name in ["a", "b", "c"] {
            fx.fill(name, 1);
        }

        let report = fx.collect(&GarbageCollector::new(100, true));
        assert_eq!(report.target, 100);
        assert_eq!(report.slabs_freed, 3);
        assert_eq!(fx.pools.active_len(), 0);
        assert_eq!(fx.pools.free_len(), 5);
        assert!(fx.directory.is_empty());
        assert!(fx.adapter.store().is_empty());
    }

    #[test]
    fn test_emptied_slab_is_still_a_candidate() {
        let mut fx = Fixture::new(4, 2);
        let slab = fx.fill("k", 2);
        for i in 0..2 {
            let removed = fx.directory.remove(format!("k:{}", i).as_bytes()).unwrap();
            let now = fx.arena.tick();
            fx.arena.slab_mut(slab).release(removed.addr.index, now);
            fx.pools.touch(slab, now);
        }

        let report = fx.collect(&GarbageCollector::new(1, true));
        assert_eq!(report.slabs_freed, 1);
        assert_eq!(report.blocks_freed, 0);
        assert!(!fx.pools.is_active(slab));
    }

    #[test]
    fn test_without_purge_entries_dangle() {
        let mut fx = Fixture::new(3, 2);
        let slab = fx.fill("k", 2);

        let report = fx.collect(&GarbageCollector::new(1, false));
        assert_eq!(report.slabs_freed, 1);
        assert_eq!(report.entries_purged, 0);

        // Entry still points at the reclaimed block, which nobody owns
        let addr = fx.directory.get(b"k:0").unwrap();
        assert_eq!(addr.slab, slab);
        assert!(fx.directory.owner_of(&addr).is_none());
        assert!(fx.arena.slab(slab).is_free(addr.index));
    }
}
