//! # slabcache - A Slab-Granular Flash Cache Engine
//!
//! slabcache maps keys to fixed-size blocks grouped into slabs, persists each
//! block through a pluggable [`BlockStore`](store::BlockStore), and reclaims
//! space a whole slab at a time, the way flash erase blocks are recycled.
//!
//! ## Architecture
//!
//! The engine consists of several key components:
//!
//! - **Slab arena**: a fixed population of slabs, each a bag of equal-size blocks
//! - **Directory**: key to (slab, block) mapping
//! - **Pool manager**: free / active / reserve pools steered by adaptive watermarks
//! - **Garbage collector**: evicts least recently touched slabs under pressure
//! - **Block store**: persistent key-value collaborator behind the cache
//!
//! ## Example Usage
//!
//! ```rust
//! use slabcache::store::MemoryStore;
//! use slabcache::{Options, PutOutcome, SlabCache};
//!
//! # fn main() -> Result<(), slabcache::Error> {
//! let options = Options::default().total_slabs(64).blocks_per_slab(16).block_size(8);
//! let cache = SlabCache::new(MemoryStore::new(), options)?;
//!
//! // Values are padded or truncated to the block size
//! assert!(matches!(cache.put(b"key1", b"value1")?, PutOutcome::Stored(_)));
//! assert_eq!(cache.get(b"key1")?, Some(b"value1\0\0".to_vec()));
//!
//! cache.delete(b"key1")?;
//! assert_eq!(cache.get(b"key1")?, None);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod config;
pub mod directory;
pub mod error;
pub mod gc;
pub mod pool;
pub mod slab;
pub mod stats;
pub mod store;
pub mod write_batch;

// Re-exports
pub use config::{CompressionType, Options, StoreOptions};
pub use error::{Error, Result};
pub use gc::GcReport;
pub use pool::{Pool, RebalanceReport};
pub use slab::{BlockAddr, SlabId};
pub use stats::{CacheStats, PoolSnapshot};
pub use write_batch::WriteBatch;

use directory::Directory;
use gc::GarbageCollector;
use parking_lot::Mutex;
use pool::PoolManager;
use slab::SlabArena;
use store::{BlockAdapter, BlockStore};

/// Result of a [`SlabCache::put`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The value was written to this block
    Stored(BlockAddr),
    /// No slab was available even after rebalancing; the key is absent
    Dropped,
}

impl PutOutcome {
    /// Whether the value was stored.
    pub fn is_stored(&self) -> bool {
        matches!(self, PutOutcome::Stored(_))
    }
}

/// Mutable engine state, guarded by a single lock.
#[derive(Debug)]
struct CacheState {
    arena: SlabArena,
    pools: PoolManager,
    directory: Directory,
    collector: GarbageCollector,
    /// Slab currently serving writes
    open_slab: Option<SlabId>,
    stats: CacheStats,
    last_rebalance: RebalanceReport,
}

impl CacheState {
    /// Run the pool policy and, if it escalates, a collection pass.
    fn run_policy<S: BlockStore>(&mut self, adapter: &BlockAdapter<S>) -> RebalanceReport {
        let mut report = self.pools.rebalance();
        if report.escalated {
            let gc = self.collector.collect(
                &mut self.arena,
                &mut self.pools,
                &mut self.directory,
                adapter,
            );
            self.stats.gc_runs += 1;
            self.stats.slabs_reclaimed += gc.slabs_freed as u64;
            self.stats.blocks_reclaimed += gc.blocks_freed as u64;
            self.stats.entries_purged += gc.entries_purged as u64;
            self.stats.store_errors += gc.store_errors as u64;
            report.gc = Some(gc);
        }
        self.last_rebalance = report.clone();
        report
    }

    /// The slab the next block should come from.
    ///
    /// Keeps filling the open slab until it is full, then takes the next free
    /// slab, falling back to the reserve when the free pool is empty.
    fn write_slab(&mut self) -> Option<SlabId> {
        if let Some(open) = self.open_slab {
            if self.pools.is_active(open) && self.arena.slab(open).has_free() {
                return Some(open);
            }
        }

        let slab = match self.pools.take_free() {
            Some(slab) => slab,
            None => {
                let slab = self.pools.take_reserve()?;
                log::warn!("Free pool empty, drawing {} from reserve", slab);
                self.stats.reserve_draws += 1;
                slab
            }
        };
        self.open_slab = Some(slab);
        Some(slab)
    }

    /// Return a block to its slab and refresh the slab's recency.
    fn release_block(&mut self, addr: BlockAddr) {
        let now = self.arena.tick();
        self.arena.slab_mut(addr.slab).release(addr.index, now);
        self.pools.touch(addr.slab, now);
    }

    fn touch_slab(&mut self, slab: SlabId) {
        let now = self.arena.tick();
        self.arena.slab_mut(slab).touch(now);
        self.pools.touch(slab, now);
    }

    fn verify(&self, purge_on_evict: bool) -> Result<()> {
        // Pool exhaustiveness and disjointness
        let pooled = self.pools.free_len() + self.pools.active_len() + self.pools.reserve_len();
        if pooled != self.arena.len() {
            return Err(Error::invalid_state(format!(
                "{} slabs pooled, {} exist",
                pooled,
                self.arena.len()
            )));
        }
        for id in self.arena.ids() {
            if self.pools.pool_of(id).is_none() {
                return Err(Error::invalid_state(format!("{} is in no pool", id)));
            }
        }

        // Slabs outside the active pool hold no allocated blocks
        for id in self.pools.free().chain(self.pools.reserve()) {
            if self.arena.slab(id).used_count() != 0 {
                return Err(Error::invalid_state(format!("pooled {} has allocated blocks", id)));
            }
        }

        // Every owned block is allocated and owned by the key that points at it
        for (addr, key) in self.directory.owned_blocks() {
            if self.arena.slab(addr.slab).is_free(addr.index) {
                return Err(Error::invalid_state(format!("{} is owned but free", addr)));
            }
            if self.directory.get(key) != Some(addr) {
                return Err(Error::invalid_state(format!(
                    "owner of {} does not point at it",
                    addr
                )));
            }
        }

        // Dangling entries only survive a collection that keeps them
        for id in self.arena.ids() {
            for (key, addr) in self.directory.entries_in(id) {
                if self.directory.owner_of(&addr) == Some(key) {
                    continue;
                }
                if purge_on_evict {
                    return Err(Error::invalid_state(format!(
                        "entry for {} is not owned but collection purges",
                        addr
                    )));
                }
            }
        }

        // Every allocated block has exactly one owner
        let used: usize = self.arena.iter().map(|slab| slab.used_count()).sum();
        let owned = self.directory.owned_blocks().count();
        if used != owned {
            return Err(Error::invalid_state(format!(
                "{} blocks allocated, {} owned",
                used, owned
            )));
        }

        // The eviction index covers exactly the active pool
        let eviction = self.pools.eviction();
        if eviction.len() != self.pools.active_len() {
            return Err(Error::invalid_state(format!(
                "eviction index holds {} slabs, {} active",
                eviction.len(),
                self.pools.active_len()
            )));
        }
        for id in self.pools.active() {
            let stamp = eviction.stamp_of(id);
            if stamp != Some(self.arena.slab(id).last_touched()) {
                return Err(Error::invalid_state(format!(
                    "{} indexed at {:?}, last touched {}",
                    id,
                    stamp,
                    self.arena.slab(id).last_touched()
                )));
            }
        }

        Ok(())
    }
}

/// The cache engine handle.
///
/// All operations take `&self`; the mutable engine state sits behind one
/// mutex, so a `SlabCache` can be shared across threads with `Arc<SlabCache<S>>`.
/// Operations run to completion one at a time, including any garbage
/// collection a `put` triggers.
pub struct SlabCache<S: BlockStore> {
    options: Options,
    adapter: BlockAdapter<S>,
    state: Mutex<CacheState>,
}

impl<S: BlockStore> SlabCache<S> {
    /// Create a cache over `store`.
    ///
    /// Every slab starts in the free pool and the pool policy runs once, so
    /// the reserve is already populated when this returns.
    pub fn new(store: S, options: Options) -> Result<Self> {
        options.validate()?;

        let arena = SlabArena::new(
            options.total_slabs as u32,
            options.blocks_per_slab as u32,
            options.channel_count as u32,
        );
        let pools = PoolManager::new(arena.ids());
        let collector = GarbageCollector::new(options.gc_min_threshold, options.purge_on_evict);
        let adapter = BlockAdapter::new(store, options.block_size);

        let mut state = CacheState {
            arena,
            pools,
            directory: Directory::new(),
            collector,
            open_slab: None,
            stats: CacheStats::default(),
            last_rebalance: RebalanceReport::default(),
        };
        state.run_policy(&adapter);

        log::info!(
            "Cache ready: {} slabs x {} blocks x {} bytes (free={}, reserve={})",
            options.total_slabs,
            options.blocks_per_slab,
            options.block_size,
            state.pools.free_len(),
            state.pools.reserve_len()
        );

        Ok(Self { options, adapter, state: Mutex::new(state) })
    }

    /// Store `value` under `key`.
    ///
    /// The value is padded or truncated to the block size. An existing entry
    /// for the key is replaced once the new block is written. If neither the
    /// free nor the reserve pool has a slab after rebalancing, the put is
    /// dropped and the key is left absent.
    ///
    /// # Errors
    ///
    /// A store write failure is returned; the cache is left as it was before
    /// the call.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<PutOutcome> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.run_policy(&self.adapter);

        let Some(slab) = state.write_slab() else {
            if let Some(removed) = state.directory.remove(key) {
                if removed.owned {
                    state.release_block(removed.addr);
                }
            }
            state.stats.dropped_puts += 1;
            log::warn!("No slab available, dropping put of {} bytes", value.len());
            return Ok(PutOutcome::Dropped);
        };

        let now = state.arena.tick();
        let index = state.arena.slab_mut(slab).allocate(now)?;
        state.pools.touch(slab, now);
        let addr = BlockAddr::new(slab, index);

        if let Err(e) = self.adapter.write_block(addr, value) {
            state.release_block(addr);
            return Err(e);
        }

        if let Some(removed) = state.directory.remove(key) {
            if removed.owned {
                state.release_block(removed.addr);
            }
            state.stats.overwrites += 1;
        }
        state.directory.insert(key, addr);
        state.stats.puts += 1;

        Ok(PutOutcome::Stored(addr))
    }

    /// Read the value stored under `key`.
    ///
    /// A hit refreshes the recency of the whole slab holding the key.
    /// Returns a full block-sized value, or `None` on a miss.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();

        let Some(addr) = state.directory.get(key) else {
            state.stats.misses += 1;
            return Ok(None);
        };

        state.touch_slab(addr.slab);
        match self.adapter.read_block(addr)? {
            Some(value) => {
                state.stats.hits += 1;
                Ok(Some(value))
            }
            None => {
                state.stats.misses += 1;
                Ok(None)
            }
        }
    }

    /// Remove `key`, returning whether it was present.
    ///
    /// The block is released but its slab stays active; only garbage
    /// collection returns slabs to the free pool. A failure to delete the
    /// backing record is logged and counted, not returned.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut state = self.state.lock();

        let Some(removed) = state.directory.remove(key) else {
            return Ok(false);
        };

        if removed.owned {
            if let Err(e) = self.adapter.erase_block(removed.addr) {
                log::warn!("Failed to erase {}: {}", removed.addr, e);
                state.stats.store_errors += 1;
            }
            state.release_block(removed.addr);
        }
        state.stats.deletes += 1;

        Ok(true)
    }

    /// Write a batch straight to the backing store.
    ///
    /// Bulk-loaded records bypass slab allocation and the directory, so they
    /// are not visible through [`get`](Self::get). Put values are sized to the
    /// block size. Returns the number of operations written.
    pub fn bulk_load(&self, batch: &WriteBatch) -> Result<usize> {
        let mut state = self.state.lock();
        let written = self.adapter.bulk_load(batch)?;
        state.stats.bulk_loaded += written as u64;
        Ok(written)
    }

    /// Run the pool policy now, collecting garbage if it escalates.
    pub fn trigger_gc(&self) -> RebalanceReport {
        let mut state = self.state.lock();
        state.run_policy(&self.adapter)
    }

    /// Flush the backing store.
    pub fn flush(&self) -> Result<()> {
        let _state = self.state.lock();
        self.adapter.flush()
    }

    /// A copy of the operation counters.
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats.clone()
    }

    /// Zero the operation counters.
    pub fn reset_stats(&self) {
        self.state.lock().stats.reset();
    }

    /// Current pool sizes and watermarks.
    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.state.lock().pools.snapshot()
    }

    /// Report of the most recent policy tick.
    pub fn last_rebalance(&self) -> RebalanceReport {
        self.state.lock().last_rebalance.clone()
    }

    /// Check the engine's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] describing the first violation found.
    pub fn verify_integrity(&self) -> Result<()> {
        self.state.lock().verify(self.options.purge_on_evict)
    }

    /// Free block indices of a slab, in ascending order.
    pub fn slab_free_blocks(&self, slab: SlabId) -> Result<Vec<u32>> {
        let state = self.state.lock();
        if !state.arena.contains(slab) {
            return Err(Error::invalid_argument(format!("Unknown slab: {}", slab)));
        }
        Ok(state.arena.slab(slab).free_blocks().collect())
    }

    /// The pool a slab currently belongs to.
    pub fn pool_of(&self, slab: SlabId) -> Option<Pool> {
        self.state.lock().pools.pool_of(slab)
    }

    /// The block `key` points at, without touching it.
    pub fn lookup(&self, key: &[u8]) -> Option<BlockAddr> {
        self.state.lock().directory.get(key)
    }

    /// Whether `key` has a directory entry.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.state.lock().directory.contains(key)
    }

    /// Number of directory entries.
    pub fn len(&self) -> usize {
        self.state.lock().directory.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().directory.is_empty()
    }

    /// The configuration the cache was created with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        self.adapter.store()
    }
}
