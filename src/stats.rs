//! Read-only diagnostics: operation counters and pool snapshots.
//!
//! None of these values take part in the cache's correctness; they exist so
//! callers can watch hit rates and pool pressure.

use serde::Serialize;

/// Counters accumulated over the lifetime of a cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Successful reads
    pub hits: u64,
    /// Reads of absent keys, or of entries whose block the store no longer holds
    pub misses: u64,
    /// Writes that were stored
    pub puts: u64,
    /// Stored writes that replaced an existing entry
    pub overwrites: u64,
    /// Writes dropped because no slab was available
    pub dropped_puts: u64,
    /// Deletes of present keys
    pub deletes: u64,
    /// Records written through the bulk-load path
    pub bulk_loaded: u64,
    /// Writes that took a slab straight from the reserve pool
    pub reserve_draws: u64,
    /// Garbage collection passes
    pub gc_runs: u64,
    /// Slabs returned to the free pool by garbage collection
    pub slabs_reclaimed: u64,
    /// Blocks released by garbage collection
    pub blocks_reclaimed: u64,
    /// Directory entries removed because their block was reclaimed
    pub entries_purged: u64,
    /// Store failures that were logged instead of propagated
    pub store_errors: u64,
}

impl CacheStats {
    /// Total number of reads.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate the hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups();
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }

    /// Reset all counters to zero
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Point-in-time view of the pools and watermarks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    /// Slabs in the free pool
    pub free: usize,
    /// Slabs in the active pool
    pub active: usize,
    /// Slabs in the reserve pool
    pub reserve: usize,
    /// Current low watermark
    pub low_watermark: usize,
    /// Current high watermark
    pub high_watermark: usize,
    /// Fixed slab population
    pub total_slabs: usize,
}

impl PoolSnapshot {
    /// Sum of the three pool sizes; equals `total_slabs` when bookkeeping is sound.
    pub fn pooled(&self) -> usize {
        self.free + self.active + self.reserve
    }
}
