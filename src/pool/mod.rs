//! Free / active / reserve pool management.
//!
//! Every slab id sits in exactly one of three pools:
//!
//! - **free**: available for allocation, FIFO
//! - **active**: taken for writes and holding (or having held) live blocks
//! - **reserve**: held back from the free pool to absorb pressure spikes, FIFO
//!
//! [`PoolManager::rebalance`] is the adaptive policy tick run before every
//! allocation. It adjusts the [`Watermarks`], drains surplus free slabs into
//! the reserve, refills the free pool from the reserve under pressure, and
//! reports whether garbage collection must run. The collector itself needs the
//! directory and the store, so the caller runs it.

mod eviction;
mod watermark;

pub use eviction::EvictionIndex;
pub use watermark::{Adjustment, Watermarks};

use crate::gc::GcReport;
use crate::slab::SlabId;
use crate::stats::PoolSnapshot;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

/// The pool a slab currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pool {
    /// Available for allocation
    Free,
    /// Serving or holding writes
    Active,
    /// Held back as a buffer
    Reserve,
}

/// What a single policy tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebalanceReport {
    /// Threshold movement, `None` only for a default-constructed report
    pub adjustment: Option<Adjustment>,
    /// Low watermark after adaptation
    pub low_watermark: usize,
    /// High watermark after adaptation
    pub high_watermark: usize,
    /// Slabs moved from free to reserve
    pub drained: usize,
    /// Slabs moved from reserve to free
    pub refilled: usize,
    /// Free pool size when the escalation condition was evaluated
    pub free_at_escalation: usize,
    /// Reserve pool size when the escalation condition was evaluated
    pub reserve_at_escalation: usize,
    /// Whether garbage collection was requested
    pub escalated: bool,
    /// Outcome of the collection pass, filled in by the caller that ran it
    pub gc: Option<GcReport>,
}

/// Owns the three pools, the watermarks and the eviction index.
#[derive(Debug)]
pub struct PoolManager {
    total_slabs: usize,
    free: VecDeque<SlabId>,
    active: BTreeSet<SlabId>,
    reserve: VecDeque<SlabId>,
    watermarks: Watermarks,
    eviction: EvictionIndex,
}

impl PoolManager {
    /// Create a manager with every slab in the free pool.
    pub fn new(slabs: impl IntoIterator<Item = SlabId>) -> Self {
        let free: VecDeque<SlabId> = slabs.into_iter().collect();
        let total_slabs = free.len();
        Self {
            total_slabs,
            free,
            active: BTreeSet::new(),
            reserve: VecDeque::new(),
            watermarks: Watermarks::new(total_slabs),
            eviction: EvictionIndex::new(),
        }
    }

    /// Run one policy tick against the persisted watermarks.
    pub fn rebalance(&mut self) -> RebalanceReport {
        let adjustment = self.watermarks.adapt(self.free.len());
        if adjustment != Adjustment::Held {
            log::debug!(
                "Watermarks {:?}: low={} high={} (free={})",
                adjustment,
                self.watermarks.low(),
                self.watermarks.high(),
                self.free.len()
            );
        }

        let mut drained = 0;
        while self.watermarks.should_drain(self.free.len())
            && self.reserve.len() < self.watermarks.reserve_cap()
        {
            match self.free.pop_front() {
                Some(slab) => {
                    self.reserve.push_back(slab);
                    drained += 1;
                }
                None => break,
            }
        }

        let mut refilled = 0;
        while self.watermarks.below_low(self.free.len()) {
            match self.reserve.pop_front() {
                Some(slab) => {
                    self.free.push_back(slab);
                    refilled += 1;
                }
                None => break,
            }
        }

        if drained > 0 || refilled > 0 {
            log::debug!("Reserve moves: drained={} refilled={}", drained, refilled);
        }

        let escalated =
            self.reserve.is_empty() && self.watermarks.should_escalate(self.free.len());

        RebalanceReport {
            adjustment: Some(adjustment),
            low_watermark: self.watermarks.low(),
            high_watermark: self.watermarks.high(),
            drained,
            refilled,
            free_at_escalation: self.free.len(),
            reserve_at_escalation: self.reserve.len(),
            escalated,
            gc: None,
        }
    }

    /// Move the front free slab into the active pool.
    pub fn take_free(&mut self) -> Option<SlabId> {
        let slab = self.free.pop_front()?;
        self.active.insert(slab);
        Some(slab)
    }

    /// Move the front reserve slab straight into the active pool.
    ///
    /// Used when a write finds the free pool empty after rebalancing.
    pub fn take_reserve(&mut self) -> Option<SlabId> {
        let slab = self.reserve.pop_front()?;
        self.active.insert(slab);
        Some(slab)
    }

    /// Return a reclaimed active slab to the back of the free pool.
    pub fn retire(&mut self, slab: SlabId) {
        self.eviction.remove(slab);
        if self.active.remove(&slab) {
            self.free.push_back(slab);
        } else {
            debug_assert!(false, "retiring {} which is not active", slab);
        }
    }

    /// Record a touch of `slab` at `stamp` in the eviction index.
    ///
    /// Only active slabs are indexed; touches of other slabs are ignored.
    pub fn touch(&mut self, slab: SlabId, stamp: u64) {
        if self.active.contains(&slab) {
            self.eviction.touch(slab, stamp);
        }
    }

    /// Remove and return the least recently touched active slab.
    pub fn pop_victim(&mut self) -> Option<SlabId> {
        self.eviction.pop_oldest()
    }

    /// The pool `slab` belongs to, if any.
    pub fn pool_of(&self, slab: SlabId) -> Option<Pool> {
        if self.active.contains(&slab) {
            Some(Pool::Active)
        } else if self.free.contains(&slab) {
            Some(Pool::Free)
        } else if self.reserve.contains(&slab) {
            Some(Pool::Reserve)
        } else {
            None
        }
    }

    /// Whether `slab` is in the active pool.
    pub fn is_active(&self, slab: SlabId) -> bool {
        self.active.contains(&slab)
    }

    /// Free slab ids in FIFO order.
    pub fn free(&self) -> impl Iterator<Item = SlabId> + '_ {
        self.free.iter().copied()
    }

    /// Active slab ids in id order.
    pub fn active(&self) -> impl Iterator<Item = SlabId> + '_ {
        self.active.iter().copied()
    }

    /// Reserve slab ids in FIFO order.
    pub fn reserve(&self) -> impl Iterator<Item = SlabId> + '_ {
        self.reserve.iter().copied()
    }

    /// Number of free slabs.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Number of active slabs.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Number of reserve slabs.
    pub fn reserve_len(&self) -> usize {
        self.reserve.len()
    }

    /// The eviction index.
    pub fn eviction(&self) -> &EvictionIndex {
        &self.eviction
    }

    /// The current watermarks.
    pub fn watermarks(&self) -> &Watermarks {
        &self.watermarks
    }

    /// Point-in-time pool sizes and thresholds.
    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            free: self.free.len(),
            active: self.active.len(),
            reserve: self.reserve.len(),
            low_watermark: self.watermarks.low(),
            high_watermark: self.watermarks.high(),
            total_slabs: self.total_slabs,
        }
    }
}
