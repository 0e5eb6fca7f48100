//! Slabs: fixed-capacity bundles of equal-size blocks.
//!
//! A slab is the unit of eviction, a block is the unit of allocation. All
//! slabs live in a [`SlabArena`] that is created once and never resized; the
//! pools, the eviction index and the directory refer to slabs by [`SlabId`].
//!
//! Recency is measured with a logical clock owned by the arena rather than a
//! wall clock, so every stamp is unique and totally ordered.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identifier of a slab, an index into the [`SlabArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlabId(u32);

impl SlabId {
    /// Create a slab id from its arena index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Arena index of this slab.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slab_{}", self.0)
    }
}

/// Physical location of a block: a slab and a block index inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockAddr {
    /// Slab holding the block
    pub slab: SlabId,
    /// Block index within the slab
    pub index: u32,
}

impl BlockAddr {
    /// Create a new block address.
    pub fn new(slab: SlabId, index: u32) -> Self {
        Self { slab, index }
    }

    /// Composite key under which the block is persisted, `slab_<n>:<index>`.
    pub fn store_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BlockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.slab, self.index)
    }
}

/// A fixed-capacity bag of block indices with a free/used partition.
#[derive(Debug, Clone)]
pub struct Slab {
    id: SlabId,
    /// Advisory channel label, `index mod channel_count`
    channel: u32,
    capacity: u32,
    /// Ordered so allocation is lowest-index-first
    free_blocks: BTreeSet<u32>,
    last_touched: u64,
}

impl Slab {
    /// Create a slab with every block free.
    pub fn new(id: SlabId, channel: u32, capacity: u32) -> Self {
        Self { id, channel, capacity, free_blocks: (0..capacity).collect(), last_touched: 0 }
    }

    /// Allocate the lowest free block index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SlabFull`] when no block is free.
    pub fn allocate(&mut self, now: u64) -> Result<u32> {
        let index = self.free_blocks.pop_first().ok_or(Error::SlabFull(self.id))?;
        self.last_touched = now;
        Ok(index)
    }

    /// Return a block to the free set.
    ///
    /// Releasing an index that is already free is a caller bug; the directory
    /// ownership checks keep it from happening.
    pub fn release(&mut self, index: u32, now: u64) {
        debug_assert!(index < self.capacity, "block {} out of range for {}", index, self.id);
        let inserted = self.free_blocks.insert(index);
        debug_assert!(inserted, "double release of {}:{}", self.id, index);
        self.last_touched = now;
    }

    /// Refresh the recency stamp without changing the allocation state.
    pub fn touch(&mut self, now: u64) {
        self.last_touched = now;
    }

    /// The slab's identifier.
    pub fn id(&self) -> SlabId {
        self.id
    }

    /// The slab's channel label.
    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Total number of blocks in the slab.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Logical timestamp of the last mutation or touch.
    pub fn last_touched(&self) -> u64 {
        self.last_touched
    }

    /// Whether `index` is currently unallocated.
    pub fn is_free(&self, index: u32) -> bool {
        self.free_blocks.contains(&index)
    }

    /// Number of unallocated blocks.
    pub fn free_count(&self) -> usize {
        self.free_blocks.len()
    }

    /// Number of allocated blocks.
    pub fn used_count(&self) -> usize {
        self.capacity as usize - self.free_blocks.len()
    }

    /// Whether at least one block can still be allocated.
    pub fn has_free(&self) -> bool {
        !self.free_blocks.is_empty()
    }

    /// The free block indices in ascending order.
    pub fn free_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.free_blocks.iter().copied()
    }

    /// The allocated block indices in ascending order.
    pub fn used_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.capacity).filter(move |i| !self.free_blocks.contains(i))
    }
}

/// Single owner of every slab, plus the logical clock used for recency.
#[derive(Debug)]
pub struct SlabArena {
    slabs: Vec<Slab>,
    clock: u64,
}

impl SlabArena {
    /// Create `total_slabs` empty slabs of `blocks_per_slab` blocks each.
    pub fn new(total_slabs: u32, blocks_per_slab: u32, channel_count: u32) -> Self {
        let slabs = (0..total_slabs)
            .map(|i| Slab::new(SlabId::new(i), i % channel_count, blocks_per_slab))
            .collect();
        Self { slabs, clock: 0 }
    }

    /// Advance the logical clock and return the new stamp.
    pub fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up a slab.
    ///
    /// Ids are only minted by the arena itself, so indexing cannot fail.
    pub fn slab(&self, id: SlabId) -> &Slab {
        &self.slabs[id.index()]
    }

    /// Look up a slab mutably.
    pub fn slab_mut(&mut self, id: SlabId) -> &mut Slab {
        &mut self.slabs[id.index()]
    }

    /// Whether `id` refers to a slab of this arena.
    pub fn contains(&self, id: SlabId) -> bool {
        id.index() < self.slabs.len()
    }

    /// Iterate over the slab ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = SlabId> + '_ {
        self.slabs.iter().map(Slab::id)
    }

    /// Iterate over the slabs in arena order.
    pub fn iter(&self) -> impl Iterator<Item = &Slab> {
        self.slabs.iter()
    }

    /// Number of slabs.
    pub fn len(&self) -> usize {
        self.slabs.len()
    }

    /// Whether the arena holds no slabs.
    pub fn is_empty(&self) -> bool {
        self.slabs.is_empty()
    }
}
