//! The cache directory: where each key's data lives.
//!
//! Besides the key → block mapping the directory records which key owns each
//! block. Garbage collection uses that reverse mapping to find the entries a
//! reclaimed slab invalidates, and `delete`/overwrite use it to avoid
//! releasing a block that has since been recycled for another key.

use crate::slab::{BlockAddr, SlabId};
use std::collections::HashMap;

/// Result of removing a key from the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removed {
    /// Block the entry pointed at
    pub addr: BlockAddr,
    /// Whether the key still owned that block. False for dangling entries
    /// left behind by garbage collection.
    pub owned: bool,
}

/// Mapping from logical key to block address.
#[derive(Debug, Default)]
pub struct Directory {
    entries: HashMap<Vec<u8>, BlockAddr>,
    owners: HashMap<BlockAddr, Vec<u8>>,
}

impl Directory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the block a key points at.
    pub fn get(&self, key: &[u8]) -> Option<BlockAddr> {
        self.entries.get(key).copied()
    }

    /// Whether the key has an entry.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Point `key` at `addr`, making it the block's owner.
    ///
    /// Callers remove any previous entry for the key first, so the previous
    /// block can be released.
    pub fn insert(&mut self, key: &[u8], addr: BlockAddr) {
        debug_assert!(!self.entries.contains_key(key), "insert over a live entry");
        self.entries.insert(key.to_vec(), addr);
        self.owners.insert(addr, key.to_vec());
    }

    /// Remove the entry for `key`.
    pub fn remove(&mut self, key: &[u8]) -> Option<Removed> {
        let addr = self.entries.remove(key)?;
        let owned = match self.owners.get(&addr) {
            Some(owner) if owner.as_slice() == key => {
                self.owners.remove(&addr);
                true
            }
            _ => false,
        };
        Some(Removed { addr, owned })
    }

    /// The key that currently owns a block, if any.
    pub fn owner_of(&self, addr: &BlockAddr) -> Option<&[u8]> {
        self.owners.get(addr).map(Vec::as_slice)
    }

    /// Drop ownership of a block that is being reclaimed.
    ///
    /// With `purge` the owning key's entry is removed as well; otherwise it is
    /// left pointing at the reclaimed block. Returns true if an entry was purged.
    pub fn reclaim(&mut self, addr: &BlockAddr, purge: bool) -> bool {
        match self.owners.remove(addr) {
            Some(key) if purge => self.entries.remove(&key).is_some(),
            _ => false,
        }
    }

    /// Entries whose block lives in `slab`, including dangling ones.
    pub fn entries_in(&self, slab: SlabId) -> impl Iterator<Item = (&[u8], BlockAddr)> + '_ {
        self.entries
            .iter()
            .filter(move |(_, addr)| addr.slab == slab)
            .map(|(key, addr)| (key.as_slice(), *addr))
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], BlockAddr)> + '_ {
        self.entries.iter().map(|(key, addr)| (key.as_slice(), *addr))
    }

    /// Iterate over all owned blocks with their owning key.
    pub fn owned_blocks(&self) -> impl Iterator<Item = (BlockAddr, &[u8])> + '_ {
        self.owners.iter().map(|(addr, key)| (*addr, key.as_slice()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
