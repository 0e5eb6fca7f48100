//! Eviction order over active slabs, oldest stamp first.

use crate::slab::SlabId;
use std::collections::{BTreeMap, HashMap};

/// Orders slabs by their last-touched stamp.
///
/// Each slab appears at most once: [`touch`](Self::touch) removes the slab's
/// previous entry before inserting the new one, so stale stamps never linger.
#[derive(Debug, Default)]
pub struct EvictionIndex {
    by_stamp: BTreeMap<u64, SlabId>,
    stamps: HashMap<SlabId, u64>,
}

impl EvictionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `slab` as touched at `stamp`, replacing any earlier entry.
    pub fn touch(&mut self, slab: SlabId, stamp: u64) {
        if let Some(old) = self.stamps.insert(slab, stamp) {
            self.by_stamp.remove(&old);
        }
        let displaced = self.by_stamp.insert(stamp, slab);
        debug_assert!(displaced.is_none(), "stamp {} reused", stamp);
    }

    /// Drop `slab` from the index. Returns its stamp if it was present.
    pub fn remove(&mut self, slab: SlabId) -> Option<u64> {
        let stamp = self.stamps.remove(&slab)?;
        self.by_stamp.remove(&stamp);
        Some(stamp)
    }

    /// Remove and return the least recently touched slab.
    pub fn pop_oldest(&mut self) -> Option<SlabId> {
        let (_, slab) = self.by_stamp.pop_first()?;
        self.stamps.remove(&slab);
        Some(slab)
    }

    /// The stamp recorded for `slab`.
    pub fn stamp_of(&self, slab: SlabId) -> Option<u64> {
        self.stamps.get(&slab).copied()
    }

    /// Whether `slab` is indexed.
    pub fn contains(&self, slab: SlabId) -> bool {
        self.stamps.contains_key(&slab)
    }

    /// Number of indexed slabs.
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_oldest_order() {
        let mut index = EvictionIndex::new();
        index.touch(SlabId::new(3), 5);
        index.touch(SlabId::new(1), 2);
        index.touch(SlabId::new(2), 9);

        assert_eq!(index.pop_oldest(), Some(SlabId::new(1)));
        assert_eq!(index.pop_oldest(), Some(SlabId::new(3)));
        assert_eq!(index.pop_oldest(), Some(SlabId::new(2)));
        assert_eq!(index.pop_oldest(), None);
    }

    #[test]
    fn test_touch_replaces_previous_entry() {
        let mut index = EvictionIndex::new();
        index.touch(SlabId::new(0), 1);
        index.touch(SlabId::new(1), 2);
        index.touch(SlabId::new(0), 3);

        assert_eq!(index.len(), 2);
        assert_eq!(index.stamp_of(SlabId::new(0)), Some(3));
        assert_eq!(index.pop_oldest(), Some(SlabId::new(1)));
    }

    #[test]
    fn test_remove() {
        let mut index = EvictionIndex::new();
        index.touch(SlabId::new(0), 1);
        assert_eq!(index.remove(SlabId::new(0)), Some(1));
        assert_eq!(index.remove(SlabId::new(0)), None);
        assert!(index.is_empty());
        assert_eq!(index.pop_oldest(), None);
    }
}
