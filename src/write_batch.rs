//! WriteBatch groups raw store writes for the bulk-load path.
//!
//! A batch is handed to [`SlabCache::bulk_load`](crate::SlabCache::bulk_load),
//! which writes it straight to the backing store in one call. Bulk-loaded
//! records bypass slab allocation and the directory: they are not visible to
//! `get` until a caller reconciles them separately.
//!
//! # Example
//!
//! ```
//! use slabcache::store::MemoryStore;
//! use slabcache::{Options, SlabCache, WriteBatch};
//!
//! # fn main() -> Result<(), slabcache::Error> {
//! let cache = SlabCache::new(MemoryStore::new(), Options::default())?;
//! let mut batch = WriteBatch::new();
//! batch.put(b"ingest:1", b"payload");
//! batch.put(b"ingest:2", b"payload");
//!
//! cache.bulk_load(&batch)?;
//! assert_eq!(cache.get(b"ingest:1")?, None);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;

/// Type of write operation in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Store a value under a raw store key
    Put {
        /// Store key
        key: Vec<u8>,
        /// Value, sized to the block size when loaded
        value: Vec<u8>,
    },
    /// Remove a raw store key
    Delete {
        /// Store key
        key: Vec<u8>,
    },
}

/// An ordered sequence of raw store writes.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    operations: VecDeque<WriteOp>,
    approximate_size: usize,
}

impl WriteBatch {
    /// Creates a new empty WriteBatch.
    pub fn new() -> Self {
        Self { operations: VecDeque::new(), approximate_size: 0 }
    }

    /// Adds a Put operation to the batch.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.approximate_size += key.len() + value.len() + 8;
        self.operations.push_back(WriteOp::Put { key: key.to_vec(), value: value.to_vec() });
    }

    /// Adds a Delete operation to the batch.
    pub fn delete(&mut self, key: &[u8]) {
        self.approximate_size += key.len() + 4;
        self.operations.push_back(WriteOp::Delete { key: key.to_vec() });
    }

    /// Clears all operations from the batch.
    pub fn clear(&mut self) {
        self.operations.clear();
        self.approximate_size = 0;
    }

    /// Returns the number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the approximate encoded size of the batch in bytes.
    pub fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    /// Returns an iterator over the operations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &WriteOp> {
        self.operations.iter()
    }
}

impl<K: AsRef<[u8]>, V: AsRef<[u8]>> FromIterator<(K, V)> for WriteBatch {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut batch = WriteBatch::new();
        for (key, value) in iter {
            batch.put(key.as_ref(), value.as_ref());
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_batch_mixed_operations() {
        let mut batch = WriteBatch::new();
        assert!(batch.is_empty());

        batch.put(b"key1", b"value1");
        batch.delete(b"key2");
        batch.put(b"key3", b"value3");

        assert_eq!(batch.len(), 3);
        assert!(batch.approximate_size() > 0);

        let ops: Vec<_> = batch.iter().collect();
        match &ops[1] {
            WriteOp::Delete { key } => assert_eq!(key, b"key2"),
            _ => panic!("Expected Delete operation"),
        }
    }

    #[test]
    fn test_write_batch_clear() {
        let mut batch = WriteBatch::new();
        batch.put(b"key1", b"value1");
        batch.clear();

        assert!(batch.is_empty());
        assert_eq!(batch.approximate_size(), 0);
    }

    #[test]
    fn test_write_batch_from_pairs() {
        let batch: WriteBatch = (0..4).map(|i| (format!("k{}", i), vec![i as u8])).collect();
        assert_eq!(batch.len(), 4);
        match batch.iter().last() {
            Some(WriteOp::Put { key, value }) => {
                assert_eq!(key, b"k3");
                assert_eq!(value, &vec![3u8]);
            }
            other => panic!("Expected Put operation, got {:?}", other),
        }
    }
}
