//! The persistent block store behind the cache.
//!
//! The cache only needs put/get/delete of opaque values by string key from
//! its backing store; durability, batching and compression are the store's
//! business. [`BlockStore`] is that contract, and [`BlockAdapter`] sits on the
//! cache's side of it to apply the fixed block size and build the composite
//! `slab_<n>:<index>` keys.
//!
//! Two stores ship with the crate:
//!
//! - [`MemoryStore`]: a hash map, for tests and ephemeral caches
//! - [`FileStore`]: an append-only checksummed log with crash recovery

mod file;
mod memory;
mod record;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::slab::BlockAddr;
use crate::write_batch::{WriteBatch, WriteOp};
use std::sync::Arc;

/// A persistent key-value store the cache writes its blocks to.
///
/// Implementations must be safe to call from any thread; the cache holds its
/// own lock around every call, so no call overlaps another on the same cache.
pub trait BlockStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Fetch the value under `key`. A missing key is `Ok(None)`, never an error.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Remove `key`. Removing a missing key succeeds.
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Apply a batch of writes.
    ///
    /// The default applies operations one at a time; stores that can write a
    /// batch atomically should override it.
    fn write_batch(&self, batch: &WriteBatch) -> Result<()> {
        for op in batch.iter() {
            match op {
                WriteOp::Put { key, value } => self.put(key, value)?,
                WriteOp::Delete { key } => self.delete(key)?,
            }
        }
        Ok(())
    }

    /// Make previous writes durable.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

impl<S: BlockStore + ?Sized> BlockStore for Arc<S> {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        (**self).delete(key)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<()> {
        (**self).write_batch(batch)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// Pad `value` with zeros, or truncate it, to exactly `block_size` bytes.
pub fn pad_or_truncate(value: &[u8], block_size: usize) -> Vec<u8> {
    let mut block = value[..value.len().min(block_size)].to_vec();
    block.resize(block_size, 0);
    block
}

/// Fixed-size block I/O on top of a [`BlockStore`].
#[derive(Debug)]
pub struct BlockAdapter<S> {
    store: S,
    block_size: usize,
}

impl<S: BlockStore> BlockAdapter<S> {
    /// Wrap `store`, sizing every value to `block_size` bytes.
    pub fn new(store: S, block_size: usize) -> Self {
        Self { store, block_size }
    }

    /// Write `value` into the block at `addr`.
    pub fn write_block(&self, addr: BlockAddr, value: &[u8]) -> Result<()> {
        let block = pad_or_truncate(value, self.block_size);
        self.store.put(addr.store_key().as_bytes(), &block)
    }

    /// Read the block at `addr`, always `block_size` bytes when present.
    pub fn read_block(&self, addr: BlockAddr) -> Result<Option<Vec<u8>>> {
        let value = self.store.get(addr.store_key().as_bytes())?;
        Ok(value.map(|v| pad_or_truncate(&v, self.block_size)))
    }

    /// Delete the record backing the block at `addr`.
    pub fn erase_block(&self, addr: BlockAddr) -> Result<()> {
        self.store.delete(addr.store_key().as_bytes())
    }

    /// Write a batch straight to the store, sizing every put value.
    ///
    /// Returns the number of operations written.
    pub fn bulk_load(&self, batch: &WriteBatch) -> Result<usize> {
        let mut sized = WriteBatch::new();
        for op in batch.iter() {
            match op {
                WriteOp::Put { key, value } => {
                    sized.put(key, &pad_or_truncate(value, self.block_size))
                }
                WriteOp::Delete { key } => sized.delete(key),
            }
        }
        self.store.write_batch(&sized)?;
        Ok(sized.len())
    }

    /// Flush the underlying store.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// The configured block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The wrapped store.
    pub fn store(&self) -> &S {
        &self.store
    }
}
