//! Configuration options for the slab cache and its file-backed store.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration options for a [`SlabCache`](crate::SlabCache).
///
/// The slab population and geometry are fixed for the lifetime of a cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Number of slabs carved out of the cache's capacity.
    /// Default: 192
    pub total_slabs: usize,

    /// Number of blocks in every slab.
    /// Default: 128
    pub blocks_per_slab: usize,

    /// Size of a single block in bytes. Values are padded or truncated to it.
    /// Default: 4KB
    pub block_size: usize,

    /// Number of channels slabs are spread over (`index mod channel_count`).
    /// Advisory only, no policy reads it yet.
    /// Default: 12
    pub channel_count: usize,

    /// Minimum number of slabs a single garbage collection pass reclaims.
    /// Default: 2000
    pub gc_min_threshold: usize,

    /// Remove directory entries whose blocks are reclaimed by garbage collection.
    ///
    /// When false, such entries are left dangling and a later `get` reads
    /// whatever the store holds at the recycled block.
    /// Default: true
    pub purge_on_evict: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            total_slabs: 192,
            blocks_per_slab: 128,
            block_size: 4 * 1024, // 4KB
            channel_count: 12,
            gc_min_threshold: 2000,
            purge_on_evict: true,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the slab population.
    pub fn total_slabs(mut self, count: usize) -> Self {
        self.total_slabs = count;
        self
    }

    /// Sets the number of blocks per slab.
    pub fn blocks_per_slab(mut self, count: usize) -> Self {
        self.blocks_per_slab = count;
        self
    }

    /// Sets the block size in bytes.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the channel count.
    pub fn channel_count(mut self, count: usize) -> Self {
        self.channel_count = count;
        self
    }

    /// Sets the floor on slabs reclaimed per garbage collection pass.
    pub fn gc_min_threshold(mut self, count: usize) -> Self {
        self.gc_min_threshold = count;
        self
    }

    /// Enables or disables purging of directory entries on eviction.
    pub fn purge_on_evict(mut self, value: bool) -> Self {
        self.purge_on_evict = value;
        self
    }

    /// Total number of blocks managed by the cache.
    pub fn capacity_blocks(&self) -> usize {
        self.total_slabs * self.blocks_per_slab
    }

    /// Parses options from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let options: Options = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serializes the options as pretty-printed JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.total_slabs == 0 {
            return Err(crate::Error::invalid_argument("total_slabs must be > 0"));
        }
        if self.total_slabs > u32::MAX as usize {
            return Err(crate::Error::invalid_argument("total_slabs must fit in a u32"));
        }
        if self.blocks_per_slab == 0 {
            return Err(crate::Error::invalid_argument("blocks_per_slab must be > 0"));
        }
        if self.blocks_per_slab > u32::MAX as usize {
            return Err(crate::Error::invalid_argument("blocks_per_slab must fit in a u32"));
        }
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        if self.channel_count == 0 {
            return Err(crate::Error::invalid_argument("channel_count must be > 0"));
        }
        if self.channel_count > u32::MAX as usize {
            return Err(crate::Error::invalid_argument("channel_count must fit in a u32"));
        }
        if self.gc_min_threshold == 0 {
            return Err(crate::Error::invalid_argument("gc_min_threshold must be > 0"));
        }
        Ok(())
    }
}

/// Compression algorithms supported by the file-backed block store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    None = 0,

    /// Snappy compression (fast, moderate compression ratio).
    #[cfg(feature = "snappy")]
    Snappy = 1,

    /// LZ4 compression (very fast, lower compression ratio).
    #[cfg(feature = "lz4-compression")]
    Lz4 = 2,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "snappy")]
            1 => Some(CompressionType::Snappy),
            #[cfg(feature = "lz4-compression")]
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "snappy")]
        return CompressionType::Snappy;

        #[cfg(not(feature = "snappy"))]
        CompressionType::None
    }
}

/// Configuration options for a [`FileStore`](crate::store::FileStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Create the store directory if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// fsync the log after every write.
    /// Default: false
    pub sync_writes: bool,

    /// Compression applied to stored values.
    /// Default: CompressionType::Snappy when the `snappy` feature is enabled
    pub compression: CompressionType,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_writes: false,
            compression: CompressionType::default(),
        }
    }
}

impl StoreOptions {
    /// Creates a new StoreOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether every write is synced to disk.
    pub fn sync_writes(mut self, value: bool) -> Self {
        self.sync_writes = value;
        self
    }

    /// Sets the compression algorithm.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }
}
