//! Error types for the slab cache.

use crate::slab::SlabId;
use std::io;
use thiserror::Error;

/// The result type used throughout slabcache.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for slab cache operations.
///
/// Misses and dropped writes are not errors; they are reported through
/// `Option` and [`PutOutcome`](crate::PutOutcome) respectively.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred in a file-backed store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption was detected while reading persisted records.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The expected checksum value.
        expected: u32,
        /// The actual checksum value.
        actual: u32,
    },

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The cache bookkeeping is in an inconsistent state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Allocation was attempted on a slab with no free block.
    #[error("Slab full: {0}")]
    SlabFull(SlabId),

    /// The backing block store rejected an operation.
    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a new store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Error::Store(msg.into())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
