//! File-backed block store.
//!
//! Writes are appended to a single checksummed log inside the store directory
//! and mirrored in an in-memory index, so reads never touch the disk. On open
//! the log is replayed to rebuild the index; a torn or corrupt tail is cut off
//! at the last good record. [`FileStore::compact`] rewrites the log with only
//! the live records.

use super::record::{self, LogEntry};
use super::BlockStore;
use crate::config::{CompressionType, StoreOptions};
use crate::error::{Error, Result};
use crate::write_batch::{WriteBatch, WriteOp};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const LOG_FILENAME: &str = "blocks.log";
const COMPACT_FILENAME: &str = "blocks.log.compact";

struct LogWriter {
    writer: BufWriter<File>,
    size: u64,
}

impl LogWriter {
    fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { writer: BufWriter::new(file), size })
    }

    fn append(&mut self, encoded: &[u8]) -> Result<()> {
        self.writer.write_all(encoded)?;
        self.size += encoded.len() as u64;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// A persistent [`BlockStore`] built on an append-only log.
pub struct FileStore {
    dir: PathBuf,
    options: StoreOptions,
    log: Mutex<LogWriter>,
    index: RwLock<HashMap<Vec<u8>, Bytes>>,
}

impl FileStore {
    /// Open the store in directory `path`, replaying any existing log.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is missing and `create_if_missing`
    /// is off, or on I/O failure. Corruption at the tail of the log is not an
    /// error: replay stops at the last good record and the tail is discarded.
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();
        if !dir.exists() {
            if options.create_if_missing {
                fs::create_dir_all(&dir)?;
            } else {
                return Err(Error::invalid_argument(format!(
                    "Store directory does not exist: {:?}",
                    dir
                )));
            }
        }

        let log_path = dir.join(LOG_FILENAME);
        let index = if log_path.exists() { Self::recover(&log_path)? } else { HashMap::new() };
        let writer = LogWriter::open(&log_path)?;

        log::info!(
            "Opened block store {:?}: {} records, {} log bytes",
            dir,
            index.len(),
            writer.size
        );

        Ok(Self { dir, options, log: Mutex::new(writer), index: RwLock::new(index) })
    }

    /// Replay the log into a fresh index, truncating a damaged tail.
    fn recover(log_path: &Path) -> Result<HashMap<Vec<u8>, Bytes>> {
        let file = File::open(log_path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut index = HashMap::new();
        let mut good_offset = 0u64;

        loop {
            match record::read_next(&mut reader) {
                Ok(Some((entry, size))) => {
                    match entry {
                        LogEntry::Put { key, value, compression } => {
                            let value = decompress(compression, &value)?;
                            index.insert(key, Bytes::from(value));
                        }
                        LogEntry::Delete { key } => {
                            index.remove(&key);
                        }
                    }
                    good_offset += size as u64;
                }
                Ok(None) => break,
                Err(e @ (Error::Corruption(_) | Error::ChecksumMismatch { .. })) => {
                    log::warn!(
                        "Block log corruption at offset {}: {}; discarding {} tail bytes",
                        good_offset,
                        e,
                        file_len - good_offset
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if good_offset < file_len {
            let file = OpenOptions::new().write(true).open(log_path)?;
            file.set_len(good_offset)?;
            file.sync_all()?;
        }

        Ok(index)
    }

    fn put_entry(&self, key: &[u8], value: &[u8]) -> Result<LogEntry> {
        let compression = self.options.compression;
        Ok(LogEntry::Put {
            key: key.to_vec(),
            value: compress(compression, value)?,
            compression: compression as u8,
        })
    }

    fn append(&self, writer: &mut LogWriter, encoded: &[u8]) -> Result<()> {
        writer.append(encoded)?;
        if self.options.sync_writes {
            writer.sync()?;
        }
        Ok(())
    }

    /// Rewrite the log so it holds exactly one record per live key.
    ///
    /// Returns the number of bytes reclaimed.
    pub fn compact(&self) -> Result<u64> {
        let mut writer = self.log.lock();
        let index = self.index.read();

        let compact_path = self.dir.join(COMPACT_FILENAME);
        let mut size = 0u64;
        {
            let mut out = BufWriter::new(File::create(&compact_path)?);
            for (key, value) in index.iter() {
                let encoded = record::encode(&self.put_entry(key, value)?)?;
                out.write_all(&encoded)?;
                size += encoded.len() as u64;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }

        writer.sync()?;
        let log_path = self.dir.join(LOG_FILENAME);
        fs::rename(&compact_path, &log_path)?;
        let before = writer.size;
        *writer = LogWriter::open(&log_path)?;

        log::info!("Compacted block log: {} -> {} bytes", before, size);
        Ok(before.saturating_sub(size))
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Current size of the log file in bytes.
    pub fn log_size(&self) -> u64 {
        self.log.lock().size
    }

    /// The store directory.
    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl BlockStore for FileStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let encoded = record::encode(&self.put_entry(key, value)?)?;
        let mut writer = self.log.lock();
        self.append(&mut writer, &encoded)?;
        self.index.write().insert(key.to_vec(), Bytes::copy_from_slice(value));
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.index.read().get(key).map(|v| v.to_vec()))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let encoded = record::encode(&LogEntry::Delete { key: key.to_vec() })?;
        let mut writer = self.log.lock();
        self.append(&mut writer, &encoded)?;
        self.index.write().remove(key);
        Ok(())
    }

    /// Encodes the whole batch before writing, so an encoding failure leaves
    /// the store untouched.
    fn write_batch(&self, batch: &WriteBatch) -> Result<()> {
        let mut encoded = Vec::with_capacity(batch.approximate_size());
        for op in batch.iter() {
            let entry = match op {
                WriteOp::Put { key, value } => self.put_entry(key, value)?,
                WriteOp::Delete { key } => LogEntry::Delete { key: key.clone() },
            };
            encoded.extend(record::encode(&entry)?);
        }

        let mut writer = self.log.lock();
        self.append(&mut writer, &encoded)?;

        let mut index = self.index.write();
        for op in batch.iter() {
            match op {
                WriteOp::Put { key, value } => {
                    index.insert(key.clone(), Bytes::copy_from_slice(value));
                }
                WriteOp::Delete { key } => {
                    index.remove(key);
                }
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.log.lock().sync()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best effort flush on drop
        let _ = self.log.get_mut().writer.flush();
    }
}

fn compress(compression: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| Error::store(format!("Compression failed: {}", e))),
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::compress(data, None, true)
            .map_err(|e| Error::store(format!("Compression failed: {}", e))),
    }
}

fn decompress(tag: u8, data: &[u8]) -> Result<Vec<u8>> {
    let compression = CompressionType::from_u8(tag)
        .ok_or_else(|| Error::corruption(format!("Unsupported compression type: {}", tag)))?;

    match compression {
        CompressionType::None => Ok(data.to_vec()),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::corruption(format!("Decompression failed: {}", e))),
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::decompress(data, None)
            .map_err(|e| Error::corruption(format!("Decompression failed: {}", e))),
    }
}
