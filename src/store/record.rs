//! Log record framing for the file-backed block store.
//!
//! Each record consists of:
//! - Checksum (4 bytes): CRC32 of the payload
//! - Length (4 bytes): Length of the payload
//! - Payload (variable): bincode-encoded [`LogEntry`]

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};

/// Size of the record header (checksum + length)
pub const HEADER_SIZE: usize = 8;

/// Upper bound on a single payload, guards against reading garbage lengths
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEntry {
    /// A value stored under a key
    Put {
        /// Record key
        key: Vec<u8>,
        /// Value bytes, possibly compressed
        value: Vec<u8>,
        /// [`CompressionType`](crate::config::CompressionType) tag of `value`
        compression: u8,
    },
    /// A key removed
    Delete {
        /// Record key
        key: Vec<u8>,
    },
}

/// Encode an entry into a framed record.
pub fn encode(entry: &LogEntry) -> Result<Vec<u8>> {
    let payload = bincode::serialize(entry)?;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(Error::invalid_argument(format!(
            "Record payload too large: {} bytes",
            payload.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u32_le(crc32fast::hash(&payload));
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.to_vec())
}

/// Read the next record from `reader`.
///
/// Returns `Ok(None)` at a clean end of input. A partial record or a checksum
/// failure is reported as corruption so recovery can stop at the last good
/// record. Returns the entry together with its encoded size.
pub fn read_next<R: Read>(reader: &mut R) -> Result<Option<(LogEntry, usize)>> {
    let mut header = [0u8; HEADER_SIZE];
    match read_full(reader, &mut header)? {
        0 => return Ok(None),
        n if n < HEADER_SIZE => {
            return Err(Error::corruption(format!("Truncated record header: {} bytes", n)));
        }
        _ => {}
    }

    let mut cursor = &header[..];
    let checksum = cursor.get_u32_le();
    let length = cursor.get_u32_le() as usize;
    if length > MAX_PAYLOAD_SIZE {
        return Err(Error::corruption(format!("Record length {} exceeds limit", length)));
    }

    let mut payload = vec![0u8; length];
    let read = read_full(reader, &mut payload)?;
    if read < length {
        return Err(Error::corruption(format!(
            "Incomplete record: expected {} bytes, got {}",
            length, read
        )));
    }

    let actual = crc32fast::hash(&payload);
    if actual != checksum {
        return Err(Error::ChecksumMismatch { expected: checksum, actual });
    }

    let entry = bincode::deserialize(&payload)?;
    Ok(Some((entry, HEADER_SIZE + length)))
}

/// Read until `buf` is full or the input ends, returning the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}
