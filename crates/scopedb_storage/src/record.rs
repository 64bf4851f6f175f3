//! Framed record log on top of a [`StorageBackend`].
//!
//! Frame layout (little-endian):
//!
//! ```text
//! +-------+--------+--------+-----------------+
//! | magic | length | crc32  | payload         |
//! | 2 B   | 4 B    | 4 B    | `length` bytes  |
//! +-------+--------+--------+-----------------+
//! ```
//!
//! A frame is written with a single `append`, so a crash leaves at most one
//! incomplete frame at the tail. Scanning stops at the first frame that does
//! not validate; if that frame is the last thing in the log it is reported
//! as a torn tail, anywhere else it is corruption.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 2] = *b"SR";

/// Size of the frame header in bytes.
pub const FRAME_HEADER_SIZE: usize = 10;

/// Result of scanning a record log.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Payloads of every valid frame, in append order.
    pub records: Vec<Vec<u8>>,
    /// Byte length of the valid prefix.
    pub valid_len: u64,
    /// Whether an incomplete frame followed the valid prefix.
    pub torn_tail: bool,
}

/// An append-only log of checksummed records.
pub struct RecordLog {
    backend: Box<dyn StorageBackend>,
}

impl RecordLog {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Appends one record and returns its frame offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too large or the append fails.
    pub fn append(&mut self, payload: &[u8]) -> StorageResult<u64> {
        let frame = encode_frame(payload)?;
        self.backend.append(&frame)
    }

    /// Makes appended records durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend sync fails.
    pub fn sync(&mut self) -> StorageResult<()> {
        self.backend.sync()
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> StorageResult<u64> {
        self.backend.size()
    }

    /// Drops every byte after `len`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend truncation fails.
    pub fn truncate(&mut self, len: u64) -> StorageResult<()> {
        self.backend.truncate(len)
    }

    /// Reads every valid record.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if an invalid frame is followed by more data,
    /// or an I/O error.
    pub fn scan(&self) -> StorageResult<LogScan> {
        let size = self.backend.size()?;
        let mut scan = LogScan::default();
        let mut offset = 0u64;

        while offset < size {
            let remaining = size - offset;
            if remaining < FRAME_HEADER_SIZE as u64 {
                scan.torn_tail = true;
                break;
            }
            let header = self.backend.read_at(offset, FRAME_HEADER_SIZE)?;
            if header[0..2] != FRAME_MAGIC {
                return Err(StorageError::Corrupted {
                    offset,
                    reason: "bad frame magic".into(),
                });
            }
            let len = u32::from_le_bytes([header[2], header[3], header[4], header[5]]);
            let expected = u32::from_le_bytes([header[6], header[7], header[8], header[9]]);
            let frame_len = FRAME_HEADER_SIZE as u64 + u64::from(len);

            if frame_len > remaining {
                scan.torn_tail = true;
                break;
            }

            let payload = self
                .backend
                .read_at(offset + FRAME_HEADER_SIZE as u64, len as usize)?;
            let actual = crc32(&payload);
            if actual != expected {
                if offset + frame_len == size {
                    scan.torn_tail = true;
                    break;
                }
                return Err(StorageError::Corrupted {
                    offset,
                    reason: format!("checksum mismatch: expected {expected:08x}, got {actual:08x}"),
                });
            }

            scan.records.push(payload);
            offset += frame_len;
        }

        scan.valid_len = offset;
        Ok(scan)
    }
}

impl std::fmt::Debug for RecordLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordLog").finish_non_exhaustive()
    }
}

fn encode_frame(payload: &[u8]) -> StorageResult<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::RecordTooLarge { len: payload.len() })?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&crc32(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// CRC-32 (IEEE) of `data`.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
