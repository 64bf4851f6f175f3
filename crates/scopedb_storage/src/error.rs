//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Attempted to grow storage through `truncate`.
    #[error("cannot truncate to {requested} bytes, storage holds {size}")]
    TruncateBeyondEnd {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },

    /// A record frame failed validation somewhere other than the log tail.
    #[error("record log corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Offset of the damaged frame.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// A record is larger than the frame format can describe.
    #[error("record of {len} bytes exceeds the maximum frame size")]
    RecordTooLarge {
        /// Payload length.
        len: usize,
    },
}
