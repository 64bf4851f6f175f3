//! # scopedb storage
//!
//! Byte storage backends and a checksummed record log for scopedb.
//!
//! Backends are **opaque byte stores**: read, append, sync, truncate. The
//! [`RecordLog`] frames records on top of any backend, and the single-file
//! engine in `scopedb_core` replays that log to rebuild its documents.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral engines
//! - [`FileBackend`] - A single OS file
//!
//! ## Example
//!
//! ```rust
//! use scopedb_storage::{InMemoryBackend, RecordLog};
//!
//! let mut log = RecordLog::new(Box::new(InMemoryBackend::new()));
//! log.append(b"hello").unwrap();
//! let scan = log.scan().unwrap();
//! assert_eq!(scan.records, vec![b"hello".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod record;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use record::{crc32, LogScan, RecordLog, FRAME_HEADER_SIZE, FRAME_MAGIC};
