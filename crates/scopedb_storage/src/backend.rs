//! Storage backend trait definition.

use crate::error::StorageResult;

/// An opaque, append-only byte store.
///
/// Backends know nothing about records or documents; the record log and
/// the engines above it own all format interpretation.
///
/// # Invariants
///
/// - `append` returns the offset at which the bytes begin
/// - `read_at` returns exactly the bytes previously appended at that range
/// - after `sync` returns, every appended byte survives process exit
/// - implementations are `Send + Sync` and lock internally
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns `ReadPastEnd` if the range extends beyond the current size,
    /// or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends bytes and returns the offset where they were written.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Makes all appended data durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Shrinks the storage to `new_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `TruncateBeyondEnd` if `new_size` exceeds the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
