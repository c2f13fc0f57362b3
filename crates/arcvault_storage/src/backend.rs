//! Storage backend trait definition.

use crate::error::StorageResult;
use std::io::Read;

/// A low-level, append-only byte store.
///
/// Backends are **opaque**: they provide reading, appending, flushing and
/// truncation. Record framing, segment naming and journals are interpreted by
/// the engine above, never here.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `truncate` only ever shrinks; bytes before the new end are untouched
/// - Backends must be `Send + Sync` for concurrent access
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read would extend beyond the current size or
    /// an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Streams everything `src` yields onto the end of the storage.
    ///
    /// Returns `(offset, bytes_copied)`. On error the storage may hold a
    /// partial copy; callers that need all-or-nothing semantics truncate back
    /// to `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading `src` or writing fails.
    fn append_from(&mut self, src: &mut dyn Read) -> StorageResult<(u64, u64)>;

    /// Flushes all pending writes to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// This is the offset where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Syncs all data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Truncates the storage to `new_size` bytes.
    ///
    /// Used to discard a partially written record.
    ///
    /// # Errors
    ///
    /// Returns an error if `new_size` is greater than the current size or the
    /// truncation fails.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
