//! Store statistics.
//!
//! All counters are atomic and can be read while operations are in progress.
//!
//! ```rust,ignore
//! let stats = store.stats();
//! println!("added: {}", stats.artifacts_added);
//! println!("segments rolled: {}", stats.segments_rolled);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Store statistics and metrics.
///
/// Values are monotonically increasing.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Artifacts appended.
    artifacts_added: AtomicU64,
    /// Commits that changed state.
    artifacts_committed: AtomicU64,
    /// Deletes that changed state.
    artifacts_deleted: AtomicU64,
    /// Content reads.
    reads: AtomicU64,
    /// Framed bytes appended to segments.
    bytes_written: AtomicU64,
    /// Content bytes handed out by reads.
    bytes_read: AtomicU64,
    /// Segment rollovers.
    segments_rolled: AtomicU64,
    /// Artifacts upserted by reindex.
    records_reindexed: AtomicU64,
    /// Failed operations.
    errors: AtomicU64,
}

impl StoreStats {
    /// Creates a new stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_add(&self, framed_bytes: u64) {
        self.artifacts_added.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(framed_bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.artifacts_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.artifacts_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_rollover(&self) {
        self.segments_rolled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reindexed(&self, count: u64) {
        self.records_reindexed.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            artifacts_added: self.artifacts_added.load(Ordering::Relaxed),
            artifacts_committed: self.artifacts_committed.load(Ordering::Relaxed),
            artifacts_deleted: self.artifacts_deleted.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            segments_rolled: self.segments_rolled.load(Ordering::Relaxed),
            records_reindexed: self.records_reindexed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Artifacts appended.
    pub artifacts_added: u64,
    /// Commits that changed state.
    pub artifacts_committed: u64,
    /// Deletes that changed state.
    pub artifacts_deleted: u64,
    /// Content reads.
    pub reads: u64,
    /// Framed bytes appended to segments.
    pub bytes_written: u64,
    /// Content bytes handed out by reads.
    pub bytes_read: u64,
    /// Segment rollovers.
    pub segments_rolled: u64,
    /// Artifacts upserted by reindex.
    pub records_reindexed: u64,
    /// Failed operations.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = StoreStats::new();
        stats.record_add(100);
        stats.record_add(50);
        stats.record_read(5);
        stats.record_commit();
        stats.record_rollover();
        stats.record_reindexed(7);
        stats.record_error();

        let snap = stats.snapshot();
        assert_eq!(snap.artifacts_added, 2);
        assert_eq!(snap.bytes_written, 150);
        assert_eq!(snap.reads, 1);
        assert_eq!(snap.bytes_read, 5);
        assert_eq!(snap.artifacts_committed, 1);
        assert_eq!(snap.artifacts_deleted, 0);
        assert_eq!(snap.segments_rolled, 1);
        assert_eq!(snap.records_reindexed, 7);
        assert_eq!(snap.errors, 1);
    }
}
