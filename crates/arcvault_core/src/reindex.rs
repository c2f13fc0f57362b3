//! Index rebuilding from durable storage.
//!
//! The [`ReindexWalker`] rescans segments and the state journal and hands
//! every decoded artifact to a callback. It only ever reads, and only up to
//! the sizes captured in an [`AuSnapshot`], so it can run next to live
//! writers. The same walk rebuilds an AU's catalog at startup.

use crate::artifact::{Artifact, ArtifactId};
use crate::error::{CoreError, CoreResult};
use crate::journal::{read_journal, replay, JOURNAL_FILE};
use crate::namespace::NamespaceRegistry;
use crate::record::{RecordScanner, ScannedRecord};
use crate::segment::{list_segments, open_for_read, SegmentFile};
use crate::types::{ArtifactState, AuKey, StorageLocation};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// External lookup index fed by reindexing.
pub trait ArtifactIndex: Send + Sync {
    /// Inserts or replaces the entry for `artifact.id`.
    ///
    /// # Errors
    ///
    /// Implementations report their own failures; reindex stops on the first.
    fn upsert(&self, artifact: &Artifact) -> CoreResult<()>;
}

/// Index held in memory, keyed by artifact ID.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<ArtifactId, Artifact>>,
}

impl InMemoryIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entry for `id`.
    #[must_use]
    pub fn get(&self, id: &ArtifactId) -> Option<Artifact> {
        self.entries.read().get(id).cloned()
    }

    /// All entries, ordered by ID.
    #[must_use]
    pub fn artifacts(&self) -> Vec<Artifact> {
        let mut all: Vec<_> = self.entries.read().values().cloned().collect();
        all.sort_by_key(|a| a.id);
        all
    }
}

impl ArtifactIndex for InMemoryIndex {
    fn upsert(&self, artifact: &Artifact) -> CoreResult<()> {
        self.entries.write().insert(artifact.id, artifact.clone());
        Ok(())
    }
}

/// Outcome of a reindex walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexReport {
    /// Archival units walked.
    pub aus: u64,
    /// Segment files scanned.
    pub segments_scanned: u64,
    /// Artifacts handed to the callback.
    pub artifacts_indexed: u64,
    /// Deleted artifacts left out.
    pub deleted_skipped: u64,
    /// Segments that ended in an incomplete record.
    pub torn_tails: u64,
    /// Segments abandoned at malformed bytes.
    pub corrupt_segments: u64,
}

impl ReindexReport {
    /// Adds `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.aus += other.aus;
        self.segments_scanned += other.segments_scanned;
        self.artifacts_indexed += other.artifacts_indexed;
        self.deleted_skipped += other.deleted_skipped;
        self.torn_tails += other.torn_tails;
        self.corrupt_segments += other.corrupt_segments;
    }
}

/// The readable extent of one AU at a moment in time.
#[derive(Debug, Clone)]
pub struct AuSnapshot {
    /// The AU.
    pub key: AuKey,
    /// Segments, oldest first; `size` bounds how much of each is read.
    pub segments: Vec<SegmentFile>,
    /// Journal files with the byte count to read from each.
    pub journals: Vec<(PathBuf, u64)>,
}

impl AuSnapshot {
    /// Lists the AU's segments and journals as they are on disk now.
    ///
    /// Taken while the AU's writer is held, every size is a record boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be listed.
    pub fn capture(key: &AuKey, dirs: &[PathBuf], prefix: &str) -> CoreResult<Self> {
        let mut segments = Vec::new();
        let mut journals = Vec::new();
        for dir in dirs {
            segments.extend(list_segments(dir, prefix)?);
            let journal = dir.join(JOURNAL_FILE);
            match std::fs::metadata(&journal) {
                Ok(meta) => journals.push((journal, meta.len())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        segments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self {
            key: key.clone(),
            segments,
            journals,
        })
    }
}

/// Rescans segments to rebuild artifact state.
#[derive(Debug, Clone)]
pub struct ReindexWalker {
    prefix: String,
    include_deleted: bool,
}

impl ReindexWalker {
    /// Creates a walker over segments named with `prefix`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            include_deleted: false,
        }
    }

    /// Whether deleted artifacts reach the callback (default false).
    #[must_use]
    pub const fn include_deleted(mut self, value: bool) -> Self {
        self.include_deleted = value;
        self
    }

    /// Walks every AU the registry finds on disk.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or callback error.
    pub fn walk_all<F>(&self, registry: &NamespaceRegistry, mut f: F) -> CoreResult<ReindexReport>
    where
        F: FnMut(Artifact, ArtifactState) -> CoreResult<()>,
    {
        let mut report = ReindexReport::default();
        for (key, dirs) in registry.discover()? {
            report.merge(&self.walk_au(&key, &dirs, &mut f)?);
        }
        Ok(report)
    }

    /// Walks one AU as it is on disk now.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or callback error.
    pub fn walk_au<F>(&self, key: &AuKey, dirs: &[PathBuf], f: F) -> CoreResult<ReindexReport>
    where
        F: FnMut(Artifact, ArtifactState) -> CoreResult<()>,
    {
        let snapshot = AuSnapshot::capture(key, dirs, &self.prefix)?;
        self.walk_snapshot(&snapshot, f)
    }

    /// Walks the frozen extent described by `snapshot`.
    ///
    /// Torn tails and malformed segments are logged, counted and skipped.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or callback error.
    pub fn walk_snapshot<F>(&self, snapshot: &AuSnapshot, mut f: F) -> CoreResult<ReindexReport>
    where
        F: FnMut(Artifact, ArtifactState) -> CoreResult<()>,
    {
        let mut report = ReindexReport {
            aus: 1,
            ..ReindexReport::default()
        };

        let mut entries = Vec::new();
        for (path, len) in &snapshot.journals {
            entries.extend(read_journal(path, Some(*len))?.entries);
        }
        let states = replay(&entries);

        for segment in &snapshot.segments {
            report.segments_scanned += 1;
            let backend = match open_for_read(&segment.final_path) {
                Ok(backend) => backend,
                Err(e) if e.is_not_found() => {
                    warn!(segment = %segment.final_path.display(), "segment vanished during walk");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut scanner = RecordScanner::new(&backend, Some(segment.size))?;
            loop {
                match scanner.next_record() {
                    Ok(Some(record)) => {
                        if !record.header.record_type.is_artifact() {
                            continue;
                        }
                        let mut artifact =
                            artifact_from_record(&snapshot.key, &segment.final_path, &record);
                        let state = states
                            .get(&artifact.id)
                            .copied()
                            .unwrap_or(ArtifactState::Created);
                        if state.is_deleted() && !self.include_deleted {
                            report.deleted_skipped += 1;
                            continue;
                        }
                        artifact.committed = state.is_committed();
                        f(artifact, state)?;
                        report.artifacts_indexed += 1;
                    }
                    Ok(None) => {
                        if scanner.is_torn() {
                            warn!(
                                segment = %segment.path.display(),
                                valid = scanner.position(),
                                size = segment.size,
                                "ignoring incomplete trailing record"
                            );
                            report.torn_tails += 1;
                        }
                        break;
                    }
                    Err(CoreError::SegmentCorruption { message }) => {
                        warn!(
                            segment = %segment.path.display(),
                            %message,
                            "skipping rest of corrupt segment"
                        );
                        report.corrupt_segments += 1;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        debug!(
            au = %snapshot.key,
            segments = report.segments_scanned,
            artifacts = report.artifacts_indexed,
            "walked archival unit"
        );
        Ok(report)
    }
}

/// Rebuilds the artifact an on-disk record describes.
fn artifact_from_record(key: &AuKey, segment: &Path, record: &ScannedRecord) -> Artifact {
    let header = &record.header;
    Artifact {
        id: header.record_id,
        namespace: key.namespace.clone(),
        auid: key.auid.clone(),
        uri: header.target_uri.clone(),
        version: header.version.unwrap_or(1),
        committed: false,
        content_hash: header.payload_digest.clone().unwrap_or_default(),
        metadata_hash: header.metadata_digest.clone().unwrap_or_default(),
        content_length: header.payload_len(),
        content_datetime: header.capture_millis.unwrap_or_default(),
        location: StorageLocation {
            path: segment.to_path_buf(),
            offset: record.offset,
            length: record.length(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactData;
    use crate::digest::Sha256Digest;
    use crate::journal::{JournalEntry, StateJournal};
    use crate::record::RecordEncoder;
    use crate::segment::SegmentWriter;
    use crate::types::Namespace;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn write_artifacts(dir: &Path, uris: &[&str], max: u64) -> Vec<Artifact> {
        let encoder = RecordEncoder::new(Arc::new(Sha256Digest), 1024, IpAddr::V4(Ipv4Addr::LOCALHOST));
        let mut writer = SegmentWriter::new(dir, "artifacts", max, false);
        uris.iter()
            .map(|uri| {
                let mut record = encoder
                    .encode(ArtifactData::from_bytes("ns", "au", *uri, uri.as_bytes().to_vec()))
                    .unwrap();
                let header = record.header_block(1).unwrap();
                writer.check_size(record.framed_length(header.len())).unwrap();
                let location = writer.append_with(&header, &mut record.body()).unwrap();
                record.to_artifact(1, location)
            })
            .collect()
    }

    fn key() -> AuKey {
        AuKey::new(Namespace::new("ns").unwrap(), "au").unwrap()
    }

    #[test]
    fn walk_rebuilds_artifacts_across_segments() {
        let dir = tempdir().unwrap();
        let written = write_artifacts(dir.path(), &["http://a/1", "http://a/2", "http://a/3"], 600);

        let index = InMemoryIndex::new();
        let report = ReindexWalker::new("artifacts")
            .walk_au(&key(), &[dir.path().to_path_buf()], |a, _| index.upsert(&a))
            .unwrap();

        assert_eq!(report.artifacts_indexed, 3);
        assert!(report.segments_scanned >= 2, "{report:?}");
        assert_eq!(index.artifacts(), written);
    }

    #[test]
    fn journal_states_are_applied() {
        let dir = tempdir().unwrap();
        let written = write_artifacts(dir.path(), &["http://a/1", "http://a/2", "http://a/3"], 1 << 20);
        let (mut journal, _) =
            StateJournal::open(&dir.path().join(JOURNAL_FILE), Arc::new(Sha256Digest), false).unwrap();
        journal.append(&JournalEntry::committed(written[0].id)).unwrap();
        journal.append(&JournalEntry::deleted(written[1].id)).unwrap();

        let index = InMemoryIndex::new();
        let report = ReindexWalker::new("artifacts")
            .walk_au(&key(), &[dir.path().to_path_buf()], |a, _| index.upsert(&a))
            .unwrap();
        assert_eq!(report.artifacts_indexed, 2);
        assert_eq!(report.deleted_skipped, 1);
        assert!(index.get(&written[0].id).unwrap().committed);
        assert!(index.get(&written[1].id).is_none());
        assert!(!index.get(&written[2].id).unwrap().committed);

        let mut seen = Vec::new();
        ReindexWalker::new("artifacts")
            .include_deleted(true)
            .walk_au(&key(), &[dir.path().to_path_buf()], |a, s| {
                seen.push((a.id, s));
                Ok(())
            })
            .unwrap();
        assert!(seen.contains(&(written[1].id, ArtifactState::Deleted)));
    }

    #[test]
    fn torn_tail_is_counted_not_fatal() {
        let dir = tempdir().unwrap();
        let written = write_artifacts(dir.path(), &["http://a/1", "http://a/2"], 1 << 20);
        let mut file = OpenOptions::new()
            .append(true)
            .open(&written[1].location.path)
            .unwrap();
        file.write_all(b"WARC/1.0\r\nWARC-Type: resou").unwrap();

        let index = InMemoryIndex::new();
        let report = ReindexWalker::new("artifacts")
            .walk_au(&key(), &[dir.path().to_path_buf()], |a, _| index.upsert(&a))
            .unwrap();
        assert_eq!(report.artifacts_indexed, 2);
        assert_eq!(report.torn_tails, 1);
    }

    #[test]
    fn snapshot_limits_hide_later_appends() {
        let dir = tempdir().unwrap();
        write_artifacts(dir.path(), &["http://a/1"], 1 << 20);
        let snapshot = AuSnapshot::capture(&key(), &[dir.path().to_path_buf()], "artifacts").unwrap();
        write_artifacts(dir.path(), &["http://a/2"], 1 << 20);

        let mut count = 0;
        ReindexWalker::new("artifacts")
            .walk_snapshot(&snapshot, |_, _| {
                count += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
