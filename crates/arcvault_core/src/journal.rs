//! Artifact state journal.
//!
//! Each archival unit keeps a `journal.warc` of `metadata` records whose
//! JSON body flips an artifact's lifecycle flags:
//!
//! ```text
//! {"artifactId":"0190...","committed":true,"deleted":false}
//! ```
//!
//! Segments are never rewritten, so commit and delete are durable journal
//! appends. Replaying the journal in order yields each artifact's state.

use crate::artifact::ArtifactId;
use crate::digest::{digest_bytes, DigestAlgorithm};
use crate::error::{CoreError, CoreResult};
use crate::record::{read_block, warc_date, RecordHeader, RecordScanner, RecordType, RECORD_TERMINATOR};
use crate::segment::append_framed;
use crate::types::ArtifactState;
use arcvault_storage::{FileBackend, StorageBackend};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// File name of the journal inside an AU directory.
pub const JOURNAL_FILE: &str = "journal.warc";

const JOURNAL_CONTENT_TYPE: &str = "application/json";

/// One state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    /// Artifact the change applies to.
    pub artifact_id: ArtifactId,
    /// Artifact is committed.
    pub committed: bool,
    /// Artifact is deleted.
    pub deleted: bool,
}

impl JournalEntry {
    /// Entry marking `id` committed.
    #[must_use]
    pub const fn committed(id: ArtifactId) -> Self {
        Self {
            artifact_id: id,
            committed: true,
            deleted: false,
        }
    }

    /// Entry marking `id` deleted.
    #[must_use]
    pub const fn deleted(id: ArtifactId) -> Self {
        Self {
            artifact_id: id,
            committed: false,
            deleted: true,
        }
    }
}

/// Replays entries into per-artifact states.
///
/// Deletion is sticky; a commit never resurrects a deleted artifact.
#[must_use]
pub fn replay(entries: &[JournalEntry]) -> HashMap<ArtifactId, ArtifactState> {
    let mut states = HashMap::new();
    for entry in entries {
        let state = states.entry(entry.artifact_id).or_insert(ArtifactState::Created);
        if entry.deleted {
            *state = ArtifactState::Deleted;
        } else if entry.committed && !state.is_deleted() {
            *state = ArtifactState::Committed;
        }
    }
    states
}

/// Result of reading a journal file.
#[derive(Debug, Default)]
pub struct JournalScan {
    /// Entries in append order.
    pub entries: Vec<JournalEntry>,
    /// End of the last complete record.
    pub valid_len: u64,
    /// Whether an incomplete or unreadable tail follows `valid_len`.
    pub torn: bool,
}

/// Reads up to `limit` bytes of the journal at `path`.
///
/// A missing journal is empty. A torn or garbled tail ends the scan and is
/// reported through [`JournalScan::torn`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or a complete record holds an
/// unparseable body.
pub fn read_journal(path: &Path, limit: Option<u64>) -> CoreResult<JournalScan> {
    let backend = match FileBackend::open_read_only(path) {
        Ok(backend) => backend,
        Err(e) if e.is_not_found() => return Ok(JournalScan::default()),
        Err(e) => return Err(e.into()),
    };
    scan_backend(&backend, limit, path)
}

fn scan_backend(backend: &dyn StorageBackend, limit: Option<u64>, path: &Path) -> CoreResult<JournalScan> {
    let mut scan = JournalScan::default();
    let mut scanner = RecordScanner::new(backend, limit)?;
    loop {
        match scanner.next_record() {
            Ok(Some(record)) => {
                if record.header.record_type != RecordType::Metadata {
                    continue;
                }
                let body = read_block(backend, &record)?;
                scan.entries.push(serde_json::from_slice(&body)?);
            }
            Ok(None) => {
                scan.torn = scanner.is_torn();
                break;
            }
            Err(CoreError::SegmentCorruption { message }) => {
                warn!(journal = %path.display(), %message, "journal tail is corrupt");
                scan.torn = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }
    scan.valid_len = scanner.position();
    Ok(scan)
}

/// Append handle on one AU's journal.
#[derive(Debug)]
pub struct StateJournal {
    path: PathBuf,
    backend: FileBackend,
    digest: Arc<dyn DigestAlgorithm>,
    sync: bool,
}

impl StateJournal {
    /// Opens the journal, truncating any torn tail, and returns its entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be opened, read or truncated.
    pub fn open(
        path: &Path,
        digest: Arc<dyn DigestAlgorithm>,
        sync: bool,
    ) -> CoreResult<(Self, Vec<JournalEntry>)> {
        let mut backend = FileBackend::open_with_create_dirs(path)?;
        let scan = scan_backend(&backend, None, path)?;
        if scan.torn {
            let size = backend.size()?;
            warn!(
                journal = %path.display(),
                discarded = size - scan.valid_len,
                "truncating torn journal tail"
            );
            backend.truncate(scan.valid_len)?;
            backend.sync()?;
        }
        Ok((
            Self {
                path: path.to_path_buf(),
                backend,
                digest,
                sync,
            },
            scan.entries,
        ))
    }

    /// Journal file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current journal size; always a record boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Durably appends one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the append fails; a failed append
    /// leaves the journal at its previous size.
    pub fn append(&mut self, entry: &JournalEntry) -> CoreResult<()> {
        let body = serde_json::to_vec(entry)?;
        let mut header = RecordHeader::new(
            RecordType::Metadata,
            ArtifactId::new(),
            entry.artifact_id.to_record_id(),
            warc_date(Utc::now()),
            JOURNAL_CONTENT_TYPE,
            body.len() as u64,
        );
        header.payload_digest = Some(digest_bytes(self.digest.as_ref(), &body));
        let header = header.render()?;

        let mut framed = body;
        framed.extend_from_slice(RECORD_TERMINATOR);
        append_framed(&mut self.backend, &header, &mut &framed[..], self.sync)?;
        Ok(())
    }
}
