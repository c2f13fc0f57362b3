//! Per-AU state behind one lock: segment writer, state journal and catalog.

use crate::artifact::{Artifact, ArtifactId};
use crate::config::Config;
use crate::dir::sync_directory;
use crate::error::{CoreError, CoreResult};
use crate::journal::{JournalEntry, StateJournal, JOURNAL_FILE};
use crate::record::RecordScanner;
use crate::reindex::{AuSnapshot, ReindexWalker};
use crate::segment::{list_segments, SegmentWriter};
use crate::types::{ArtifactState, AuKey};
use arcvault_storage::{FileBackend, StorageBackend};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub(crate) struct CatalogEntry {
    pub(crate) artifact: Artifact,
    pub(crate) state: ArtifactState,
}

/// Everything that must change together when an AU is written.
#[derive(Debug)]
pub(crate) struct AuState {
    pub(crate) writer: SegmentWriter,
    journal: StateJournal,
    catalog: HashMap<ArtifactId, CatalogEntry>,
    versions: HashMap<String, u32>,
}

impl AuState {
    /// Version the next capture of `uri` gets.
    pub(crate) fn next_version(&self, uri: &str) -> u32 {
        self.versions.get(uri).map_or(1, |v| v.saturating_add(1))
    }

    pub(crate) fn insert(&mut self, artifact: Artifact, state: ArtifactState) {
        let version = self.versions.entry(artifact.uri.clone()).or_insert(0);
        *version = (*version).max(artifact.version);
        self.catalog.insert(artifact.id, CatalogEntry { artifact, state });
    }

    pub(crate) fn entry(&self, id: &ArtifactId) -> Option<&CatalogEntry> {
        self.catalog.get(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Marks `id` committed. Returns the artifact and whether anything changed.
    pub(crate) fn commit(&mut self, id: &ArtifactId) -> CoreResult<(Artifact, bool)> {
        let entry = self
            .catalog
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("artifact {id}")))?;
        match entry.state {
            ArtifactState::Deleted => Err(CoreError::invalid_state(format!(
                "artifact {id} is deleted and cannot be committed"
            ))),
            ArtifactState::Committed => Ok((entry.artifact.clone(), false)),
            ArtifactState::Created => {
                self.journal.append(&JournalEntry::committed(*id))?;
                entry.state = ArtifactState::Committed;
                entry.artifact.committed = true;
                Ok((entry.artifact.clone(), true))
            }
        }
    }

    /// Marks `id` deleted. Returns whether anything changed.
    pub(crate) fn delete(&mut self, id: &ArtifactId) -> CoreResult<bool> {
        match self.catalog.get_mut(id) {
            Some(entry) if !entry.state.is_deleted() => {
                self.journal.append(&JournalEntry::deleted(*id))?;
                entry.state = ArtifactState::Deleted;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// One open archival unit.
#[derive(Debug)]
pub(crate) struct AuHandle {
    key: AuKey,
    dirs: Vec<PathBuf>,
    prefix: String,
    state: Mutex<AuState>,
}

impl AuHandle {
    /// Opens an AU, recovering anything a crash left behind.
    ///
    /// In-progress segments are cut back to their last complete record and
    /// finalized, the journal's torn tail is dropped, and the catalog is
    /// rebuilt from the segments.
    pub(crate) fn open(key: AuKey, dirs: Vec<PathBuf>, config: &Config) -> CoreResult<Self> {
        let primary = dirs
            .first()
            .cloned()
            .ok_or_else(|| CoreError::invalid_state(format!("AU {key} has no directories")))?;

        for dir in &dirs {
            recover_segments(dir, &config.segment_prefix)?;
        }
        let (journal, _) = StateJournal::open(
            &primary.join(JOURNAL_FILE),
            Arc::clone(&config.digest),
            config.sync_on_append,
        )?;

        let mut state = AuState {
            writer: SegmentWriter::new(
                &primary,
                config.segment_prefix.clone(),
                config.max_segment_size,
                config.sync_on_append,
            ),
            journal,
            catalog: HashMap::new(),
            versions: HashMap::new(),
        };
        let report = ReindexWalker::new(config.segment_prefix.clone())
            .include_deleted(true)
            .walk_au(&key, &dirs, |artifact, s| {
                state.insert(artifact, s);
                Ok(())
            })?;

        debug!(
            au = %key,
            artifacts = state.len(),
            segments = report.segments_scanned,
            "opened archival unit"
        );
        Ok(Self {
            key,
            dirs,
            prefix: config.segment_prefix.clone(),
            state: Mutex::new(state),
        })
    }

    pub(crate) fn key(&self) -> &AuKey {
        &self.key
    }

    pub(crate) fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, AuState> {
        self.state.lock()
    }

    /// Readable extent of the AU; every size is a record boundary.
    pub(crate) fn snapshot(&self) -> CoreResult<AuSnapshot> {
        let _state = self.state.lock();
        AuSnapshot::capture(&self.key, &self.dirs, &self.prefix)
    }

    /// Bytes in all segments of the AU, the active one included.
    pub(crate) fn warc_size(&self) -> CoreResult<u64> {
        let snapshot = self.snapshot()?;
        Ok(snapshot.segments.iter().map(|s| s.size).sum())
    }

    /// Finalizes the active segment.
    pub(crate) fn finalize(&self) -> CoreResult<()> {
        self.state.lock().writer.finalize()
    }
}

/// Truncates every in-progress segment in `dir` to its last complete record
/// and finalizes it. Returns how many segments were recovered.
pub(crate) fn recover_segments(dir: &Path, prefix: &str) -> CoreResult<usize> {
    let mut recovered = 0;
    for segment in list_segments(dir, prefix)? {
        if !segment.in_progress {
            continue;
        }
        let mut backend = FileBackend::open(&segment.path)?;
        let valid = {
            let mut scanner = RecordScanner::new(&backend, None)?;
            loop {
                match scanner.next_record() {
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(CoreError::SegmentCorruption { message }) => {
                        warn!(segment = %segment.path.display(), %message, "corrupt record in open segment");
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            scanner.position()
        };

        let size = backend.size()?;
        if valid < size {
            warn!(
                segment = %segment.path.display(),
                discarded = size - valid,
                "truncating incomplete tail of open segment"
            );
            backend.truncate(valid)?;
        }
        backend.sync()?;
        backend.rename(&segment.final_path)?;
        recovered += 1;
        info!(segment = %segment.final_path.display(), size = valid, "recovered open segment");
    }
    if recovered > 0 {
        sync_directory(dir)?;
    }
    Ok(recovered)
}
