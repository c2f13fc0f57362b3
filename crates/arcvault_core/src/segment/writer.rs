//! Active segment writer for one archival unit.

use super::{append_framed, in_progress_path, SegmentName};
use crate::dir::sync_directory;
use crate::error::{CoreError, CoreResult};
use crate::types::StorageLocation;
use arcvault_storage::{FileBackend, StorageBackend};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// The segment currently receiving appends.
#[derive(Debug)]
struct ActiveSegment {
    name: SegmentName,
    final_path: PathBuf,
    backend: FileBackend,
}

/// Appends framed records to an AU's active segment, rolling over by size.
///
/// The writer is single-owner (`&mut self` on every write); callers serialize
/// access with the AU lock. A segment is opened lazily on the first append,
/// carries the `.open` marker while active, and is synced and renamed to its
/// final name on rollover or [`finalize`](Self::finalize). Rollover never
/// touches bytes already written.
#[derive(Debug)]
pub struct SegmentWriter {
    dir: PathBuf,
    prefix: String,
    max_segment_size: u64,
    sync_on_append: bool,
    active: Option<ActiveSegment>,
}

impl SegmentWriter {
    /// Creates a writer for segments in `dir`.
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        max_segment_size: u64,
        sync_on_append: bool,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            max_segment_size,
            sync_on_append,
            active: None,
        }
    }

    /// Directory the writer creates segments in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final path and current size of the active segment, if one is open.
    ///
    /// The size is always a record boundary while the caller holds the
    /// writer exclusively.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be read.
    pub fn active(&self) -> CoreResult<Option<(PathBuf, u64)>> {
        self.active
            .as_ref()
            .map(|a| Ok((a.final_path.clone(), a.backend.size()?)))
            .transpose()
    }

    /// Rolls over if appending `incoming` bytes would not fit.
    ///
    /// The active segment is finalized when it already meets the maximum
    /// size, or when it is non-empty and `incoming` would push it past the
    /// maximum. A record larger than the maximum gets a segment of its own.
    /// Returns whether a rollover happened.
    ///
    /// # Errors
    ///
    /// Returns an error if finalizing the active segment fails.
    pub fn check_size(&mut self, incoming: u64) -> CoreResult<bool> {
        let Some(active) = &self.active else {
            return Ok(false);
        };
        let size = active.backend.size()?;
        let full = size >= self.max_segment_size
            || (size > 0 && size.saturating_add(incoming) > self.max_segment_size);
        if !full {
            return Ok(false);
        }
        self.finalize()?;
        Ok(true)
    }

    /// Appends one record: `header` then everything `body` yields.
    ///
    /// Returns the record's location under the segment's final path. On
    /// failure the segment is truncated back to the record start; if that
    /// fails too the segment is abandoned (left `.open` for recovery) and
    /// the next append opens a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if opening a segment or appending fails.
    pub fn append_with(&mut self, header: &[u8], body: &mut dyn Read) -> CoreResult<StorageLocation> {
        let active = match self.active.take() {
            Some(active) => active,
            None => self.open_new()?,
        };
        let active = self.active.insert(active);

        match append_framed(&mut active.backend, header, body, self.sync_on_append) {
            Ok((offset, length)) => {
                debug!(segment = %active.name, offset, length, "appended record");
                Ok(StorageLocation {
                    path: active.final_path.clone(),
                    offset,
                    length,
                })
            }
            Err(e) => {
                if matches!(e, CoreError::SegmentCorruption { .. }) {
                    error!(segment = %active.name, error = %e, "abandoning segment after failed rollback");
                    self.active = None;
                }
                Err(e)
            }
        }
    }

    /// Syncs the active segment and removes its in-progress marker.
    ///
    /// No-op if no segment is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync or rename fails; the segment stays active.
    pub fn finalize(&mut self) -> CoreResult<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        let result = active
            .backend
            .sync()
            .and_then(|()| active.backend.rename(&active.final_path));
        if let Err(e) = result {
            self.active = Some(active);
            return Err(e.into());
        }
        sync_directory(&self.dir)?;
        info!(
            segment = %active.name,
            size = active.backend.size().unwrap_or_default(),
            "finalized segment"
        );
        Ok(())
    }

    fn open_new(&self) -> CoreResult<ActiveSegment> {
        loop {
            let name = SegmentName::next(&self.prefix);
            let final_path = self.dir.join(name.file_name());
            let open_path = in_progress_path(&final_path);
            if final_path.exists() || open_path.exists() {
                continue;
            }
            let backend = FileBackend::open_with_create_dirs(&open_path)?;
            sync_directory(&self.dir)?;
            debug!(segment = %name, "opened segment");
            return Ok(ActiveSegment {
                name,
                final_path,
                backend,
            });
        }
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            error!(dir = %self.dir.display(), error = %e, "failed to finalize segment on drop");
        }
    }
}
