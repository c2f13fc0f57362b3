//! Segment management.
//!
//! A segment is one append-only archive file of one archival unit. The
//! active segment carries the `.open` marker; finalizing syncs it and
//! renames it to its final name. Locations always name the final path, and
//! readers fall back to the `.open` variant while the segment is active.

mod name;
mod writer;

pub use name::{SegmentName, IN_PROGRESS_SUFFIX, SEGMENT_EXTENSION};
pub use writer::SegmentWriter;

use crate::error::{CoreError, CoreResult};
use arcvault_storage::{FileBackend, StorageBackend};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// A segment file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    /// Parsed name.
    pub name: SegmentName,
    /// Path as found (may carry `.open`).
    pub path: PathBuf,
    /// Finalized path, used in locations.
    pub final_path: PathBuf,
    /// Whether the file carries the in-progress marker.
    pub in_progress: bool,
    /// File size when listed.
    pub size: u64,
}

/// Lists the segments in `dir` with the given prefix, oldest first.
///
/// A missing directory yields an empty list.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_segments(dir: &Path, prefix: &str) -> CoreResult<Vec<SegmentFile>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut segments = Vec::new();
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some((name, in_progress)) = SegmentName::parse(file_name) else {
            continue;
        };
        if name.prefix() != prefix {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(m) => m,
            // Renamed away between listing and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        segments.push(SegmentFile {
            final_path: dir.join(name.file_name()),
            path: entry.path(),
            name,
            in_progress,
            size: metadata.len(),
        });
    }
    segments.sort_by(|a, b| a.name.cmp(&b.name));
    segments.dedup_by(|later, earlier| {
        // An entry listed both before and after a finalize rename.
        later.name == earlier.name
    });
    Ok(segments)
}

/// The in-progress variant of a finalized segment path.
#[must_use]
pub fn in_progress_path(final_path: &Path) -> PathBuf {
    let mut path = final_path.as_os_str().to_owned();
    path.push(IN_PROGRESS_SUFFIX);
    PathBuf::from(path)
}

/// Opens the segment a location names, following a concurrent finalize.
///
/// Tries the final path, then the `.open` variant, then the final path once
/// more in case the rename happened in between.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] if no variant exists, or a storage error.
pub fn open_for_read(final_path: &Path) -> CoreResult<FileBackend> {
    let missing = || format!("segment {}", final_path.display());
    for path in [final_path.to_path_buf(), in_progress_path(final_path), final_path.to_path_buf()] {
        match FileBackend::open_read_only(&path) {
            Ok(backend) => return Ok(backend),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Err(CoreError::not_found(missing()))
}

/// Appends a header block and a streamed body as one record.
///
/// On failure the backend is truncated back to the record's start offset so
/// offset bookkeeping stays at a record boundary. Returns `(offset, length)`.
///
/// # Errors
///
/// Returns the append error. If the rollback also fails, returns
/// [`CoreError::SegmentCorruption`] and the backend must not be reused.
pub(crate) fn append_framed(
    backend: &mut dyn StorageBackend,
    header: &[u8],
    body: &mut dyn Read,
    sync: bool,
) -> CoreResult<(u64, u64)> {
    let start = backend.size()?;
    let written = backend
        .append(header)
        .and_then(|_| backend.append_from(body))
        .and_then(|(_, n)| {
            if sync {
                backend.sync()?;
            } else {
                backend.flush()?;
            }
            Ok(n)
        });

    match written {
        Ok(body_len) => Ok((start, header.len() as u64 + body_len)),
        Err(e) => match backend.truncate(start) {
            Ok(()) => Err(e.into()),
            Err(rollback) => Err(CoreError::segment_corruption(format!(
                "append failed ({e}) and rollback to offset {start} failed ({rollback})"
            ))),
        },
    }
}
