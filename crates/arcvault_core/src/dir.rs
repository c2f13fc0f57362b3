//! Storage root management.
//!
//! This module handles the file system layout of one storage root:
//!
//! ```text
//! <root>/
//! ├─ LOCK                          # Advisory lock for single-process access
//! └─ ns/<namespace>/au-<hex>/      # One directory per archival unit
//!    ├─ AUID                       # The auid, verbatim
//!    ├─ journal.warc               # Artifact state journal
//!    └─ artifacts-*.warc[.open]    # Segments
//! ```
//!
//! The LOCK file ensures only one process writes to a root at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const NAMESPACES_DIR: &str = "ns";

/// Holds the exclusive lock on one storage root.
///
/// Only one `RootDir` can exist per directory at a time, across processes.
#[derive(Debug)]
pub struct RootDir {
    path: PathBuf,
    _lock_file: File,
}

impl RootDir {
    /// Opens or creates a storage root and locks it.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (returns `RepositoryLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::not_found(format!(
                    "storage root {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_state(format!(
                "storage root is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::RepositoryLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Directory holding all namespaces under `root`.
#[must_use]
pub fn namespaces_dir(root: &Path) -> PathBuf {
    root.join(NAMESPACES_DIR)
}

/// Writes `data` to `path` via a temp file, fsync and rename.
///
/// # Errors
///
/// Returns an error if any step fails.
pub fn write_file_atomic(path: &Path, data: &[u8]) -> CoreResult<()> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    let mut file = File::create(&temp)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp, path)?;
    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }
    Ok(())
}

/// Syncs a directory so that creates and renames inside it are durable.
///
/// Windows NTFS journals metadata; directory fsync is skipped there.
#[cfg(unix)]
pub fn sync_directory(path: &Path) -> CoreResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

/// Syncs a directory so that creates and renames inside it are durable.
#[cfg(not(unix))]
pub fn sync_directory(_path: &Path) -> CoreResult<()> {
    Ok(())
}

/// Free space on the file system holding `path`, or 0 if it cannot be read.
#[must_use]
pub fn available_space(path: &Path) -> u64 {
    fs2::available_space(path).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_and_locks() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("repo");
        let first = RootDir::open(&root, true).unwrap();
        assert!(root.join(LOCK_FILE).exists());

        assert!(matches!(
            RootDir::open(&root, true),
            Err(CoreError::RepositoryLocked)
        ));

        drop(first);
        assert!(RootDir::open(&root, true).is_ok());
    }

    #[test]
    fn missing_root_without_create() {
        let dir = tempdir().unwrap();
        let err = RootDir::open(&dir.path().join("absent"), false).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn atomic_write_replaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("AUID");
        write_file_atomic(&path, b"first").unwrap();
        write_file_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        assert!(!dir.path().join("AUID.tmp").exists());
    }
}
