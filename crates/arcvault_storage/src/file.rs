//! File-backed byte store holding segments and journals.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Copy buffer for [`StorageBackend::append_from`].
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// A file-based storage backend.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// Writes go straight to the file descriptor, so bytes appended through one
/// backend are visible to another backend opened on the same path.
///
/// # Example
///
/// ```no_run
/// use arcvault_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("data.warc")).unwrap();
/// let offset = backend.append(b"persistent data").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
    writable: bool,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
            writable: true,
        })
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Opens an existing file for reading only.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the file does not exist, or an
    /// I/O error for any other failure.
    pub fn open_read_only(path: &Path) -> StorageResult<Self> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
            writable: false,
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renames the underlying file, keeping the open handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails; the backend keeps its old path.
    pub fn rename(&mut self, to: &Path) -> StorageResult<()> {
        fs::rename(&self.path, to)?;
        self.path = to.to_path_buf();
        Ok(())
    }

    /// Converts the backend into a reader over `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range lies beyond the end of the file or the
    /// seek fails.
    pub fn into_reader(self, offset: u64, len: u64) -> StorageResult<io::Take<File>> {
        let size = *self.size.read();
        if offset.saturating_add(len) > size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len: usize::try_from(len).unwrap_or(usize::MAX),
                size,
            });
        }

        let mut file = self.file.into_inner();
        file.seek(SeekFrom::Start(offset))?;
        Ok(file.take(len))
    }

    fn ensure_writable(&self) -> StorageResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StorageError::ReadOnly)
        }
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.ensure_writable()?;
        if data.is_empty() {
            return Ok(*self.size.read());
        }

        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        *size += data.len() as u64;

        Ok(offset)
    }

    fn append_from(&mut self, src: &mut dyn Read) -> StorageResult<(u64, u64)> {
        self.ensure_writable()?;

        let mut file = self.file.write();
        let mut size = self.size.write();

        let offset = *size;
        file.seek(SeekFrom::End(0))?;

        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut copied = 0u64;
        loop {
            let n = match src.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    *size = offset + copied;
                    return Err(e.into());
                }
            };
            if let Err(e) = file.write_all(&buffer[..n]) {
                // The file may hold part of this chunk; re-read the real length.
                *size = file.metadata().map_or(offset + copied, |m| m.len());
                return Err(e.into());
            }
            copied += n as u64;
        }
        *size = offset + copied;

        Ok((offset, copied))
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut file = self.file.write();
        file.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn sync(&mut self) -> StorageResult<()> {
        if !self.writable {
            return Ok(());
        }
        let file = self.file.write();
        file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.ensure_writable()?;
        let file = self.file.write();
        let mut size = self.size.write();

        // The cached size can lag behind the file after a failed write.
        let actual = file.metadata()?.len().max(*size);
        if new_size > actual {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size: actual,
            });
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;

        Ok(())
    }
}
