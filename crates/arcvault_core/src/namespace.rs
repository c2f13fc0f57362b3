//! Namespace and archival unit registry.
//!
//! Maps `(namespace, auid)` pairs to AU directories across the storage
//! roots. AU directory names are derived from the auid hash so arbitrary
//! auid text never reaches the file system; the auid itself is kept in an
//! `AUID` file inside the directory.

use crate::dir::{available_space, namespaces_dir, write_file_atomic};
use crate::error::{CoreError, CoreResult};
use crate::digest::to_hex;
use crate::types::{AuKey, Namespace};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File holding the verbatim auid inside an AU directory.
pub const AUID_FILE: &str = "AUID";

const AU_DIR_PREFIX: &str = "au-";

/// Directory name for `auid`: `au-` plus the first 16 bytes of its SHA-256.
#[must_use]
pub fn au_dir_name(auid: &str) -> String {
    let hash = Sha256::digest(auid.as_bytes());
    format!("{AU_DIR_PREFIX}{}", to_hex(&hash[..16]))
}

/// Validates and allocates storage directories per namespace and AU.
///
/// All operations are idempotent. The registry caches what it has seen;
/// [`discover`](Self::discover) loads everything already on disk.
#[derive(Debug)]
pub struct NamespaceRegistry {
    roots: Vec<PathBuf>,
    namespaces: RwLock<BTreeSet<Namespace>>,
    aus: RwLock<BTreeMap<AuKey, Vec<PathBuf>>>,
}

impl NamespaceRegistry {
    /// Creates a registry over `roots`; the first root is the primary.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            namespaces: RwLock::new(BTreeSet::new()),
            aus: RwLock::new(BTreeMap::new()),
        }
    }

    /// Storage roots, primary first.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Validates `name` and creates its directory under the primary root.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] before any I/O if `name` breaks the
    /// charset rule, or an I/O error if the directory cannot be created.
    pub fn init_namespace(&self, name: &str) -> CoreResult<Namespace> {
        let ns = Namespace::new(name)?;
        if self.namespaces.read().contains(&ns) {
            return Ok(ns);
        }
        let root = self.primary_root()?;
        fs::create_dir_all(namespaces_dir(root).join(ns.as_str()))?;
        if self.namespaces.write().insert(ns.clone()) {
            debug!(namespace = %ns, "initialized namespace");
        }
        Ok(ns)
    }

    /// Returns the AU's directories, creating one if none exists.
    ///
    /// A new AU is placed on the root with the most available space (ties go
    /// to the earlier root). Existing AU directories on any root are reused.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty auid, or an I/O error.
    pub fn init_au(&self, ns: &Namespace, auid: &str) -> CoreResult<Vec<PathBuf>> {
        let key = AuKey::new(ns.clone(), auid)?;
        if let Some(dirs) = self.aus.read().get(&key) {
            return Ok(dirs.clone());
        }
        self.init_namespace(ns.as_str())?;

        let mut aus = self.aus.write();
        if let Some(dirs) = aus.get(&key) {
            return Ok(dirs.clone());
        }

        let name = au_dir_name(auid);
        let mut dirs = Vec::new();
        for root in &self.roots {
            let dir = namespaces_dir(root).join(ns.as_str()).join(&name);
            if dir.is_dir() {
                check_auid(&dir, auid)?;
                dirs.push(dir);
            }
        }

        if dirs.is_empty() {
            let root = self.roomiest_root()?;
            let dir = namespaces_dir(root).join(ns.as_str()).join(&name);
            fs::create_dir_all(&dir)?;
            write_file_atomic(&dir.join(AUID_FILE), auid.as_bytes())?;
            info!(namespace = %ns, auid, dir = %dir.display(), "created archival unit");
            dirs.push(dir);
        }

        aus.insert(key, dirs.clone());
        Ok(dirs)
    }

    /// Cached directories of a known AU.
    #[must_use]
    pub fn au_dirs(&self, key: &AuKey) -> Option<Vec<PathBuf>> {
        self.aus.read().get(key).cloned()
    }

    /// Known namespaces.
    #[must_use]
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.namespaces.read().iter().cloned().collect()
    }

    /// Known AUs with their directories.
    #[must_use]
    pub fn aus(&self) -> BTreeMap<AuKey, Vec<PathBuf>> {
        self.aus.read().clone()
    }

    /// Scans every root for namespaces and AUs and caches them.
    ///
    /// Directories with invalid namespace names or without an `AUID` file
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be read.
    pub fn discover(&self) -> CoreResult<BTreeMap<AuKey, Vec<PathBuf>>> {
        let mut found: BTreeMap<AuKey, Vec<PathBuf>> = BTreeMap::new();
        let mut namespaces = BTreeSet::new();

        for root in &self.roots {
            for ns_dir in read_dirs(&namespaces_dir(root))? {
                let Some(ns) = file_name(&ns_dir).and_then(|n| Namespace::new(n).ok()) else {
                    warn!(dir = %ns_dir.display(), "skipping directory with invalid namespace name");
                    continue;
                };
                namespaces.insert(ns.clone());

                for au_dir in read_dirs(&ns_dir)? {
                    if !file_name(&au_dir).is_some_and(|n| n.starts_with(AU_DIR_PREFIX)) {
                        continue;
                    }
                    let auid = match fs::read_to_string(au_dir.join(AUID_FILE)) {
                        Ok(auid) if !auid.is_empty() => auid,
                        _ => {
                            warn!(dir = %au_dir.display(), "skipping AU directory without AUID");
                            continue;
                        }
                    };
                    let key = AuKey::new(ns.clone(), auid)?;
                    found.entry(key).or_default().push(au_dir);
                }
            }
        }

        self.namespaces.write().extend(namespaces);
        let mut aus = self.aus.write();
        for (key, dirs) in &found {
            aus.insert(key.clone(), dirs.clone());
        }
        Ok(found)
    }

    fn primary_root(&self) -> CoreResult<&Path> {
        self.roots
            .first()
            .map(PathBuf::as_path)
            .ok_or_else(|| CoreError::invalid_state("no storage roots configured"))
    }

    fn roomiest_root(&self) -> CoreResult<&Path> {
        let mut best: Option<(&Path, u64)> = None;
        for root in &self.roots {
            let space = available_space(root);
            if best.map_or(true, |(_, b)| space > b) {
                best = Some((root, space));
            }
        }
        best.map(|(root, _)| root)
            .ok_or_else(|| CoreError::invalid_state("no storage roots configured"))
    }
}

fn check_auid(dir: &Path, auid: &str) -> CoreResult<()> {
    match fs::read_to_string(dir.join(AUID_FILE)) {
        Ok(stored) if stored == auid => Ok(()),
        Ok(stored) => Err(CoreError::invalid_state(format!(
            "AU directory {} belongs to auid {stored:?}, not {auid:?}",
            dir.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            write_file_atomic(&dir.join(AUID_FILE), auid.as_bytes())
        }
        Err(e) => Err(e.into()),
    }
}

fn read_dirs(path: &Path) -> CoreResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
