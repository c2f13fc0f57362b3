//! CLI command implementations.

pub mod inspect;
pub mod reindex;
pub mod verify;

use arcvault_core::{namespaces_dir, AuKey, CoreError, NamespaceRegistry};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No repository layout under the given root.
    #[error("no arcvault repository found at {0}")]
    NoRepository(PathBuf),

    /// Verification found damage.
    #[error("verification failed: {0} problem(s) found")]
    VerificationFailed(usize),

    /// Error from the storage engine.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error writing output.
    #[error(transparent)]
    Output(#[from] serde_json::Error),
}

/// An on-disk repository opened for offline inspection.
pub struct Repository {
    registry: NamespaceRegistry,
    prefix: String,
}

impl Repository {
    /// Checks that the primary root holds a repository.
    pub fn open(roots: Vec<PathBuf>, prefix: String) -> Result<Self, CliError> {
        let primary = roots.first().cloned().unwrap_or_default();
        if roots.is_empty() || !namespaces_dir(&primary).is_dir() {
            return Err(CliError::NoRepository(primary));
        }
        Ok(Self {
            registry: NamespaceRegistry::new(roots),
            prefix,
        })
    }

    /// Every AU on disk, with its directories.
    pub fn aus(&self) -> Result<BTreeMap<AuKey, Vec<PathBuf>>, CliError> {
        Ok(self.registry.discover()?)
    }

    /// Root paths, primary first.
    pub fn roots(&self) -> &[PathBuf] {
        self.registry.roots()
    }

    /// Registry over the repository's roots.
    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// Segment file name prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}
