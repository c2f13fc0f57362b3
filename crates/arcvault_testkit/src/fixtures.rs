//! Test fixtures and store helpers.
//!
//! Provides temporary repositories that open, wait for readiness, and clean
//! up after themselves.

use arcvault_core::{
    au_dir_name, namespaces_dir, Artifact, ArtifactData, ArtifactStore, Config, CoreResult,
    Deadline,
};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// How long fixtures wait for startup recovery.
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration suited to tests: no fsync per append, small spool buffer.
#[must_use]
pub fn test_config() -> Config {
    Config::default()
        .sync_on_append(false)
        .spool_threshold(4 * 1024)
}

/// A store in a temporary directory, ready for use.
pub struct TestRepository {
    store: ArtifactStore,
    config: Config,
    dir: TempDir,
}

impl TestRepository {
    /// Opens a fresh repository with [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Opens a fresh repository with `config`.
    pub fn with_config(config: Config) -> Self {
        let dir = TempDir::new().expect("failed to create temp directory");
        Self::open_in(dir, config)
    }

    fn open_in(dir: TempDir, config: Config) -> Self {
        let store = open_ready(dir.path(), config.clone()).expect("failed to open store");
        Self { store, config, dir }
    }

    /// Primary storage root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The store.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Directory of an AU on the primary root.
    pub fn au_dir(&self, namespace: &str, auid: &str) -> PathBuf {
        namespaces_dir(self.path()).join(namespace).join(au_dir_name(auid))
    }

    /// Closes the store cleanly and opens it again on the same files.
    pub fn reopen(self) -> Self {
        let Self { store, config, dir } = self;
        store.close().expect("failed to close store");
        drop(store);
        Self::open_in(dir, config)
    }

    /// Closes the store, runs `damage` on the files, and opens it again.
    pub fn reopen_after<F>(self, damage: F) -> Self
    where
        F: FnOnce(&Path),
    {
        let Self { store, config, dir } = self;
        store.close().expect("failed to close store");
        drop(store);
        damage(dir.path());
        Self::open_in(dir, config)
    }

    /// Closes the store and hands back the directory without reopening.
    pub fn into_parts(self) -> (TempDir, Config) {
        let Self { store, config, dir } = self;
        store.close().expect("failed to close store");
        drop(store);
        (dir, config)
    }

    /// Stores `content` at `uri` and returns the uncommitted artifact.
    pub fn add(&self, namespace: &str, auid: &str, uri: &str, content: impl Into<Vec<u8>>) -> Artifact {
        self.store
            .add_artifact_data(ArtifactData::from_bytes(namespace, auid, uri, content))
            .expect("failed to add artifact")
    }

    /// Stores and commits `content` at `uri`.
    pub fn add_committed(&self, namespace: &str, auid: &str, uri: &str, content: impl Into<Vec<u8>>) -> Artifact {
        let artifact = self.add(namespace, auid, uri, content);
        self.store
            .commit_artifact_data(&artifact)
            .wait()
            .expect("failed to commit artifact")
    }

    /// Reads an artifact's content back.
    pub fn read(&self, artifact: &Artifact) -> Vec<u8> {
        self.store
            .get_artifact_data(artifact)
            .and_then(|mut data| data.read_content())
            .expect("failed to read artifact")
    }
}

impl Default for TestRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for TestRepository {
    type Target = ArtifactStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Opens a store and waits up to [`READY_TIMEOUT`] for it to become ready.
///
/// # Errors
///
/// Returns the open error, or the readiness failure.
pub fn open_ready(path: &Path, config: Config) -> CoreResult<ArtifactStore> {
    let store = ArtifactStore::open_with_config(path, config)?;
    store.wait_ready(Deadline::within(READY_TIMEOUT))?;
    Ok(store)
}

/// Runs a test against a temporary repository.
///
/// # Example
///
/// ```rust,ignore
/// use arcvault_testkit::with_temp_repo;
///
/// #[test]
/// fn my_test() {
///     with_temp_repo(|repo| {
///         let a = repo.add("ns", "au", "http://x/", "body");
///         assert_eq!(repo.read(&a), b"body");
///     });
/// }
/// ```
pub fn with_temp_repo<F, R>(f: F) -> R
where
    F: FnOnce(&TestRepository) -> R,
{
    let repo = TestRepository::new();
    f(&repo)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A repository holding `count` artifacts in one AU; every other one is
    /// committed. Returns the artifacts in insertion order.
    pub fn populated_repository(count: usize) -> (TestRepository, Vec<Artifact>) {
        let repo = TestRepository::new();
        let artifacts = (0..count)
            .map(|i| {
                let uri = format!("http://example.org/{i}");
                let body = format!("artifact body {i}");
                if i % 2 == 0 {
                    repo.add_committed("test", "au1", &uri, body)
                } else {
                    repo.add("test", "au1", &uri, body)
                }
            })
            .collect();
        (repo, artifacts)
    }

    /// A repository with one artifact in each of `au_count` AUs.
    pub fn multi_au_repository(au_count: usize) -> (TestRepository, Vec<Artifact>) {
        let repo = TestRepository::new();
        let artifacts = (0..au_count)
            .map(|i| repo.add("test", &format!("au{i}"), "http://example.org/", format!("au {i}")))
            .collect();
        (repo, artifacts)
    }
}
