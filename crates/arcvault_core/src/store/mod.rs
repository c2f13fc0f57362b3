//! The artifact store.
//!
//! [`ArtifactStore`] ties the engine together: it owns the storage roots,
//! the namespace registry, one [`AuHandle`] per archival unit, the readiness
//! gate and the background workers.
//!
//! Appends to one AU are serialized by that AU's lock; different AUs never
//! contend. `add` and `get` run on the caller's thread. `commit` and
//! `delete` write the state journal on a background worker and hand back a
//! [`PendingOp`].

mod au;
mod pending;
mod worker;

pub use pending::PendingOp;

use crate::artifact::{Artifact, ArtifactData, ArtifactId, HttpStatus};
use crate::config::Config;
use crate::dir::RootDir;
use crate::error::{CoreError, CoreResult};
use crate::namespace::NamespaceRegistry;
use crate::readiness::{Deadline, ReadinessGate};
use crate::record::{read_header_at, RecordEncoder, RecordType, RECORD_TERMINATOR};
use crate::reindex::{ArtifactIndex, ReindexReport, ReindexWalker};
use crate::segment::open_for_read;
use crate::stats::{StatsSnapshot, StoreStats};
use crate::types::{ArtifactState, AuKey, Namespace};
use arcvault_storage::StorageBackend;
use au::AuHandle;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use worker::WorkerPool;

/// The artifact storage engine.
///
/// # Opening a store
///
/// ```rust,ignore
/// use arcvault_core::{ArtifactData, ArtifactStore, Config, Deadline};
/// use std::time::Duration;
///
/// let store = ArtifactStore::open_with_config(path, Config::default())?;
/// store.wait_ready(Deadline::within(Duration::from_secs(30)))?;
///
/// let artifact = store.add_artifact_data(ArtifactData::from_bytes(
///     "test", "au1", "http://x/y", "hello",
/// ))?;
/// let artifact = store.commit_artifact_data(&artifact).wait()?;
/// assert!(artifact.committed);
///
/// store.close()?;
/// ```
///
/// `open` returns before startup recovery has finished. Until the gate opens
/// every operation except [`is_ready`](Self::is_ready),
/// [`wait_ready`](Self::wait_ready), [`stats`](Self::stats) and
/// [`close`](Self::close) fails with [`CoreError::NotReady`].
pub struct ArtifactStore {
    inner: Arc<StoreInner>,
    workers: Mutex<WorkerPool>,
}

struct StoreInner {
    config: Config,
    /// Holds the root locks for the store's lifetime.
    _roots: Vec<RootDir>,
    registry: NamespaceRegistry,
    encoder: RecordEncoder,
    aus: RwLock<HashMap<AuKey, Arc<AuHandle>>>,
    /// Serializes first use of an AU; never held together with `aus`.
    creating: Mutex<()>,
    gate: ReadinessGate,
    stats: StoreStats,
    open: AtomicBool,
}

impl ArtifactStore {
    /// Opens the store rooted at `path` with default configuration.
    ///
    /// # Errors
    ///
    /// See [`open_with_config`](Self::open_with_config).
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens the store rooted at `path` plus any configured extra roots.
    ///
    /// Every root is locked, then recovery is handed to a background worker
    /// and the store is returned at once. Wait on
    /// [`wait_ready`](Self::wait_ready) before using it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RepositoryLocked`] if another process holds a
    /// root, [`CoreError::NotFound`] for a missing root when
    /// `create_if_missing` is false, or an I/O error.
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let mut roots = Vec::with_capacity(1 + config.extra_roots.len());
        roots.push(RootDir::open(path, config.create_if_missing)?);
        for extra in &config.extra_roots {
            roots.push(RootDir::open(extra, config.create_if_missing)?);
        }

        let registry = NamespaceRegistry::new(roots.iter().map(|r| r.path().to_path_buf()).collect());
        let workers = WorkerPool::new(config.worker_threads)?;
        let inner = Arc::new(StoreInner {
            encoder: RecordEncoder::from_config(&config),
            gate: ReadinessGate::new(config.readiness_poll_cap),
            config,
            _roots: roots,
            registry,
            aus: RwLock::new(HashMap::new()),
            creating: Mutex::new(()),
            stats: StoreStats::new(),
            open: AtomicBool::new(true),
        });

        info!(root = %path.display(), "opening artifact store");
        let recovery = Arc::clone(&inner);
        // The gate carries the outcome, even if recovery unwinds.
        let _ = workers.submit(move || {
            recovery.recover();
            Ok(())
        });

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
        })
    }

    /// Whether startup recovery has finished.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_ready()
    }

    /// Blocks until the store is ready or `deadline` passes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Timeout`] at the deadline, or
    /// [`CoreError::Interrupted`] if recovery failed or the store closed.
    pub fn wait_ready(&self, deadline: Deadline) -> CoreResult<()> {
        self.inner.gate.wait_ready(deadline)
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Storage roots, primary first.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        self.inner.registry.roots()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Known namespaces.
    #[must_use]
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.inner.registry.namespaces()
    }

    /// Known archival units.
    #[must_use]
    pub fn aus(&self) -> Vec<AuKey> {
        let mut keys: Vec<_> = self.inner.aus.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Creates a namespace. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a bad name, before any I/O.
    pub fn init_namespace(&self, namespace: &str) -> CoreResult<Namespace> {
        Namespace::validate(namespace).map_err(|e| self.inner.failed(e))?;
        self.inner.usable()?;
        self.inner
            .registry
            .init_namespace(namespace)
            .map_err(|e| self.inner.failed(e))
    }

    /// Creates an archival unit and returns its directories. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for a bad namespace or empty auid.
    pub fn init_au(&self, namespace: &str, auid: &str) -> CoreResult<Vec<PathBuf>> {
        let key = au_key(namespace, auid).map_err(|e| self.inner.failed(e))?;
        self.inner.usable()?;
        self.inner
            .au_handle(&key)
            .map(|handle| handle.dirs().to_vec())
            .map_err(|e| self.inner.failed(e))
    }

    /// Stores one artifact, draining `data`'s content exactly once.
    ///
    /// The artifact comes back uncommitted, with its version and location.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad submission, or the I/O error of
    /// a failed append; the segment is left at its previous record boundary.
    pub fn add_artifact_data(&self, data: ArtifactData) -> CoreResult<Artifact> {
        self.inner.usable()?;
        self.inner.add(data).map_err(|e| self.inner.failed(e))
    }

    /// Reads an artifact back, with a content stream at the first byte.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the artifact is unknown, deleted, or
    /// its location does not resolve; an I/O error if reading fails.
    pub fn get_artifact_data(&self, artifact: &Artifact) -> CoreResult<ArtifactData> {
        self.inner.usable()?;
        self.inner.get(artifact).map_err(|e| self.inner.failed(e))
    }

    /// Commits an artifact on a background worker.
    ///
    /// Committing a committed artifact resolves to it unchanged. Every
    /// failure, readiness included, arrives through the returned operation.
    pub fn commit_artifact_data(&self, artifact: &Artifact) -> PendingOp<Artifact> {
        if let Err(e) = self.inner.usable() {
            return PendingOp::ready(Err(e));
        }
        let inner = Arc::clone(&self.inner);
        let key = artifact.au_key();
        let id = artifact.id;
        self.workers.lock().submit(move || {
            let key = key.map_err(|e| inner.failed(e))?;
            inner.commit(&key, &id).map_err(|e| inner.failed(e))
        })
    }

    /// Removes an artifact from view on a background worker.
    ///
    /// Deleting an unknown or already deleted artifact succeeds. Segment
    /// bytes are not reclaimed.
    pub fn delete_artifact_data(&self, artifact: &Artifact) -> PendingOp<()> {
        if let Err(e) = self.inner.usable() {
            return PendingOp::ready(Err(e));
        }
        let inner = Arc::clone(&self.inner);
        let key = artifact.au_key();
        let id = artifact.id;
        self.workers.lock().submit(move || {
            let key = key.map_err(|e| inner.failed(e))?;
            inner.delete(&key, &id).map_err(|e| inner.failed(e))
        })
    }

    /// Rescans every AU and upserts each live artifact into `index`.
    ///
    /// Runs beside live traffic: each AU is read up to the extent it had when
    /// the walk reached it. Deleted artifacts are left out.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error or index failure.
    pub fn reindex_artifacts(&self, index: &dyn ArtifactIndex) -> CoreResult<ReindexReport> {
        self.inner.usable()?;
        self.inner.reindex(index).map_err(|e| self.inner.failed(e))
    }

    /// Total bytes of all segments of an AU, the active one included.
    ///
    /// An AU that was never written reports zero.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad key, or an I/O error.
    pub fn au_warc_size(&self, namespace: &str, auid: &str) -> CoreResult<u64> {
        let key = au_key(namespace, auid).map_err(|e| self.inner.failed(e))?;
        self.inner.usable()?;
        match self.inner.find_handle(&key) {
            Some(handle) => handle.warc_size().map_err(|e| self.inner.failed(e)),
            None => Ok(0),
        }
    }

    /// Closes the store: waits for background work and finalizes segments.
    ///
    /// Later calls are no-ops; other operations fail with
    /// [`CoreError::StoreClosed`].
    ///
    /// Called from inside a tokio runtime, `close` cannot block on the
    /// worker pool, so commits and deletes already running may append to
    /// their journals after it returns. Async callers that need every
    /// pending operation settled should await their [`PendingOp`]s first,
    /// or call `close` through `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    ///
    /// Returns the first error from finalizing a segment.
    pub fn close(&self) -> CoreResult<()> {
        if !self.inner.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.gate.abort("artifact store closed");
        self.workers.lock().shutdown();

        let mut first_error = None;
        for handle in self.inner.aus.read().values() {
            if let Err(e) = handle.finalize() {
                error!(au = %handle.key(), error = %e, "failed to finalize segment on close");
                first_error.get_or_insert(e);
            }
        }
        info!("artifact store closed");
        first_error.map_or(Ok(()), Err)
    }

    /// Whether [`close`](Self::close) has not been called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("roots", &self.roots())
            .field("ready", &self.is_ready())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Drop for ArtifactStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "error closing artifact store");
        }
    }
}

impl StoreInner {
    fn usable(&self) -> CoreResult<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(CoreError::StoreClosed);
        }
        self.gate.check()
    }

    fn failed(&self, e: CoreError) -> CoreError {
        self.stats.record_error();
        e
    }

    /// Startup recovery; resolves the readiness gate either way.
    fn recover(&self) {
        let _unresolved = self.gate.abort_guard("startup recovery did not finish");
        let started = Instant::now();
        match self.open_existing() {
            Ok(count) => {
                info!(
                    aus = count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "recovery complete"
                );
                self.gate.mark_ready();
            }
            Err(e) => {
                error!(error = %e, "startup recovery failed");
                self.stats.record_error();
                self.gate.abort(format!("startup recovery failed: {e}"));
            }
        }
    }

    fn open_existing(&self) -> CoreResult<usize> {
        let mut opened = HashMap::new();
        for (key, dirs) in self.registry.discover()? {
            let handle = AuHandle::open(key.clone(), dirs, &self.config)?;
            opened.insert(key, Arc::new(handle));
        }
        let count = opened.len();
        self.aus.write().extend(opened);
        Ok(count)
    }

    fn find_handle(&self, key: &AuKey) -> Option<Arc<AuHandle>> {
        self.aus.read().get(key).cloned()
    }

    /// Handle for `key`, creating the AU on first use.
    fn au_handle(&self, key: &AuKey) -> CoreResult<Arc<AuHandle>> {
        if let Some(handle) = self.find_handle(key) {
            return Ok(handle);
        }
        let _creating = self.creating.lock();
        if let Some(handle) = self.find_handle(key) {
            return Ok(handle);
        }
        let dirs = self.registry.init_au(&key.namespace, &key.auid)?;
        let handle = Arc::new(AuHandle::open(key.clone(), dirs, &self.config)?);
        let mut aus = self.aus.write();
        Ok(Arc::clone(aus.entry(key.clone()).or_insert(handle)))
    }

    fn add(&self, data: ArtifactData) -> CoreResult<Artifact> {
        // Drain and digest the content before taking the AU lock.
        let mut record = self.encoder.encode(data)?;
        let handle = self.au_handle(record.key())?;

        let mut state = handle.lock();
        let version = state.next_version(record.uri());
        let header = record.header_block(version)?;
        let framed = record.framed_length(header.len());
        if state.writer.check_size(framed)? {
            self.stats.record_rollover();
        }
        let location = state.writer.append_with(&header, &mut record.body())?;
        let artifact = record.to_artifact(version, location);
        state.insert(artifact.clone(), ArtifactState::Created);
        drop(state);

        self.stats.record_add(framed);
        debug!(
            au = %handle.key(),
            id = %artifact.id,
            uri = %artifact.uri,
            version,
            length = artifact.content_length,
            "added artifact"
        );
        Ok(artifact)
    }

    fn get(&self, artifact: &Artifact) -> CoreResult<ArtifactData> {
        let key = artifact.au_key()?;
        let id = artifact.id;
        let handle = self
            .find_handle(&key)
            .ok_or_else(|| CoreError::not_found(format!("artifact {id}")))?;
        let state = handle
            .lock()
            .entry(&id)
            .map(|e| e.state)
            .ok_or_else(|| CoreError::not_found(format!("artifact {id}")))?;
        if state.is_deleted() {
            return Err(CoreError::not_found(format!("artifact {id} is deleted")));
        }

        let location = &artifact.location;
        let backend = open_for_read(&location.path)?;
        if location.offset.saturating_add(location.length) > backend.size()? {
            return Err(CoreError::not_found(format!(
                "location {location} lies past the end of its segment"
            )));
        }
        let (header, header_len) = read_header_at(&backend, location.offset, location.length)?;
        if header.record_id != id || !header.record_type.is_artifact() {
            return Err(CoreError::not_found(format!(
                "location {location} does not hold artifact {id}"
            )));
        }
        let framed = header_len
            .checked_add(header.block_length)
            .and_then(|n| n.checked_add(RECORD_TERMINATOR.len() as u64));
        if framed != Some(location.length) {
            return Err(CoreError::segment_corruption(format!(
                "record at {location} declares {} block bytes",
                header.block_length
            )));
        }

        let block_offset = location.offset + header_len;
        let (http_status, headers) = match header.record_type {
            RecordType::Response => {
                let head_len = usize::try_from(header.payload_offset())
                    .map_err(|_| CoreError::segment_corruption("HTTP head too large"))?;
                parse_http_head(&backend.read_at(block_offset, head_len)?)?
            }
            _ => (None, header.extra_headers.clone()),
        };

        let payload_len = header.payload_len();
        let content = backend.into_reader(block_offset + header.payload_offset(), payload_len)?;
        let mut data = ArtifactData::new(
            key.namespace.as_str(),
            key.auid.as_str(),
            header.target_uri.as_str(),
            content,
        );
        data.http_status = http_status;
        data.headers = headers;
        data.collection_date = header.capture_millis;
        data.capture_ip = header.ip_address.as_deref().and_then(|ip| ip.parse().ok());
        data.artifact_id = Some(id);
        data.version = header.version;
        data.content_length = Some(payload_len);
        data.content_digest = header.payload_digest;
        data.state = Some(state);

        self.stats.record_read(payload_len);
        Ok(data)
    }

    fn commit(&self, key: &AuKey, id: &ArtifactId) -> CoreResult<Artifact> {
        let handle = self
            .find_handle(key)
            .ok_or_else(|| CoreError::not_found(format!("artifact {id}")))?;
        let (artifact, changed) = handle.lock().commit(id)?;
        if changed {
            self.stats.record_commit();
            debug!(au = %key, %id, "committed artifact");
        }
        Ok(artifact)
    }

    fn delete(&self, key: &AuKey, id: &ArtifactId) -> CoreResult<()> {
        let Some(handle) = self.find_handle(key) else {
            return Ok(());
        };
        if handle.lock().delete(id)? {
            self.stats.record_delete();
            debug!(au = %key, %id, "deleted artifact");
        }
        Ok(())
    }

    fn reindex(&self, index: &dyn ArtifactIndex) -> CoreResult<ReindexReport> {
        let mut handles: Vec<_> = self.aus.read().values().cloned().collect();
        handles.sort_by(|a, b| a.key().cmp(b.key()));

        let walker = ReindexWalker::new(self.config.segment_prefix.clone());
        let mut report = ReindexReport::default();
        for handle in handles {
            let snapshot = handle.snapshot()?;
            let walked = walker.walk_snapshot(&snapshot, |artifact, _| index.upsert(&artifact))?;
            self.stats.record_reindexed(walked.artifacts_indexed);
            report.merge(&walked);
        }
        info!(
            aus = report.aus,
            artifacts = report.artifacts_indexed,
            torn = report.torn_tails,
            corrupt = report.corrupt_segments,
            "reindex complete"
        );
        Ok(report)
    }
}

fn au_key(namespace: &str, auid: &str) -> CoreResult<AuKey> {
    AuKey::new(Namespace::new(namespace)?, auid)
}

/// Splits a stored HTTP head into its status line and headers.
fn parse_http_head(head: &[u8]) -> CoreResult<(Option<HttpStatus>, Vec<(String, String)>)> {
    let text = std::str::from_utf8(head)
        .map_err(|_| CoreError::segment_corruption("HTTP head is not UTF-8"))?;
    let mut lines = text.split("\r\n");
    let status = lines
        .next()
        .and_then(HttpStatus::parse)
        .ok_or_else(|| CoreError::segment_corruption("missing HTTP status line"))?;
    let mut headers = Vec::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| CoreError::segment_corruption(format!("bad HTTP header line {line:?}")))?;
        headers.push((name.to_string(), value.strip_prefix(' ').unwrap_or(value).to_string()));
    }
    Ok((Some(status), headers))
}
