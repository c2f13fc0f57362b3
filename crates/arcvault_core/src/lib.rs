//! # arcvault core
//!
//! Artifact storage engine for a content-preservation repository.
//!
//! Captured resources ("artifacts") are grouped by namespace and archival
//! unit (AU) and appended to WARC-style segment files. This crate provides:
//! - [`NamespaceRegistry`] - namespace validation and AU directory allocation
//! - [`RecordEncoder`] - record framing with streaming content digests
//! - [`SegmentWriter`] - append-only segments with size-based rollover
//! - [`ArtifactStore`] - the add/get/commit/delete/reindex lifecycle
//! - [`ReindexWalker`] - index reconstruction from durable storage
//! - [`ReadinessGate`] - startup recovery signalling with bounded waits
//!
//! ## Example
//!
//! ```rust,ignore
//! use arcvault_core::{ArtifactData, ArtifactStore, Deadline};
//! use std::time::Duration;
//!
//! let store = ArtifactStore::open(path)?;
//! store.wait_ready(Deadline::within(Duration::from_secs(30)))?;
//!
//! let artifact = store.add_artifact_data(ArtifactData::from_bytes(
//!     "test", "au1", "http://x/y", "hello",
//! ))?;
//! let artifact = store.commit_artifact_data(&artifact).wait()?;
//! let mut data = store.get_artifact_data(&artifact)?;
//! assert_eq!(data.read_content()?, b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod artifact;
mod config;
mod digest;
mod dir;
mod error;
mod journal;
mod namespace;
mod readiness;
mod record;
mod reindex;
mod segment;
mod stats;
mod store;
mod types;

pub use artifact::{Artifact, ArtifactData, ArtifactId, HttpStatus};
pub use config::Config;
pub use digest::{
    digest_by_name, digest_bytes, format_digest, split_digest, to_hex, DigestAlgorithm,
    DigestState, DigestingReader, Sha256Digest, Sha512Digest,
};
pub use dir::{namespaces_dir, RootDir};
pub use error::{CoreError, CoreResult};
pub use journal::{read_journal, replay, JournalEntry, JournalScan, JOURNAL_FILE};
pub use namespace::{au_dir_name, NamespaceRegistry, AUID_FILE};
pub use readiness::{AbortGuard, Deadline, ReadinessGate};
pub use record::{
    digest_payload, read_block, read_header_at, EncodedRecord, RecordEncoder, RecordHeader,
    RecordScanner, RecordType, ScannedRecord, MAX_HEADER_SIZE, RECORD_TERMINATOR,
};
pub use reindex::{ArtifactIndex, AuSnapshot, InMemoryIndex, ReindexReport, ReindexWalker};
pub use segment::{
    in_progress_path, list_segments, open_for_read, SegmentFile, SegmentName, SegmentWriter,
    IN_PROGRESS_SUFFIX, SEGMENT_EXTENSION,
};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{ArtifactStore, PendingOp};
pub use types::{ArtifactState, AuKey, Namespace, StorageLocation};
