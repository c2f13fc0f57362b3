//! Artifacts and artifact submissions.
//!
//! An [`Artifact`] is the durable, addressable view of one stored capture.
//! An [`ArtifactData`] is the ephemeral wrapper that carries content into
//! the store on add and back out on get.

mod data;
mod id;

pub use data::{ArtifactData, HttpStatus};
pub use id::ArtifactId;

use crate::error::CoreResult;
use crate::types::{AuKey, Namespace, StorageLocation};
use serde::{Deserialize, Serialize};

/// A captured, versioned resource record.
///
/// Once `committed` is true the content, hashes and length are frozen. A new
/// capture of the same URI produces a new artifact with a higher `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Unique identifier within the namespace.
    pub id: ArtifactId,
    /// Owning namespace.
    pub namespace: Namespace,
    /// Owning archival unit.
    pub auid: String,
    /// Target URI of the capture.
    pub uri: String,
    /// Capture version of `uri` within the AU, starting at 1.
    pub version: u32,
    /// Whether the artifact has been committed.
    pub committed: bool,
    /// `<algorithm>:<hex>` digest of the content bytes.
    pub content_hash: String,
    /// `<algorithm>:<hex>` digest of the header set.
    pub metadata_hash: String,
    /// Content length in bytes (headers excluded).
    pub content_length: u64,
    /// Capture time, milliseconds since the Unix epoch.
    pub content_datetime: i64,
    /// Where the framed record lives.
    pub location: StorageLocation,
}

impl Artifact {
    /// Returns the archival unit this artifact belongs to.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the auid is empty.
    pub fn au_key(&self) -> CoreResult<AuKey> {
        AuKey::new(self.namespace.clone(), self.auid.clone())
    }
}
