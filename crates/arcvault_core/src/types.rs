//! Core type definitions for arcvault.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A validated namespace identifier.
///
/// Namespaces match `[A-Za-z0-9][A-Za-z0-9.-]*`: non-empty, never starting
/// with `.` or `-`. Validation happens on construction, before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(String);

impl Namespace {
    /// Validates `name` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if `name` breaks the charset rule.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Checks `name` against the namespace charset rule.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] describing the first violation.
    pub fn validate(name: &str) -> CoreResult<()> {
        let mut chars = name.chars();
        let Some(first) = chars.next() else {
            return Err(CoreError::validation("namespace must not be empty"));
        };
        if !first.is_ascii_alphanumeric() {
            return Err(CoreError::validation(format!(
                "namespace {name:?} must start with a letter or digit"
            )));
        }
        if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '-')) {
            return Err(CoreError::validation(format!(
                "namespace {name:?} contains invalid character {bad:?}"
            )));
        }
        Ok(())
    }

    /// Returns the namespace as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Namespace {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        Self::new(value)
    }
}

impl From<Namespace> for String {
    fn from(ns: Namespace) -> Self {
        ns.0
    }
}

/// Identifies one archival unit inside one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AuKey {
    /// Owning namespace.
    pub namespace: Namespace,
    /// Archival unit identifier.
    pub auid: String,
}

impl AuKey {
    /// Creates a key, rejecting an empty auid.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if `auid` is empty.
    pub fn new(namespace: Namespace, auid: impl Into<String>) -> CoreResult<Self> {
        let auid = auid.into();
        if auid.is_empty() {
            return Err(CoreError::validation("auid must not be empty"));
        }
        Ok(Self { namespace, auid })
    }
}

impl fmt::Display for AuKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.auid)
    }
}

/// Where a record lives: the finalized segment path, byte offset and length
/// of the whole framed record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLocation {
    /// Segment path (always the finalized name).
    pub path: PathBuf,
    /// Offset of the first byte of the record.
    pub offset: u64,
    /// Length of the framed record, separator included.
    pub length: u64,
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}+{}", self.path.display(), self.offset, self.length)
    }
}

/// Lifecycle state of an artifact.
///
/// `Created -> Committed` via commit; `Created | Committed -> Deleted` via
/// delete. Nothing leaves `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactState {
    /// Stored but not yet committed.
    Created,
    /// Committed; content is frozen.
    Committed,
    /// Logically removed.
    Deleted,
}

impl ArtifactState {
    /// Returns true if no further transition is possible except delete.
    #[must_use]
    pub const fn is_committed(self) -> bool {
        matches!(self, Self::Committed)
    }

    /// Returns true if the artifact is no longer visible.
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        matches!(self, Self::Deleted)
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Committed => "committed",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}
