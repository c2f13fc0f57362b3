//! Artifact identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an artifact.
///
/// Artifact IDs are UUIDv7 values, so they sort by creation time. The same
/// value is written as the record's `WARC-Record-ID`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    /// Creates a new time-ordered artifact ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates an artifact ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Renders the ID as a `WARC-Record-ID` value.
    #[must_use]
    pub fn to_record_id(&self) -> String {
        format!("<urn:uuid:{}>", self.0)
    }

    /// Parses a `WARC-Record-ID` value (`<urn:uuid:...>`) or a bare UUID.
    #[must_use]
    pub fn parse_record_id(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        let inner = trimmed
            .strip_prefix('<')
            .and_then(|v| v.strip_suffix('>'))
            .unwrap_or(trimmed);
        let bare = inner.strip_prefix("urn:uuid:").unwrap_or(inner);
        Uuid::parse_str(bare).ok().map(Self)
    }
}

impl Default for ArtifactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArtifactId({})", self.0)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ArtifactId {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_unique_and_time_ordered() {
        let first = ArtifactId::new();
        let second = ArtifactId::new();
        assert_ne!(first, second);
        assert!(first < second);
    }

    #[test]
    fn record_id_roundtrip() {
        let id = ArtifactId::new();
        let rendered = id.to_record_id();
        assert!(rendered.starts_with("<urn:uuid:"));
        assert_eq!(ArtifactId::parse_record_id(&rendered), Some(id));
        assert_eq!(ArtifactId::parse_record_id(&id.to_string()), Some(id));
        assert_eq!(ArtifactId::parse_record_id("<urn:uuid:nope>"), None);
    }
}
