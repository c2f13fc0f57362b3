//! Error types for the arcvault engine.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in arcvault core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] arcvault_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Arguments were rejected before any I/O was attempted.
    #[error("validation failed: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// A location or artifact does not resolve to readable bytes.
    #[error("not found: {what}")]
    NotFound {
        /// What could not be found.
        what: String,
    },

    /// A segment or journal holds bytes that are not a well-formed record.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The requested state transition is not allowed.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the transition was refused.
        message: String,
    },

    /// The store has not finished startup recovery.
    #[error("artifact store is not ready")]
    NotReady,

    /// A readiness wait ran past its deadline.
    #[error("timed out after {waited:?} waiting for readiness")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// A wait was interrupted; the condition it waited for will never hold.
    #[error("interrupted: {reason}")]
    Interrupted {
        /// Why the wait was aborted.
        reason: String,
    },

    /// Another process holds a storage root.
    #[error("storage root locked: another process has exclusive access")]
    RepositoryLocked,

    /// The store has been closed.
    #[error("artifact store is closed")]
    StoreClosed,

    /// The background worker pool went away before the operation resolved.
    #[error("background worker unavailable")]
    WorkerUnavailable,

    /// Journal payload could not be (de)serialized.
    #[error("journal encoding error: {0}")]
    Journal(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an interrupted error.
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            reason: reason.into(),
        }
    }

    /// Returns true for "gone" as opposed to "broken".
    ///
    /// A storage error whose cause is a missing file counts as not found.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Storage(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if the input was rejected before any I/O.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns true if a readiness deadline expired.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Maps a missing-file storage error to [`CoreError::NotFound`].
    pub(crate) fn or_not_found(self, what: impl FnOnce() -> String) -> Self {
        if self.is_not_found() {
            Self::not_found(what())
        } else {
            self
        }
    }
}
