//! Store configuration.

use crate::digest::{DigestAlgorithm, Sha256Digest};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for opening an artifact store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create storage roots that don't exist.
    pub create_if_missing: bool,

    /// Additional storage roots beyond the primary one.
    pub extra_roots: Vec<PathBuf>,

    /// Size at which the active segment is finalized and a new one started.
    pub max_segment_size: u64,

    /// File name prefix for segments.
    pub segment_prefix: String,

    /// Whether to fsync after every append (safer but slower).
    pub sync_on_append: bool,

    /// Maximum background worker threads for commit, delete and recovery.
    pub worker_threads: usize,

    /// Upper bound on a single readiness wait interval.
    pub readiness_poll_cap: Duration,

    /// Content larger than this is spooled to a temp file while encoding.
    pub spool_threshold: usize,

    /// Capture IP recorded when a submission carries none.
    pub default_capture_ip: IpAddr,

    /// Digest algorithm for content and metadata hashes.
    pub digest: Arc<dyn DigestAlgorithm>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            extra_roots: Vec::new(),
            max_segment_size: 1024 * 1024 * 1024, // 1 GiB
            segment_prefix: "artifacts".to_string(),
            sync_on_append: true,
            worker_threads: 2,
            readiness_poll_cap: Duration::from_millis(5000),
            spool_threshold: 1024 * 1024, // 1 MiB
            default_capture_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            digest: Arc::new(Sha256Digest),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create missing storage roots.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Adds a storage root.
    #[must_use]
    pub fn extra_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.extra_roots.push(root.into());
        self
    }

    /// Sets the segment rollover size.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u64) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the segment file name prefix.
    #[must_use]
    pub fn segment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.segment_prefix = prefix.into();
        self
    }

    /// Sets whether to fsync after every append.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Sets the background worker thread count.
    #[must_use]
    pub const fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Sets the readiness wait interval cap.
    #[must_use]
    pub const fn readiness_poll_cap(mut self, cap: Duration) -> Self {
        self.readiness_poll_cap = cap;
        self
    }

    /// Sets the in-memory spool threshold.
    #[must_use]
    pub const fn spool_threshold(mut self, bytes: usize) -> Self {
        self.spool_threshold = bytes;
        self
    }

    /// Sets the fallback capture IP.
    #[must_use]
    pub const fn default_capture_ip(mut self, ip: IpAddr) -> Self {
        self.default_capture_ip = ip;
        self
    }

    /// Sets the digest algorithm.
    #[must_use]
    pub fn digest(mut self, digest: Arc<dyn DigestAlgorithm>) -> Self {
        self.digest = digest;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Sha512Digest;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_append);
        assert_eq!(config.max_segment_size, 1 << 30);
        assert_eq!(config.segment_prefix, "artifacts");
        assert_eq!(config.readiness_poll_cap, Duration::from_secs(5));
        assert_eq!(config.digest.name(), "sha256");
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .sync_on_append(false)
            .max_segment_size(1024)
            .extra_root("/mnt/b")
            .digest(Arc::new(Sha512Digest));

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_append);
        assert_eq!(config.max_segment_size, 1024);
        assert_eq!(config.extra_roots, vec![PathBuf::from("/mnt/b")]);
        assert_eq!(config.digest.name(), "sha512");
    }
}
