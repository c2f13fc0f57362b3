//! Segment file naming.
//!
//! `{prefix}-{yyyyMMddHHmmssSSS}-{serial:05}.warc`, plus `.open` while the
//! segment is being written.

use chrono::Utc;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Extension of a finalized segment.
pub const SEGMENT_EXTENSION: &str = ".warc";

/// Marker suffix of a segment still being written.
pub const IN_PROGRESS_SUFFIX: &str = ".open";

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Parsed segment file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentName {
    prefix: String,
    timestamp: String,
    serial: u64,
}

impl SegmentName {
    /// Allocates a fresh name using the current time and the next serial.
    ///
    /// Serials increase monotonically across the whole process.
    #[must_use]
    pub fn next(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            timestamp: Utc::now().format("%Y%m%d%H%M%S%3f").to_string(),
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Parses a file name, finalized or in-progress.
    ///
    /// Returns the name and whether it carries the in-progress marker.
    #[must_use]
    pub fn parse(file_name: &str) -> Option<(Self, bool)> {
        let (base, in_progress) = match file_name.strip_suffix(IN_PROGRESS_SUFFIX) {
            Some(base) => (base, true),
            None => (file_name, false),
        };
        let stem = base.strip_suffix(SEGMENT_EXTENSION)?;
        let mut parts = stem.rsplitn(3, '-');
        let serial = parts.next()?;
        let timestamp = parts.next()?;
        let prefix = parts.next()?;

        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if prefix.is_empty() || timestamp.len() != 17 || !digits(timestamp) || !digits(serial) {
            return None;
        }
        Some((
            Self {
                prefix: prefix.to_string(),
                timestamp: timestamp.to_string(),
                serial: serial.parse().ok()?,
            },
            in_progress,
        ))
    }

    /// Name prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 17-digit creation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Per-process serial.
    #[must_use]
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    /// Finalized file name.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{:05}{SEGMENT_EXTENSION}",
            self.prefix, self.timestamp, self.serial
        )
    }

    /// In-progress file name.
    #[must_use]
    pub fn open_file_name(&self) -> String {
        format!("{}{IN_PROGRESS_SUFFIX}", self.file_name())
    }
}

impl Ord for SegmentName {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.serial.cmp(&other.serial))
            .then_with(|| self.prefix.cmp(&other.prefix))
    }
}

impl PartialOrd for SegmentName {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_names_follow_template() {
        let a = SegmentName::next("artifacts");
        let b = SegmentName::next("artifacts");
        assert!(b.serial() > a.serial());
        assert!(a < b);
        assert_eq!(a.timestamp().len(), 17);

        let file = a.file_name();
        assert!(file.starts_with("artifacts-"));
        assert!(file.ends_with(".warc"));
        assert_eq!(SegmentName::parse(&file), Some((a.clone(), false)));
        assert_eq!(SegmentName::parse(&a.open_file_name()), Some((a, true)));
    }

    #[test]
    fn prefix_may_contain_dashes() {
        let (name, open) =
            SegmentName::parse("my-crawl-20261016120000123-00042.warc.open").unwrap();
        assert!(open);
        assert_eq!(name.prefix(), "my-crawl");
        assert_eq!(name.serial(), 42);
    }

    #[test]
    fn rejects_foreign_files() {
        for name in [
            "journal.warc",
            "AUID",
            "artifacts-2026-00001.warc",
            "artifacts-20261016120000123-00001.txt",
            "-20261016120000123-00001.warc",
            "artifacts-20261016120000123-.warc",
        ] {
            assert!(SegmentName::parse(name).is_none(), "{name}");
        }
    }
}
