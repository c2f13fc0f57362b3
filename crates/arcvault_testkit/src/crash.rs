//! Crash recovery testing for arcvault.
//!
//! A process crash leaves three kinds of damage behind: a segment still
//! carrying its `.open` marker, a record cut off part way through, and a
//! journal whose last entry is incomplete. The helpers here reproduce that
//! damage on a cleanly closed repository so that reopening it exercises the
//! same recovery path a real crash would.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use arcvault_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! harness.run_all_tests();
//! assert!(harness.all_passed(), "{}", harness.summary());
//! ```

use crate::fixtures::{test_config, TestRepository};
use arcvault_core::{
    in_progress_path, list_segments, ArtifactData, ArtifactId, CoreError, InMemoryIndex, RecordHeader,
    RecordType, SegmentFile, JOURNAL_FILE,
};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const TORN_DATE: &str = "20240101000000";

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected live artifacts after recovery.
    pub expected_artifacts: usize,
    /// Actual live artifacts after recovery.
    pub actual_artifacts: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, artifacts: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_artifacts: artifacts,
            actual_artifacts: artifacts,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_artifacts: expected,
            actual_artifacts: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Segments of one AU directory, in name order.
pub fn au_segments(au_dir: &Path, prefix: &str) -> Vec<SegmentFile> {
    list_segments(au_dir, prefix).expect("failed to list segments")
}

/// Final path of the newest segment in an AU directory.
pub fn last_segment(au_dir: &Path, prefix: &str) -> PathBuf {
    au_segments(au_dir, prefix)
        .pop()
        .map(|segment| segment.final_path)
        .expect("AU has no segments")
}

/// Puts the `.open` marker back on a finalized segment, as if the process
/// died before closing it. Returns the in-progress path.
pub fn mark_in_progress(final_path: &Path) -> PathBuf {
    let open = in_progress_path(final_path);
    fs::rename(final_path, &open).expect("failed to rename segment");
    open
}

/// Appends a record whose header promises more bytes than follow it.
pub fn append_torn_record(path: &Path) {
    append_record_declaring(path, 1000, b"only a few bytes");
}

/// Appends a well-formed header declaring `declared` block bytes, followed
/// by `body` and nothing else.
pub fn append_record_declaring(path: &Path, declared: u64, body: &[u8]) {
    let header = RecordHeader::new(
        RecordType::Resource,
        ArtifactId::new(),
        "http://torn.example.org/",
        TORN_DATE,
        "application/octet-stream",
        declared,
    )
    .render()
    .expect("failed to render header");
    append_bytes(path, &header);
    append_bytes(path, body);
}

/// Appends bytes that are not a record at all.
pub fn append_garbage(path: &Path) {
    append_bytes(path, b"\x00\x01garbage that is not a record\r\n\r\n");
}

/// Appends the start of a journal entry, cut off inside its header.
pub fn append_torn_journal(au_dir: &Path) {
    append_bytes(&au_dir.join(JOURNAL_FILE), b"WARC/1.0\r\nWARC-Type: metad");
}

/// Appends a complete journal record whose body is not a state entry.
///
/// Recovery cannot skip a well-framed record it does not understand, so a
/// store opened over this journal fails its startup recovery.
pub fn write_corrupt_journal(au_dir: &Path) {
    let body = b"this is not json";
    let header = RecordHeader::new(
        RecordType::Metadata,
        ArtifactId::new(),
        "urn:uuid:00000000-0000-0000-0000-000000000000",
        TORN_DATE,
        "application/json",
        body.len() as u64,
    )
    .render()
    .expect("failed to render header");
    let path = au_dir.join(JOURNAL_FILE);
    append_bytes(&path, &header);
    append_bytes(&path, body);
    append_bytes(&path, b"\r\n\r\n");
}

fn append_bytes(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("failed to open file for append");
    file.write_all(bytes).expect("failed to append bytes");
    file.sync_all().expect("failed to sync file");
}

/// Test harness for crash recovery scenarios.
pub struct CrashRecoveryHarness {
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new harness.
    pub fn new() -> Self {
        Self {
            results: Vec::new(),
        }
    }

    fn record(&mut self, result: CrashRecoveryResult) -> CrashRecoveryResult {
        self.results.push(result.clone());
        result
    }

    /// Stored artifacts stay readable after a torn record is cut from an
    /// open segment.
    pub fn test_torn_segment_tail(&mut self) -> CrashRecoveryResult {
        let description = "Torn record in open segment is discarded";
        let prefix = test_config().segment_prefix;
        let repo = TestRepository::new();
        let artifacts: Vec<_> = (0..5)
            .map(|i| repo.add_committed("crash", "au", &format!("http://x/{i}"), format!("body {i}")))
            .collect();
        let size = repo.au_warc_size("crash", "au").unwrap_or(0);
        let au_dir = repo.au_dir("crash", "au");

        let repo = repo.reopen_after(|_| {
            let open = mark_in_progress(&last_segment(&au_dir, &prefix));
            append_torn_record(&open);
        });

        let readable = artifacts
            .iter()
            .filter(|a| repo.get_artifact_data(a).is_ok())
            .count();
        let result = if readable != artifacts.len() {
            CrashRecoveryResult::fail(description, artifacts.len(), readable, "artifact lost")
        } else if repo.au_warc_size("crash", "au").ok() != Some(size) {
            CrashRecoveryResult::fail(description, artifacts.len(), readable, "tail not truncated")
        } else if au_segments(&au_dir, &prefix).iter().any(|s| s.in_progress) {
            CrashRecoveryResult::fail(description, artifacts.len(), readable, "open marker left behind")
        } else {
            CrashRecoveryResult::pass(description, readable)
        };
        self.record(result)
    }

    /// Garbage after the last record is discarded the same way.
    pub fn test_garbage_tail(&mut self) -> CrashRecoveryResult {
        let description = "Garbage after last record is discarded";
        let prefix = test_config().segment_prefix;
        let repo = TestRepository::new();
        let artifact = repo.add("crash", "au", "http://x/", "payload");
        let au_dir = repo.au_dir("crash", "au");

        let repo = repo.reopen_after(|_| {
            let open = mark_in_progress(&last_segment(&au_dir, &prefix));
            append_garbage(&open);
        });

        let result = match repo.get_artifact_data(&artifact).and_then(|mut d| d.read_content()) {
            Ok(content) if content == b"payload" => {
                // new appends land after the recovered prefix
                match repo.add_artifact_data(ArtifactData::from_bytes("crash", "au", "http://x/", "second")) {
                    Ok(second) if second.version == 2 => CrashRecoveryResult::pass(description, 2),
                    Ok(second) => CrashRecoveryResult::fail(
                        description,
                        2,
                        1,
                        &format!("unexpected version {}", second.version),
                    ),
                    Err(e) => CrashRecoveryResult::fail(description, 2, 1, &e.to_string()),
                }
            }
            Ok(_) => CrashRecoveryResult::fail(description, 1, 1, "content changed"),
            Err(e) => CrashRecoveryResult::fail(description, 1, 0, &e.to_string()),
        };
        self.record(result)
    }

    /// A torn journal entry loses only that entry.
    pub fn test_torn_journal(&mut self) -> CrashRecoveryResult {
        let description = "Torn journal entry keeps earlier states";
        let repo = TestRepository::new();
        let committed = repo.add_committed("crash", "au", "http://x/a", "a");
        let pending = repo.add("crash", "au", "http://x/b", "b");
        let au_dir = repo.au_dir("crash", "au");

        let repo = repo.reopen_after(|_| append_torn_journal(&au_dir));

        let index = InMemoryIndex::new();
        let result = match repo.reindex_artifacts(&index) {
            Ok(_) => {
                let a = index.get(&committed.id).map(|a| a.committed);
                let b = index.get(&pending.id).map(|a| a.committed);
                if a == Some(true) && b == Some(false) {
                    CrashRecoveryResult::pass(description, index.len())
                } else {
                    CrashRecoveryResult::fail(description, 2, index.len(), "states changed")
                }
            }
            Err(e) => CrashRecoveryResult::fail(description, 2, 0, &e.to_string()),
        };
        self.record(result)
    }

    /// Deletions are durable across a restart.
    pub fn test_delete_survives_restart(&mut self) -> CrashRecoveryResult {
        let description = "Deleted artifact stays deleted";
        let repo = TestRepository::new();
        let kept = repo.add_committed("crash", "au", "http://x/kept", "kept");
        let gone = repo.add_committed("crash", "au", "http://x/gone", "gone");
        if let Err(e) = repo.delete_artifact_data(&gone).wait() {
            return self.record(CrashRecoveryResult::fail(description, 1, 2, &e.to_string()));
        }

        let repo = repo.reopen();

        let result = match (repo.get_artifact_data(&kept), repo.get_artifact_data(&gone)) {
            (Ok(_), Err(CoreError::NotFound { .. })) => CrashRecoveryResult::pass(description, 1),
            (Ok(_), Ok(_)) => CrashRecoveryResult::fail(description, 1, 2, "deleted artifact readable"),
            (Err(e), _) | (_, Err(e)) => CrashRecoveryResult::fail(description, 1, 0, &e.to_string()),
        };
        self.record(result)
    }

    /// A finalized segment whose last header declares an impossible length
    /// still opens, and the records before it stay readable.
    pub fn test_overflowing_length(&mut self) -> CrashRecoveryResult {
        let description = "Impossible Content-Length is treated as a torn tail";
        let prefix = test_config().segment_prefix;
        let repo = TestRepository::new();
        let artifacts: Vec<_> = (0..3)
            .map(|i| repo.add_committed("crash", "au", &format!("http://x/{i}"), format!("body {i}")))
            .collect();
        let au_dir = repo.au_dir("crash", "au");
        let (dir, config) = repo.into_parts();
        append_record_declaring(&last_segment(&au_dir, &prefix), u64::MAX, b"abc");

        let store = match crate::fixtures::open_ready(dir.path(), config) {
            Ok(store) => store,
            Err(e) => return self.record(CrashRecoveryResult::fail(description, 3, 0, &e.to_string())),
        };
        let index = InMemoryIndex::new();
        let result = match store.reindex_artifacts(&index) {
            Ok(report) if report.torn_tails != 1 => {
                CrashRecoveryResult::fail(description, 3, index.len(), "torn tail not reported")
            }
            Ok(_) => {
                let readable = artifacts
                    .iter()
                    .filter(|a| store.get_artifact_data(a).is_ok())
                    .count();
                if readable == artifacts.len() && index.len() == artifacts.len() {
                    CrashRecoveryResult::pass(description, readable)
                } else {
                    CrashRecoveryResult::fail(description, 3, readable, "artifact lost")
                }
            }
            Err(e) => CrashRecoveryResult::fail(description, 3, 0, &e.to_string()),
        };
        self.record(result)
    }

    /// A journal that cannot be understood interrupts startup.
    pub fn test_corrupt_journal_interrupts(&mut self) -> CrashRecoveryResult {
        let description = "Unreadable journal fails startup recovery";
        let repo = TestRepository::new();
        repo.add("crash", "au", "http://x/", "body");
        let au_dir = repo.au_dir("crash", "au");
        let (dir, config) = repo.into_parts();
        write_corrupt_journal(&au_dir);

        let result = match crate::fixtures::open_ready(dir.path(), config) {
            Err(CoreError::Interrupted { .. }) => CrashRecoveryResult::pass(description, 0),
            Err(e) => CrashRecoveryResult::fail(description, 0, 0, &format!("unexpected error {e}")),
            Ok(_) => CrashRecoveryResult::fail(description, 0, 1, "store became ready"),
        };
        self.record(result)
    }

    /// Runs every scenario.
    pub fn run_all_tests(&mut self) -> Vec<CrashRecoveryResult> {
        vec![
            self.test_torn_segment_tail(),
            self.test_garbage_tail(),
            self.test_torn_journal(),
            self.test_delete_survives_restart(),
            self.test_overflowing_length(),
            self.test_corrupt_journal_interrupts(),
        ]
    }

    /// Human-readable summary of all recorded results.
    pub fn summary(&self) -> String {
        let passed = self.results.iter().filter(|r| r.passed).count();
        let mut out = format!(
            "Crash Recovery Test Results: {passed}/{} passed\n",
            self.results.len()
        );
        for result in &self.results {
            let status = if result.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!("  [{status}] {}", result.description));
            if let Some(error) = &result.error {
                out.push_str(&format!(" - {error}"));
            }
            out.push('\n');
        }
        out
    }

    /// Returns true if every recorded test passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

impl Default for CrashRecoveryHarness {
    fn default() -> Self {
        Self::new()
    }
}
