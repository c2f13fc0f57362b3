//! Stress tests for arcvault.
//!
//! These tests verify behavior under heavy load and concurrent access.

use arcvault_core::{Artifact, ArtifactData, ArtifactStore};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of artifact content in bytes.
    pub content_size: usize,
    /// Number of distinct AUs the operations spread over.
    pub au_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 1_000,
            threads: 4,
            content_size: 256,
            au_count: 2,
        }
    }
}

fn submission(i: usize, config: &StressConfig) -> ArtifactData {
    let au = format!("au{}", i % config.au_count.max(1));
    let uri = format!("http://stress.example.org/{i}");
    ArtifactData::from_bytes("stress", au, uri, vec![(i % 251) as u8; config.content_size])
}

/// Run a sequential add stress test.
pub fn stress_sequential_adds(store: &ArtifactStore, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        match store.add_artifact_data(submission(i, config)) {
            Ok(_) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a concurrent add stress test.
///
/// Returns the stored artifacts alongside the timing so callers can check
/// their locations with [`verify_offsets`].
pub fn stress_concurrent_adds(
    store: &ArtifactStore,
    config: &StressConfig,
) -> (StressTestResult, Vec<Artifact>) {
    let failed = AtomicUsize::new(0);
    let stored = Mutex::new(Vec::with_capacity(config.operations));
    let threads = config.threads.max(1);
    let ops_per_thread = config.operations / threads;

    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..threads {
            let (failed, stored) = (&failed, &stored);
            scope.spawn(move || {
                for i in 0..ops_per_thread {
                    match store.add_artifact_data(submission(t * ops_per_thread + i, config)) {
                        Ok(artifact) => stored.lock().unwrap_or_else(PoisonError::into_inner).push(artifact),
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    let artifacts = stored.into_inner().unwrap_or_else(PoisonError::into_inner);
    let result = StressTestResult::new(artifacts.len(), failed.load(Ordering::Relaxed), start.elapsed());
    (result, artifacts)
}

/// Run a mixed add/commit/get/delete stress test.
///
/// Every iteration adds one artifact, then commits, reads or deletes it
/// depending on its position; each step counts as one operation.
pub fn stress_mixed_operations(store: &ArtifactStore, config: &StressConfig) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let artifact = match store.add_artifact_data(submission(i, config)) {
            Ok(artifact) => {
                successful += 1;
                artifact
            }
            Err(_) => {
                failed += 1;
                continue;
            }
        };

        let result = match i % 3 {
            0 => store.commit_artifact_data(&artifact).wait().map(|_| ()),
            1 => store
                .get_artifact_data(&artifact)
                .and_then(|mut data| data.read_content())
                .map(|_| ()),
            _ => store.delete_artifact_data(&artifact).wait(),
        };

        match result {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Checks that no two stored records overlap within a segment.
///
/// # Errors
///
/// Returns a description of the first overlap found.
pub fn verify_offsets(artifacts: &[Artifact]) -> Result<(), String> {
    let mut by_segment: BTreeMap<&PathBuf, Vec<(u64, u64)>> = BTreeMap::new();
    for artifact in artifacts {
        by_segment
            .entry(&artifact.location.path)
            .or_default()
            .push((artifact.location.offset, artifact.location.length));
    }

    for (path, mut spans) in by_segment {
        spans.sort_unstable();
        for pair in spans.windows(2) {
            let ((offset, length), (next, _)) = (pair[0], pair[1]);
            if offset + length > next {
                return Err(format!(
                    "records overlap in {}: {offset}+{length} runs past {next}",
                    path.display()
                ));
            }
        }
    }
    Ok(())
}
