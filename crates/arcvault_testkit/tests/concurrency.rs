//! Concurrent access to one store.

use arcvault_core::{ArtifactData, InMemoryIndex};
use arcvault_testkit::{stress_concurrent_adds, verify_offsets, StressConfig, TestRepository};
use std::sync::Barrier;
use std::thread;

#[test]
fn concurrent_adds_to_one_au_do_not_overlap() {
    let repo = TestRepository::new();
    let config = StressConfig {
        operations: 320,
        threads: 8,
        content_size: 128,
        au_count: 1,
    };

    let (result, artifacts) = stress_concurrent_adds(&repo, &config);
    assert_eq!(result.failed_ops, 0);
    verify_offsets(&artifacts).unwrap();

    let index = InMemoryIndex::new();
    let report = repo.reindex_artifacts(&index).unwrap();
    assert_eq!(report.artifacts_indexed, 320);
}

#[test]
fn concurrent_captures_of_one_uri_get_distinct_versions() {
    let repo = TestRepository::new();
    let threads = 6;
    let per_thread = 10;
    let barrier = Barrier::new(threads);

    let mut versions: Vec<u32> = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let (repo, barrier) = (&repo, &barrier);
                scope.spawn(move || {
                    barrier.wait();
                    (0..per_thread)
                        .map(|_| {
                            repo.add_artifact_data(ArtifactData::from_bytes(
                                "ns",
                                "au",
                                "http://x/same",
                                "capture",
                            ))
                            .unwrap()
                            .version
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    versions.sort_unstable();
    let expected: Vec<u32> = (1..=(threads * per_thread) as u32).collect();
    assert_eq!(versions, expected);
}

#[test]
fn reindex_runs_beside_writers() {
    let repo = TestRepository::new();
    for i in 0..20 {
        repo.add_committed("ns", "au", &format!("http://x/seed{i}"), "seed");
    }

    thread::scope(|scope| {
        let writer = scope.spawn(|| {
            (0..50)
                .map(|i| repo.add("ns", "au", &format!("http://x/live{i}"), "live"))
                .collect::<Vec<_>>()
        });

        let index = InMemoryIndex::new();
        let report = repo.reindex_artifacts(&index).unwrap();
        assert!(report.artifacts_indexed >= 20);
        assert_eq!(report.torn_tails, 0);
        assert_eq!(report.corrupt_segments, 0);

        let written = writer.join().unwrap();
        verify_offsets(&written).unwrap();
    });

    let index = InMemoryIndex::new();
    assert_eq!(repo.reindex_artifacts(&index).unwrap().artifacts_indexed, 70);
}

#[test]
fn commits_and_deletes_from_many_threads() {
    let repo = TestRepository::new();
    let artifacts: Vec<_> = (0..40)
        .map(|i| repo.add("ns", &format!("au{}", i % 4), &format!("http://x/{i}"), "body"))
        .collect();

    thread::scope(|scope| {
        for chunk in artifacts.chunks(10) {
            let repo = &repo;
            scope.spawn(move || {
                for (i, artifact) in chunk.iter().enumerate() {
                    if i % 2 == 0 {
                        repo.commit_artifact_data(artifact).wait().unwrap();
                    } else {
                        repo.delete_artifact_data(artifact).wait().unwrap();
                    }
                }
            });
        }
    });

    let stats = repo.stats();
    assert_eq!(stats.artifacts_committed, 20);
    assert_eq!(stats.artifacts_deleted, 20);

    let repo = repo.reopen();
    let index = InMemoryIndex::new();
    repo.reindex_artifacts(&index).unwrap();
    assert_eq!(index.len(), 20);
    assert!(index.artifacts().iter().all(|a| a.committed));
}
