//! Startup recovery after simulated crashes.

use arcvault_core::{ArtifactData, ArtifactStore, CoreError, Deadline, InMemoryIndex};
use arcvault_testkit::crash::{
    append_garbage, append_record_declaring, append_torn_journal, append_torn_record, au_segments,
    last_segment, mark_in_progress, write_corrupt_journal, CrashRecoveryHarness,
};
use arcvault_testkit::{open_ready, TestRepository, READY_TIMEOUT};
use std::time::Instant;

#[test]
fn torn_record_is_cut_and_marker_removed() {
    let repo = TestRepository::new();
    let prefix = repo.config().segment_prefix.clone();
    let kept: Vec<_> = (0..3)
        .map(|i| repo.add("ns", "au", &format!("http://x/{i}"), format!("kept {i}")))
        .collect();
    let size = repo.au_warc_size("ns", "au").unwrap();
    let au_dir = repo.au_dir("ns", "au");

    let repo = repo.reopen_after(|_| {
        let open = mark_in_progress(&last_segment(&au_dir, &prefix));
        append_torn_record(&open);
    });

    assert_eq!(repo.au_warc_size("ns", "au").unwrap(), size);
    assert!(au_segments(&au_dir, &prefix).iter().all(|s| !s.in_progress));
    for (i, artifact) in kept.iter().enumerate() {
        assert_eq!(repo.read(artifact), format!("kept {i}").into_bytes());
    }

    let index = InMemoryIndex::new();
    let report = repo.reindex_artifacts(&index).unwrap();
    assert_eq!(report.artifacts_indexed, 3);
    assert_eq!(report.torn_tails, 0);
}

#[test]
fn garbage_tail_is_cut() {
    let repo = TestRepository::new();
    let prefix = repo.config().segment_prefix.clone();
    let artifact = repo.add("ns", "au", "http://x/", "body");
    let au_dir = repo.au_dir("ns", "au");

    let repo = repo.reopen_after(|_| {
        let open = mark_in_progress(&last_segment(&au_dir, &prefix));
        append_garbage(&open);
    });

    assert_eq!(repo.au_warc_size("ns", "au").unwrap(), artifact.location.length);
    let next = repo.add("ns", "au", "http://x/", "next");
    assert_eq!(next.version, 2);
    assert_eq!(repo.read(&artifact), b"body");
}

#[test]
fn torn_journal_entry_is_dropped() {
    let repo = TestRepository::new();
    let committed = repo.add_committed("ns", "au", "http://x/a", "a");
    let deleted = repo.add("ns", "au", "http://x/b", "b");
    repo.delete_artifact_data(&deleted).wait().unwrap();
    let au_dir = repo.au_dir("ns", "au");

    let repo = repo.reopen_after(|_| append_torn_journal(&au_dir));

    assert!(repo.get_artifact_data(&deleted).unwrap_err().is_not_found());
    let data = repo.get_artifact_data(&committed).unwrap();
    assert_eq!(data.state, Some(arcvault_core::ArtifactState::Committed));

    // the journal accepts new entries after the cut
    let pending = repo.add("ns", "au", "http://x/c", "c");
    repo.commit_artifact_data(&pending).wait().unwrap();
    let repo = repo.reopen();
    let index = InMemoryIndex::new();
    repo.reindex_artifacts(&index).unwrap();
    assert!(index.get(&pending.id).unwrap().committed);
}

#[test]
fn unreadable_journal_interrupts_startup() {
    let repo = TestRepository::new();
    repo.add("ns", "au", "http://x/", "body");
    let au_dir = repo.au_dir("ns", "au");
    let (dir, config) = repo.into_parts();
    write_corrupt_journal(&au_dir);

    match open_ready(dir.path(), config) {
        Err(CoreError::Interrupted { .. }) => {}
        other => panic!("expected interrupted startup, got {other:?}"),
    }
}

#[test]
fn overflowing_length_in_open_segment_is_cut() {
    let repo = TestRepository::new();
    let prefix = repo.config().segment_prefix.clone();
    let kept: Vec<_> = (0..3)
        .map(|i| repo.add_committed("ns", "au", &format!("http://x/{i}"), format!("kept {i}")))
        .collect();
    let size = repo.au_warc_size("ns", "au").unwrap();
    let au_dir = repo.au_dir("ns", "au");

    let repo = repo.reopen_after(|_| {
        let open = mark_in_progress(&last_segment(&au_dir, &prefix));
        append_record_declaring(&open, u64::MAX, b"abc");
    });

    assert_eq!(repo.au_warc_size("ns", "au").unwrap(), size);
    assert!(au_segments(&au_dir, &prefix).iter().all(|s| !s.in_progress));
    for (i, artifact) in kept.iter().enumerate() {
        assert_eq!(repo.read(artifact), format!("kept {i}").into_bytes());
    }
}

#[test]
fn overflowing_length_in_final_segment_is_skipped() {
    let repo = TestRepository::new();
    let prefix = repo.config().segment_prefix.clone();
    let kept = repo.add_committed("ns", "au", "http://x/", "kept");
    let au_dir = repo.au_dir("ns", "au");

    let repo = repo.reopen_after(|_| {
        let segment = last_segment(&au_dir, &prefix);
        for declared in [u64::MAX, u64::MAX - 4, 1 << 62] {
            append_record_declaring(&segment, declared, b"tail");
        }
    });

    let index = InMemoryIndex::new();
    let report = repo.reindex_artifacts(&index).unwrap();
    assert_eq!(report.artifacts_indexed, 1);
    assert_eq!(report.torn_tails, 1);
    assert_eq!(repo.read(&kept), b"kept");
}

#[test]
fn failed_recovery_interrupts_waiters_and_operations() {
    let repo = TestRepository::new();
    repo.add("ns", "au", "http://x/", "body");
    let au_dir = repo.au_dir("ns", "au");
    let (dir, config) = repo.into_parts();
    write_corrupt_journal(&au_dir);

    let store = ArtifactStore::open_with_config(dir.path(), config).unwrap();
    let started = Instant::now();
    let err = store.wait_ready(Deadline::within(READY_TIMEOUT)).unwrap_err();
    assert!(matches!(err, CoreError::Interrupted { .. }), "got {err:?}");
    assert!(started.elapsed() < READY_TIMEOUT);
    assert!(!store.is_ready());

    let add = store.add_artifact_data(ArtifactData::from_bytes("ns", "au", "http://x/2", "more"));
    assert!(matches!(add, Err(CoreError::Interrupted { .. })));
    store.close().unwrap();
}

#[test]
fn crash_recovery_harness_passes() {
    let mut harness = CrashRecoveryHarness::new();
    harness.run_all_tests();
    assert!(harness.all_passed(), "{}", harness.summary());
}
