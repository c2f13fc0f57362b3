//! Segment rollover, size accounting and reindex tests.

use arcvault_core::{list_segments, InMemoryIndex};
use arcvault_testkit::crash::au_segments;
use arcvault_testkit::{test_config, TestRepository};

const MAX_SEGMENT: u64 = 2048;

#[test]
fn segments_roll_over_at_the_size_limit() {
    let repo = TestRepository::with_config(test_config().max_segment_size(MAX_SEGMENT));
    let prefix = repo.config().segment_prefix.clone();

    let artifacts: Vec<_> = (0..12)
        .map(|i| repo.add("ns", "au", &format!("http://x/{i}"), vec![b'a'; 400]))
        .collect();
    assert!(repo.stats().segments_rolled > 0);

    let segments = au_segments(&repo.au_dir("ns", "au"), &prefix);
    assert!(segments.len() > 1);
    assert_eq!(segments.iter().filter(|s| s.in_progress).count(), 1);
    assert!(segments.iter().all(|s| s.size <= MAX_SEGMENT));

    let total: u64 = artifacts.iter().map(|a| a.location.length).sum();
    assert_eq!(repo.au_warc_size("ns", "au").unwrap(), total);
    assert_eq!(segments.iter().map(|s| s.size).sum::<u64>(), total);

    // every record is still readable from its finalized path
    for artifact in &artifacts {
        assert_eq!(repo.read(artifact), vec![b'a'; 400]);
    }
}

#[test]
fn oversized_record_gets_its_own_segment() {
    let repo = TestRepository::with_config(test_config().max_segment_size(MAX_SEGMENT));
    let prefix = repo.config().segment_prefix.clone();

    let small = repo.add("ns", "au", "http://x/small", "tiny");
    let big = repo.add("ns", "au", "http://x/big", vec![b'b'; 3 * MAX_SEGMENT as usize]);
    let after = repo.add("ns", "au", "http://x/after", "tiny");

    assert_ne!(small.location.path, big.location.path);
    assert_ne!(big.location.path, after.location.path);
    assert_eq!(big.location.offset, 0);
    assert!(big.location.length > MAX_SEGMENT);
    assert_eq!(repo.read(&big).len(), 3 * MAX_SEGMENT as usize);

    let repo = repo.reopen();
    let segments = list_segments(&repo.au_dir("ns", "au"), &prefix).unwrap();
    assert_eq!(segments.len(), 3);
    assert!(segments.iter().all(|s| !s.in_progress));
}

#[test]
fn reindex_reports_live_artifacts_across_aus() {
    let repo = TestRepository::with_config(test_config().max_segment_size(MAX_SEGMENT));
    let mut expected_committed = 0;
    let mut deleted = Vec::new();

    for i in 0..18 {
        let au = format!("au{}", i % 3);
        let uri = format!("http://x/{}", i / 3);
        let artifact = repo.add("ns", &au, &uri, vec![b'r'; 200]);
        match i % 4 {
            0 => {
                repo.commit_artifact_data(&artifact).wait().unwrap();
                expected_committed += 1;
            }
            1 => {
                repo.delete_artifact_data(&artifact).wait().unwrap();
                deleted.push(artifact.id);
            }
            _ => {}
        }
    }

    let index = InMemoryIndex::new();
    let report = repo.reindex_artifacts(&index).unwrap();
    assert_eq!(report.aus, 3);
    assert_eq!(report.artifacts_indexed, 18 - deleted.len() as u64);
    assert_eq!(report.deleted_skipped, deleted.len() as u64);
    assert_eq!(report.torn_tails, 0);
    assert_eq!(report.corrupt_segments, 0);
    assert!(deleted.iter().all(|id| index.get(id).is_none()));
    assert_eq!(
        index.artifacts().iter().filter(|a| a.committed).count(),
        expected_committed
    );

    // a restart rebuilds the same view
    let repo = repo.reopen();
    let again = InMemoryIndex::new();
    repo.reindex_artifacts(&again).unwrap();
    assert_eq!(again.artifacts(), index.artifacts());
}

#[test]
fn reindexed_artifacts_match_what_add_returned() {
    let repo = TestRepository::new();
    let added = repo.add("ns", "au", "http://x/", "content");

    let index = InMemoryIndex::new();
    repo.reindex_artifacts(&index).unwrap();
    let found = index.get(&added.id).unwrap();
    assert_eq!(found.uri, added.uri);
    assert_eq!(found.version, added.version);
    assert_eq!(found.content_hash, added.content_hash);
    assert_eq!(found.content_length, added.content_length);
    assert_eq!(found.location, added.location);
    assert!(!found.committed);
}
