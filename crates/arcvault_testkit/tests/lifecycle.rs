//! End-to-end artifact lifecycle tests.

use arcvault_core::{
    namespaces_dir, ArtifactData, ArtifactState, AuKey, CoreError, HttpStatus, Namespace,
};
use arcvault_testkit::{test_config, TestRepository};
use tempfile::TempDir;

#[test]
fn hello_artifact_survives_restart() {
    let repo = TestRepository::new();

    let artifact = repo.add("test", "au1", "http://x/y", "hello");
    assert!(!artifact.committed);
    assert_eq!(artifact.version, 1);
    assert_eq!(artifact.content_length, 5);

    let committed = repo.commit_artifact_data(&artifact).wait().unwrap();
    assert!(committed.committed);
    assert_eq!(committed.id, artifact.id);
    assert_eq!(committed.location, artifact.location);

    let repo = repo.reopen();
    let mut data = repo.get_artifact_data(&committed).unwrap();
    assert_eq!(data.read_content().unwrap(), b"hello");
    assert_eq!(data.state, Some(ArtifactState::Committed));
    assert_eq!(data.artifact_id, Some(artifact.id));
    assert_eq!(data.version, Some(1));
    assert_eq!(data.content_digest.as_deref(), Some(artifact.content_hash.as_str()));
}

#[test]
fn namespace_rules_apply_before_any_io() {
    let repo = TestRepository::new();

    assert!(repo.init_namespace(".bad").unwrap_err().is_validation());
    assert!(repo.init_namespace("").unwrap_err().is_validation());
    assert!(!namespaces_dir(repo.path()).join(".bad").exists());

    assert_eq!(repo.init_namespace("ns.2024").unwrap().as_str(), "ns.2024");
    assert!(repo.namespaces().contains(&Namespace::new("ns.2024").unwrap()));
}

#[test]
fn versions_continue_after_restart() {
    let repo = TestRepository::new();
    assert_eq!(repo.add("ns", "au", "http://a/", "1").version, 1);
    assert_eq!(repo.add("ns", "au", "http://a/", "2").version, 2);

    let repo = repo.reopen();
    assert_eq!(repo.add("ns", "au", "http://a/", "3").version, 3);
    assert_eq!(repo.add("ns", "au", "http://b/", "1").version, 1);
}

#[test]
fn aus_are_rediscovered_on_open() {
    let repo = TestRepository::new();
    repo.add("ns", "plugin|one&base_url~http%3A%2F%2Fx", "http://x/", "a");
    repo.add("other", "au2", "http://y/", "b");

    let repo = repo.reopen();
    let aus = repo.aus();
    assert_eq!(aus.len(), 2);
    assert!(aus.contains(&AuKey::new(Namespace::new("other").unwrap(), "au2").unwrap()));
    assert!(aus.contains(
        &AuKey::new(Namespace::new("ns").unwrap(), "plugin|one&base_url~http%3A%2F%2Fx").unwrap()
    ));
}

#[test]
fn response_capture_round_trips() {
    let repo = TestRepository::new();
    let artifact = repo
        .add_artifact_data(
            ArtifactData::from_bytes("ns", "au", "http://x/page", "<p>hi</p>")
                .with_http_status(HttpStatus::new(404, "Not Found"))
                .with_header("Content-Type", "text/html; charset=utf-8")
                .with_header("Server", "test"),
        )
        .unwrap();

    let repo = repo.reopen();
    let mut data = repo.get_artifact_data(&artifact).unwrap();
    assert_eq!(data.http_status, Some(HttpStatus::new(404, "Not Found")));
    assert_eq!(data.content_type(), Some("text/html; charset=utf-8"));
    assert_eq!(data.header("server"), Some("test"));
    assert_eq!(data.read_content().unwrap(), b"<p>hi</p>");
}

#[test]
fn delete_hides_and_commit_is_rejected() {
    let repo = TestRepository::new();
    let artifact = repo.add_committed("ns", "au", "http://x/", "body");

    repo.delete_artifact_data(&artifact).wait().unwrap();
    assert!(repo.get_artifact_data(&artifact).unwrap_err().is_not_found());
    assert!(matches!(
        repo.commit_artifact_data(&artifact).wait(),
        Err(CoreError::InvalidState { .. })
    ));

    // bytes are not reclaimed
    assert!(repo.au_warc_size("ns", "au").unwrap() >= artifact.location.length);
}

#[test]
fn unknown_au_has_zero_size() {
    let repo = TestRepository::new();
    assert_eq!(repo.au_warc_size("ns", "never-written").unwrap(), 0);
    assert!(repo.au_warc_size("-ns", "au").unwrap_err().is_validation());
}

#[test]
fn extra_roots_hold_au_directories() {
    let extra = TempDir::new().unwrap();
    let repo = TestRepository::with_config(test_config().extra_root(extra.path()));

    let dirs = repo.init_au("ns", "au").unwrap();
    assert_eq!(dirs, repo.init_au("ns", "au").unwrap());
    assert!(!dirs.is_empty());
    assert!(dirs
        .iter()
        .all(|d| d.starts_with(repo.path()) || d.starts_with(extra.path())));

    let artifact = repo.add("ns", "au", "http://x/", "multi-root");
    assert!(dirs.iter().any(|d| artifact.location.path.starts_with(d)));
    assert_eq!(repo.read(&artifact), b"multi-root");
}

#[test]
fn closed_store_reports_closed() {
    let repo = TestRepository::new();
    let artifact = repo.add("ns", "au", "http://x/", "body");
    repo.close().unwrap();

    assert!(matches!(
        repo.add_artifact_data(ArtifactData::from_bytes("ns", "au", "http://x/", "late")),
        Err(CoreError::StoreClosed)
    ));
    assert!(matches!(repo.get_artifact_data(&artifact), Err(CoreError::StoreClosed)));
    assert!(matches!(
        repo.commit_artifact_data(&artifact).wait(),
        Err(CoreError::StoreClosed)
    ));
}
