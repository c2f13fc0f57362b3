//! Reindex command implementation.

use super::{CliError, Repository};
use arcvault_core::{Artifact, ArtifactState, ReindexReport, ReindexWalker};
use serde::Serialize;
use std::io::{self, Write};
use tracing::info;

/// One output line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Line<'a> {
    #[serde(flatten)]
    artifact: &'a Artifact,
    state: ArtifactState,
}

/// Walks the repository, writing one JSON artifact per line to `out`.
pub fn write_lines<W: Write>(
    repo: &Repository,
    include_deleted: bool,
    out: &mut W,
) -> Result<ReindexReport, CliError> {
    let walker = ReindexWalker::new(repo.prefix()).include_deleted(include_deleted);
    let report = walker.walk_all(repo.registry(), |artifact, state| {
        serde_json::to_writer(&mut *out, &Line { artifact: &artifact, state })?;
        out.write_all(b"\n")?;
        Ok(())
    })?;
    Ok(report)
}

/// Runs the reindex command.
pub fn run(repo: &Repository, include_deleted: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = write_lines(repo, include_deleted, &mut out)?;
    out.flush().map_err(arcvault_core::CoreError::from)?;
    info!(
        aus = report.aus,
        segments = report.segments_scanned,
        artifacts = report.artifacts_indexed,
        deleted = report.deleted_skipped,
        torn = report.torn_tails,
        corrupt = report.corrupt_segments,
        "reindex complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::populate;
    use tempfile::tempdir;

    fn lines(include_deleted: bool) -> (ReindexReport, Vec<serde_json::Value>) {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let repo = Repository::open(vec![dir.path().to_path_buf()], "artifacts".into()).unwrap();

        let mut out = Vec::new();
        let report = write_lines(&repo, include_deleted, &mut out).unwrap();
        let values = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (report, values)
    }

    #[test]
    fn prints_live_artifacts() {
        let (report, values) = lines(false);
        assert_eq!(report.artifacts_indexed, 2);
        assert_eq!(report.deleted_skipped, 1);
        assert_eq!(values.len(), 2);
        assert!(values.iter().any(|v| v["uri"] == "http://x/a" && v["committed"] == true));
        assert!(values.iter().all(|v| v["contentHash"].as_str().unwrap().starts_with("sha256:")));
    }

    #[test]
    fn deleted_artifacts_on_request() {
        let (_, values) = lines(true);
        assert_eq!(values.len(), 3);
        assert!(values.iter().any(|v| v["uri"] == "http://x/b"));
    }
}
