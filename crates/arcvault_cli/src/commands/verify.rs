//! Verify command implementation.

use super::{CliError, Repository};
use arcvault_core::{
    digest_by_name, digest_payload, list_segments, read_journal, split_digest, CoreError,
    RecordScanner, SegmentFile, JOURNAL_FILE,
};
use arcvault_storage::FileBackend;
use std::path::Path;
use tracing::{debug, warn};

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of segments scanned.
    pub segments_checked: usize,
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of records whose payload digest matched.
    pub valid_records: usize,
    /// Number of payload digest mismatches.
    pub digest_mismatches: usize,
    /// Incomplete final records.
    pub torn_tails: usize,
    /// Segments with malformed bytes.
    pub corrupt_segments: usize,
    /// Number of journals read.
    pub journals_checked: usize,
    /// Problems found, one line each.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Whether no damage was found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Scans every segment and journal of the repository.
pub fn collect(repo: &Repository) -> Result<VerifyResult, CliError> {
    let mut result = VerifyResult::default();
    for (key, dirs) in repo.aus()? {
        debug!(au = %key, "verifying archival unit");
        for dir in &dirs {
            for segment in list_segments(dir, repo.prefix())? {
                verify_segment(&segment, &mut result)?;
            }
            verify_journal(&dir.join(JOURNAL_FILE), &mut result)?;
        }
    }
    Ok(result)
}

fn verify_segment(segment: &SegmentFile, result: &mut VerifyResult) -> Result<(), CliError> {
    let name = segment.path.display();
    let backend = FileBackend::open_read_only(&segment.path).map_err(CoreError::from)?;
    let mut scanner = RecordScanner::new(&backend, None)?;
    result.segments_checked += 1;

    loop {
        let record = match scanner.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => {
                if scanner.is_torn() {
                    result.torn_tails += 1;
                    let at = scanner.position();
                    if segment.in_progress {
                        // an open segment is truncated here on the next store open
                        warn!(segment = %name, offset = at, "torn tail in open segment");
                    } else {
                        result.errors.push(format!("{name}: torn record at offset {at}"));
                    }
                }
                break;
            }
            Err(CoreError::SegmentCorruption { message }) => {
                result.corrupt_segments += 1;
                result.errors.push(format!("{name}: {message}"));
                break;
            }
            Err(e) => return Err(e.into()),
        };

        result.records_checked += 1;
        if !record.header.record_type.is_artifact() {
            continue;
        }
        let Some(expected) = record.header.payload_digest.as_deref() else {
            result.valid_records += 1;
            continue;
        };
        let Some(algorithm) = split_digest(expected).and_then(|(alg, _)| digest_by_name(alg)) else {
            result.errors.push(format!(
                "{name}: record at offset {} uses unknown digest {expected:?}",
                record.offset
            ));
            continue;
        };
        let actual = digest_payload(&backend, &record, algorithm.as_ref())?;
        if actual == expected {
            result.valid_records += 1;
        } else {
            result.digest_mismatches += 1;
            result.errors.push(format!(
                "{name}: record at offset {} digests to {actual}, header says {expected}",
                record.offset
            ));
        }
    }
    Ok(())
}

fn verify_journal(path: &Path, result: &mut VerifyResult) -> Result<(), CliError> {
    match read_journal(path, None) {
        Ok(scan) => {
            result.journals_checked += 1;
            if scan.torn {
                result.torn_tails += 1;
                warn!(journal = %path.display(), offset = scan.valid_len, "torn journal tail");
            }
        }
        Err(CoreError::Journal(e)) => {
            result.errors.push(format!("{}: unreadable entry: {e}", path.display()));
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Runs the verify command.
pub fn run(repo: &Repository) -> Result<(), CliError> {
    for root in repo.roots() {
        println!("Verifying repository root {}", root.display());
    }
    println!();

    let result = collect(repo)?;
    println!("Segments checked: {}", result.segments_checked);
    println!("Records checked:  {}", result.records_checked);
    println!("Valid records:    {}", result.valid_records);
    println!("Journals checked: {}", result.journals_checked);
    println!("Torn tails:       {}", result.torn_tails);
    println!("Digest mismatches: {}", result.digest_mismatches);
    println!("Corrupt segments: {}", result.corrupt_segments);
    for error in &result.errors {
        println!("  - {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Repository verification passed");
        Ok(())
    } else {
        println!("✗ Repository verification failed");
        Err(CliError::VerificationFailed(result.errors.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::populate;
    use std::fs::OpenOptions;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::tempdir;

    fn open(path: &Path) -> Repository {
        Repository::open(vec![path.to_path_buf()], "artifacts".into()).unwrap()
    }

    #[test]
    fn clean_repository_passes() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let result = collect(&open(dir.path())).unwrap();
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.records_checked, 3);
        assert_eq!(result.valid_records, 3);
        assert_eq!(result.journals_checked, 2);
    }

    #[test]
    fn flipped_payload_byte_is_a_mismatch() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let repo = open(dir.path());

        let (_, dirs) = repo.aus().unwrap().into_iter().next().unwrap();
        let segment = list_segments(&dirs[0], "artifacts").unwrap().remove(0);
        let mut file = OpenOptions::new().write(true).open(&segment.path).unwrap();
        // the first record's payload sits just before its separator
        let first_end = {
            let backend = FileBackend::open_read_only(&segment.path).unwrap();
            let mut scanner = RecordScanner::new(&backend, None).unwrap();
            scanner.next_record().unwrap().unwrap().end()
        };
        file.seek(SeekFrom::Start(first_end - 5)).unwrap();
        file.write_all(b"X").unwrap();
        drop(file);

        let result = collect(&repo).unwrap();
        assert_eq!(result.digest_mismatches, 1);
        assert!(!result.is_ok());
    }

    #[test]
    fn torn_finalized_segment_fails() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let repo = open(dir.path());

        let (_, dirs) = repo.aus().unwrap().into_iter().last().unwrap();
        let segment = list_segments(&dirs[0], "artifacts").unwrap().remove(0);
        let mut file = OpenOptions::new().append(true).open(&segment.path).unwrap();
        file.write_all(b"WARC/1.0\r\nWARC-Type: resou").unwrap();
        drop(file);

        let result = collect(&repo).unwrap();
        assert_eq!(result.torn_tails, 1);
        assert!(!result.is_ok());
    }
}
