//! Inspect command implementation.

use super::{CliError, Repository};
use arcvault_core::{list_segments, JOURNAL_FILE};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;

/// Repository inspection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectResult {
    /// Storage roots, primary first.
    pub roots: Vec<String>,
    /// Namespaces that hold at least one AU.
    pub namespaces: Vec<String>,
    /// Archival units in key order.
    pub aus: Vec<AuInfo>,
    /// Bytes across all segments.
    pub total_size: u64,
}

/// One archival unit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuInfo {
    /// Namespace.
    pub namespace: String,
    /// AU identifier.
    pub auid: String,
    /// Directories the AU spans.
    pub dirs: Vec<String>,
    /// Segment files.
    pub segments: Vec<SegmentInfo>,
    /// Bytes of state journal.
    pub journal_size: u64,
    /// Bytes across the AU's segments.
    pub warc_size: u64,
}

/// One segment file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentInfo {
    /// File name on disk.
    pub file: String,
    /// Size in bytes.
    pub size: u64,
    /// Whether the segment still carries its in-progress marker.
    pub in_progress: bool,
}

/// Gathers the inspection result.
pub fn collect(repo: &Repository) -> Result<InspectResult, CliError> {
    let mut namespaces = BTreeSet::new();
    let mut aus = Vec::new();

    for (key, dirs) in repo.aus()? {
        namespaces.insert(key.namespace.to_string());
        let mut segments = Vec::new();
        let mut journal_size = 0;
        for dir in &dirs {
            for segment in list_segments(dir, repo.prefix())? {
                segments.push(SegmentInfo {
                    file: segment
                        .path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    size: segment.size,
                    in_progress: segment.in_progress,
                });
            }
            journal_size += fs::metadata(dir.join(JOURNAL_FILE)).map_or(0, |m| m.len());
        }
        let warc_size = segments.iter().map(|s| s.size).sum();
        aus.push(AuInfo {
            namespace: key.namespace.to_string(),
            auid: key.auid,
            dirs: dirs.iter().map(|d| d.display().to_string()).collect(),
            segments,
            journal_size,
            warc_size,
        });
    }

    Ok(InspectResult {
        roots: repo.roots().iter().map(|r| r.display().to_string()).collect(),
        namespaces: namespaces.into_iter().collect(),
        total_size: aus.iter().map(|a| a.warc_size).sum(),
        aus,
    })
}

/// Runs the inspect command.
pub fn run(repo: &Repository, json: bool) -> Result<(), CliError> {
    let result = collect(repo)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_text_output(&result);
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("arcvault Repository Inspection");
    println!("==============================");
    println!();
    for root in &result.roots {
        println!("Root: {root}");
    }
    println!();
    println!("Namespaces: {}", result.namespaces.join(", "));
    println!("Archival units: {}", result.aus.len());
    println!("Total size: {}", format_size(result.total_size));

    for au in &result.aus {
        println!();
        println!("[{}] {}", au.namespace, au.auid);
        println!("  WARC size:    {}", format_size(au.warc_size));
        println!("  Journal size: {}", format_size(au.journal_size));
        for segment in &au.segments {
            let marker = if segment.in_progress { " (open)" } else { "" };
            println!("  {} {}{marker}", segment.file, format_size(segment.size));
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
