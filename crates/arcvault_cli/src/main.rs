//! arcvault CLI
//!
//! Maintenance tools for arcvault repositories.
//!
//! # Commands
//!
//! - `inspect` - List namespaces, archival units and their segments
//! - `verify` - Rescan every record and recompute payload digests
//! - `reindex` - Print every live artifact as one JSON object per line
//!
//! The tools read the files directly and never take the repository lock;
//! run them against a repository no store has open for writing.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// arcvault repository maintenance tools.
#[derive(Parser)]
#[command(name = "arcvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the repository's primary storage root
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Additional storage roots
    #[arg(global = true, long = "extra-root")]
    extra_roots: Vec<PathBuf>,

    /// Segment file name prefix
    #[arg(global = true, long, default_value = "artifacts")]
    prefix: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List namespaces, archival units and segments
    Inspect {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Verify record framing and payload digests
    Verify,

    /// Print every artifact as one JSON object per line
    Reindex {
        /// Include deleted artifacts
        #[arg(long)]
        include_deleted: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let path = cli.path.ok_or("repository path required (--path)")?;
    let mut roots = vec![path];
    roots.extend(cli.extra_roots);
    let repo = commands::Repository::open(roots, cli.prefix)?;

    match cli.command {
        Commands::Inspect { json } => commands::inspect::run(&repo, json)?,
        Commands::Verify => commands::verify::run(&repo)?,
        Commands::Reindex { include_deleted } => commands::reindex::run(&repo, include_deleted)?,
    }

    Ok(())
}
