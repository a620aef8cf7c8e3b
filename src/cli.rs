//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Download game client files with bounded concurrency and SHA-1 checks.
///
/// Tasks come from positional URLs (no hash) and/or a JSON manifest
/// (`[{"url": ..., "sha1": ..., "path_layout": ...}]`). Files already
/// present and verified are skipped; failures are retried in later rounds.
#[derive(Parser, Debug)]
#[command(name = "launcher-fetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (stored without hash verification)
    pub urls: Vec<String>,

    /// JSON manifest of tasks ("-" reads stdin)
    #[arg(short = 'm', long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Destination root directory [default: current directory]
    #[arg(short = 'd', long, value_name = "DIR")]
    pub dest: Option<PathBuf>,

    /// Store files by name only instead of mirroring the URL path
    #[arg(long)]
    pub flatten: bool,

    /// Skip SHA-1 verification entirely
    #[arg(long)]
    pub insecure: bool,

    /// Maximum simultaneous transfers (1-256) [default: 64]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub concurrency: Option<u16>,

    /// Download rounds: the first pass plus retries of failed files (1-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub rounds: Option<u32>,

    /// Seconds to wait for a round before re-checking files (1-3600) [default: 60]
    #[arg(short = 't', long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub batch_timeout: Option<u64>,

    /// Config file [default: $XDG_CONFIG_HOME/launcher-fetch/config.toml]
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
