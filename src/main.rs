//! CLI entry point for launcher-fetch.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use launcher_fetch::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use launcher_fetch::{
    DEFAULT_BATCH_TIMEOUT, DEFAULT_CONCURRENCY, DEFAULT_MAX_ROUNDS, DownloadEngine, EngineConfig,
    FetchTask, PathLayout,
};
use tracing::{debug, error, info, warn};

mod app_config;
mod cli;
mod manifest;
mod progress_ui;

use app_config::{FileConfig, load_file_config};
use cli::Args;

/// Exit status when tasks still fail after the final round.
const EXIT_INCOMPLETE: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let loaded = load_file_config(args.config.as_deref())?;
    let file_config = loaded.config.unwrap_or_default();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > config file > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .verbosity
                .map_or("info", app_config::VerbositySetting::default_level),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, config_path = ?loaded.path, "CLI arguments parsed");

    let settings = Settings::resolve(&args, &file_config);
    debug!(?settings, "effective settings");

    let tasks = collect_tasks(&args, &settings)?;
    if tasks.is_empty() {
        info!("No tasks provided. Pass URLs as arguments or a manifest with --manifest.");
        info!("Example: launcher-fetch --manifest libraries.json --dest ~/.minecraft/libraries");
        return Ok(ExitCode::SUCCESS);
    }

    if settings.engine.insecure {
        warn!("hash verification disabled (--insecure)");
    }

    let engine = DownloadEngine::new(settings.engine.clone())?;
    info!(
        tasks = tasks.len(),
        concurrency = engine.concurrency(),
        dest = %settings.dest.display(),
        "Launcher fetch starting"
    );

    let use_spinner = !args.no_progress && !args.quiet && io::stderr().is_terminal();
    let (progress_handle, progress_stop) =
        progress_ui::spawn_progress_ui(use_spinner, engine.progress_handle());

    let report = engine.run_until_complete(tasks, settings.rounds).await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let snapshot = engine.progress();
    info!(
        transferred = report.stats.transferred,
        already_satisfied = report.stats.already_satisfied,
        mismatched = report.stats.mismatched,
        failed = report.stats.failed,
        rounds = report.rounds,
        bytes = report.stats.bytes,
        mb_per_sec = %format!("{:.2}", snapshot.mebibytes_per_second()),
        "Download complete"
    );

    if report.is_complete() {
        return Ok(ExitCode::SUCCESS);
    }

    for task in &report.failed {
        error!(url = %task.url(), "file could not be downloaded");
    }
    error!(
        remaining = report.failed.len(),
        rounds = report.rounds,
        "Some files are still missing or corrupt"
    );
    Ok(ExitCode::from(EXIT_INCOMPLETE))
}

/// Effective run settings: CLI flags over config file over built-in defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    dest: PathBuf,
    layout: PathLayout,
    rounds: u32,
    engine: EngineConfig,
}

impl Settings {
    fn resolve(args: &Args, file: &FileConfig) -> Self {
        let layout = if args.flatten || file.flatten.unwrap_or(false) {
            PathLayout::FileNameOnly
        } else {
            PathLayout::MirrorUrlPath
        };

        let concurrency = args
            .concurrency
            .map(usize::from)
            .or(file.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        let batch_timeout = args
            .batch_timeout
            .or(file.batch_timeout_secs)
            .map_or(DEFAULT_BATCH_TIMEOUT, Duration::from_secs);

        Self {
            dest: args
                .dest
                .clone()
                .or_else(|| file.dest.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            layout,
            rounds: args.rounds.or(file.rounds).unwrap_or(DEFAULT_MAX_ROUNDS),
            engine: EngineConfig {
                concurrency,
                insecure: args.insecure || file.insecure.unwrap_or(false),
                batch_timeout,
                connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
                read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
            },
        }
    }
}

fn collect_tasks(args: &Args, settings: &Settings) -> Result<Vec<FetchTask>> {
    let mut tasks = Vec::new();

    if let Some(path) = &args.manifest {
        let raw = if path.as_os_str() == "-" {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read manifest from stdin")?;
            buffer
        } else {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read manifest '{}'", path.display()))?
        };
        tasks.extend(manifest::parse_manifest(&raw, &settings.dest, settings.layout)?);
    }

    tasks.extend(manifest::tasks_from_urls(
        &args.urls,
        &settings.dest,
        settings.layout,
    )?);
    Ok(tasks)
}
