//! Launcher Fetch Library
//!
//! Bounded-concurrency, SHA-1-verified batch downloads of game client
//! files (libraries, assets, client jars) into a local directory tree.
//!
//! # Architecture
//!
//! - [`download`] - fetch tasks, verification, progress, the engine and
//!   post-batch reconciliation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use download::{
    BatchReport, BatchState, BatchStats, DEFAULT_BATCH_TIMEOUT, DEFAULT_CONCURRENCY, DEFAULT_MAX_ROUNDS,
    DownloadEngine, DownloadError, EngineConfig, EngineError, FetchOutcome, FetchTask,
    HttpClient, PathLayout, ProgressSnapshot, VerificationOutcome,
};
