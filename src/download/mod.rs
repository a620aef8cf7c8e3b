//! Verified batch downloads for game client files.
//!
//! This module fetches libraries, assets and client jars into a local
//! directory tree, bounded by an admission gate and checked against the
//! SHA-1 digests the version manifest publishes.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Skip-if-present: files that already verify are never re-fetched
//! - Partial files are removed on error, mismatch or cancellation
//! - Live progress counters (throughput, bytes, files remaining)
//! - Post-batch reconciliation and bounded retry rounds
//!
//! # Example
//!
//! ```no_run
//! use launcher_fetch::download::{DownloadEngine, EngineConfig, FetchTask};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(EngineConfig::default())?;
//! let task = FetchTask::new("https://libraries.example.net/org/lwjgl/lwjgl.jar", "./libraries")?;
//! let report = engine.run_batch(vec![task]).await;
//! assert!(report.is_complete());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod progress;
mod reconcile;
mod task;
mod verify;
mod worker;

pub use client::HttpClient;
pub use constants::{DEFAULT_BATCH_TIMEOUT, DEFAULT_CONCURRENCY, DEFAULT_MAX_ROUNDS};
pub use engine::{BatchReport, BatchStats, DownloadEngine, EngineConfig, EngineError};
pub use error::DownloadError;
pub use progress::{BatchState, ProgressSnapshot};
pub use reconcile::reconcile;
pub use task::{FetchTask, PathLayout};
pub use verify::{VerificationOutcome, sha1_hex, verify_sha1};
pub use worker::FetchOutcome;

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
