//! Download engine: admission-gated batch fetching with reconciliation.
//!
//! The `DownloadEngine` takes a batch of [`FetchTask`]s, spawns one Tokio
//! task per file and lets at most `concurrency` of them hold a network
//! stream at once. When the batch drains (or the batch timeout expires) a
//! reconciliation pass re-checks every file on disk and reports the tasks
//! that still need work.
//!
//! # Example
//!
//! ```no_run
//! use launcher_fetch::{DownloadEngine, EngineConfig, FetchTask};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(EngineConfig::default())?;
//! let task = FetchTask::new("https://example.com/objects/ab/abcdef", "./assets")?
//!     .with_sha1("abcdef0123456789abcdef0123456789abcdef01");
//! let report = engine.run_until_complete(vec![task], 3).await;
//! println!("still failing: {}", report.failed.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_BATCH_TIMEOUT, DEFAULT_CONCURRENCY, MAX_CONCURRENCY,
    MIN_CONCURRENCY, PRECHECK_PARALLELISM, READ_TIMEOUT_SECS,
};
use super::progress::{BatchState, CompletionGuard, ProgressSnapshot};
use super::reconcile::reconcile;
use super::task::FetchTask;
use super::verify::VerificationOutcome;
use super::worker::{FetchOutcome, FetchWorker};
use super::HttpClient;

/// Error type for download engine construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// A zero batch timeout would reconcile before any worker ran.
    #[error("batch timeout must be greater than zero")]
    InvalidBatchTimeout,

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Engine settings. Flags such as `insecure` are consumed, not owned, by
/// the engine: the caller decides them per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Admission gate capacity (simultaneous transfers).
    pub concurrency: usize,
    /// Disables hash verification for every task.
    pub insecure: bool,
    /// How long a batch may run before the engine stops waiting and reconciles.
    pub batch_timeout: Duration,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout in seconds.
    pub read_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            insecure: false,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

/// Per-outcome counts for one or more rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Files transferred and accepted.
    pub transferred: usize,
    /// Files already correct on disk (no transfer).
    pub already_satisfied: usize,
    /// Files transferred but deleted for a hash mismatch.
    pub mismatched: usize,
    /// Tasks that failed with an error.
    pub failed: usize,
    /// Workers cut off by the batch timeout.
    pub aborted: usize,
    /// Bytes written by accepted and mismatched transfers.
    pub bytes: u64,
}

impl BatchStats {
    /// Total tasks accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.transferred + self.already_satisfied + self.mismatched + self.failed + self.aborted
    }

    fn record(&mut self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::AlreadySatisfied(_) => self.already_satisfied += 1,
            FetchOutcome::Transferred {
                bytes,
                verification: VerificationOutcome::Mismatch,
            } => {
                self.mismatched += 1;
                self.bytes += bytes;
            }
            FetchOutcome::Transferred { bytes, .. } => {
                self.transferred += 1;
                self.bytes += bytes;
            }
            FetchOutcome::Failed(_) => self.failed += 1,
        }
    }

    fn merge(&mut self, other: &Self) {
        self.transferred += other.transferred;
        self.already_satisfied += other.already_satisfied;
        self.mismatched += other.mismatched;
        self.failed += other.failed;
        self.aborted += other.aborted;
        self.bytes += other.bytes;
    }
}

/// Result of a batch (or of several rounds).
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Tasks whose files are still missing or wrong after reconciliation.
    pub failed: Vec<FetchTask>,
    /// Outcome counts.
    pub stats: BatchStats,
    /// Whether any round hit the batch timeout.
    pub timed_out: bool,
    /// Rounds executed.
    pub rounds: u32,
}

impl BatchReport {
    /// True when every task ended up verified on disk.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Download engine for admission-gated, verified batch downloads.
///
/// # Concurrency Model
///
/// - Each task runs in its own Tokio task
/// - A semaphore permit is acquired before a network transfer starts;
///   tasks already satisfied on disk never take one
/// - Hashing files already on disk is bounded by a separate, smaller gate
/// - Permits are released automatically when transfers end (RAII)
/// - `files_remaining` is decremented by a drop guard, so every admitted
///   task is counted out exactly once, including aborted ones
///
/// # Retry Behavior
///
/// Workers never retry by themselves. After each batch the reconciliation
/// pass produces the retry set, and [`run_until_complete`](Self::run_until_complete)
/// resubmits it for at most the caller's round limit.
#[derive(Debug)]
pub struct DownloadEngine {
    /// Admission gate.
    semaphore: Arc<Semaphore>,
    /// Bounds hashing of files already on disk.
    verify_gate: Arc<Semaphore>,
    config: EngineConfig,
    client: HttpClient,
    /// Shared progress counters.
    state: Arc<BatchState>,
}

impl DownloadEngine {
    /// Creates an engine with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range, [`EngineError::InvalidBatchTimeout`] for a zero
    /// timeout and [`EngineError::HttpClient`] if the client cannot be built.
    #[instrument(level = "debug")]
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let client = HttpClient::with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)?;
        Self::with_client(config, client)
    }

    /// Creates an engine around an existing HTTP client.
    ///
    /// # Errors
    ///
    /// Same validation errors as [`new`](Self::new).
    #[instrument(level = "debug", skip(client))]
    pub fn with_client(config: EngineConfig, client: HttpClient) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&config.concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: config.concurrency,
            });
        }
        if config.batch_timeout.is_zero() {
            return Err(EngineError::InvalidBatchTimeout);
        }

        debug!(
            concurrency = config.concurrency,
            insecure = config.insecure,
            batch_timeout_secs = config.batch_timeout.as_secs(),
            "creating download engine"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency)),
            verify_gate: Arc::new(Semaphore::new(PRECHECK_PARALLELISM)),
            config,
            client,
            state: Arc::new(BatchState::new()),
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current progress of the running (or last) batch.
    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.state.snapshot()
    }

    /// Shared handle to the progress counters, for pollers on other tasks.
    #[must_use]
    pub fn progress_handle(&self) -> Arc<BatchState> {
        Arc::clone(&self.state)
    }

    /// Fetches a single task outside of a batch (no reconciliation).
    #[instrument(skip(self, task), fields(url = %task.url()))]
    pub async fn fetch_one(&self, task: FetchTask) -> FetchOutcome {
        self.state.begin_batch(1);
        let _guard = CompletionGuard::new(Arc::clone(&self.state), task.file_name());
        self.worker().fetch(&task).await
    }

    /// Runs one batch and reconciles it.
    ///
    /// Tasks resolving to the same destination are collapsed to the first
    /// one. Individual failures never fail the batch; they show up in
    /// [`BatchReport::failed`].
    #[instrument(skip(self, tasks))]
    pub async fn run_batch(&self, tasks: impl IntoIterator<Item = FetchTask>) -> BatchReport {
        let tasks = dedupe(tasks);
        info!(tasks = tasks.len(), "starting batch");

        self.state
            .begin_batch(u64::try_from(tasks.len()).unwrap_or(u64::MAX));

        let mut workers = JoinSet::new();
        for task in &tasks {
            let guard = CompletionGuard::new(Arc::clone(&self.state), task.file_name());
            let worker = self.worker();
            let task = task.clone();
            workers.spawn(async move {
                let _guard = guard;
                worker.fetch(&task).await
            });
        }

        let mut stats = BatchStats::default();
        let drain = async {
            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok(outcome) => stats.record(&outcome),
                    Err(e) => {
                        warn!(error = %e, "download task panicked");
                        stats.failed += 1;
                    }
                }
            }
        };
        let timed_out = tokio::time::timeout(self.config.batch_timeout, drain)
            .await
            .is_err();

        if timed_out {
            warn!(
                outstanding = workers.len(),
                timeout_secs = self.config.batch_timeout.as_secs(),
                "batch timed out, abandoning outstanding transfers"
            );
            stats.aborted = workers.len();
            workers.abort_all();
            // Wait for the aborted tasks to be dropped so their guards have
            // run before anything is re-checked or resubmitted.
            while workers.join_next().await.is_some() {}
        }

        let failed = reconcile(&tasks, self.config.insecure).await;

        info!(
            transferred = stats.transferred,
            already_satisfied = stats.already_satisfied,
            mismatched = stats.mismatched,
            failed = stats.failed,
            aborted = stats.aborted,
            bytes = stats.bytes,
            still_failing = failed.len(),
            "batch complete"
        );

        BatchReport {
            failed,
            stats,
            timed_out,
            rounds: 1,
        }
    }

    /// Runs batches until every task verifies or `max_rounds` is reached.
    ///
    /// Round one downloads everything; each later round resubmits only the
    /// previous round's failures. `max_rounds` of 0 is treated as 1.
    #[instrument(skip(self, tasks))]
    pub async fn run_until_complete(
        &self,
        tasks: impl IntoIterator<Item = FetchTask>,
        max_rounds: u32,
    ) -> BatchReport {
        let max_rounds = max_rounds.max(1);
        let mut pending: Vec<FetchTask> = tasks.into_iter().collect();
        let mut report = BatchReport::default();

        while report.rounds < max_rounds {
            report.rounds += 1;
            let round = self.run_batch(std::mem::take(&mut pending)).await;
            report.stats.merge(&round.stats);
            report.timed_out |= round.timed_out;
            pending = round.failed;

            if pending.is_empty() {
                break;
            }
            if report.rounds < max_rounds {
                info!(
                    round = report.rounds,
                    remaining = pending.len(),
                    "retrying failed tasks"
                );
            }
        }

        if !pending.is_empty() {
            warn!(
                rounds = report.rounds,
                remaining = pending.len(),
                "tasks still failing after final round"
            );
        }
        report.failed = pending;
        report
    }

    fn worker(&self) -> FetchWorker {
        FetchWorker {
            client: self.client.clone(),
            gate: Arc::clone(&self.semaphore),
            verify_gate: Arc::clone(&self.verify_gate),
            state: Arc::clone(&self.state),
            insecure: self.config.insecure,
        }
    }
}

/// Keeps the first task for each destination so no two workers ever write
/// the same file. Tasks without a valid destination pass through and fail
/// in their worker.
fn dedupe(tasks: impl IntoIterator<Item = FetchTask>) -> Vec<FetchTask> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| match task.destination() {
            Ok(path) => {
                let first = seen.insert(path);
                if !first {
                    debug!(url = %task.url(), "dropping duplicate destination");
                }
                first
            }
            Err(_) => true,
        })
        .collect()
}
