//! Shared progress accounting for a download batch.
//!
//! [`BatchState`] is owned by the engine behind an `Arc` and handed to every
//! worker. Workers only touch it through the counter operations below;
//! callers read it through [`BatchState::snapshot`] at whatever cadence they
//! like.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Point-in-time view of a batch's progress.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Average throughput since the batch started (0 right after start).
    pub bytes_per_second: f64,
    /// Bytes written to disk since the batch started.
    pub bytes_transferred: u64,
    /// Admitted tasks whose worker has not finished yet.
    pub files_remaining: u64,
    /// Name of the most recently finished file, if any.
    pub last_completed_file: Option<String>,
    /// Transfers currently holding an admission slot.
    pub active_transfers: usize,
    /// Highest `active_transfers` observed since the batch started.
    pub peak_active_transfers: usize,
    /// Time since the batch started.
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Throughput in MiB/s, for display.
    #[must_use]
    pub fn mebibytes_per_second(&self) -> f64 {
        self.bytes_per_second / (1024.0 * 1024.0)
    }
}

/// Counters shared by the scheduler and its workers.
///
/// All counters are atomics; the last-file name sits behind a mutex that is
/// only held for the assignment itself.
#[derive(Debug)]
pub struct BatchState {
    origin: Instant,
    started_at_nanos: AtomicU64,
    files_remaining: AtomicU64,
    bytes_transferred: AtomicU64,
    active_transfers: AtomicUsize,
    peak_active_transfers: AtomicUsize,
    last_completed_file: Mutex<Option<String>>,
}

impl Default for BatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            started_at_nanos: AtomicU64::new(0),
            files_remaining: AtomicU64::new(0),
            bytes_transferred: AtomicU64::new(0),
            active_transfers: AtomicUsize::new(0),
            peak_active_transfers: AtomicUsize::new(0),
            last_completed_file: Mutex::new(None),
        }
    }

    /// Admits `count` tasks.
    ///
    /// When nothing was outstanding this is a fresh batch: byte counters and
    /// the clock restart. Must be called before the batch's workers start.
    pub fn begin_batch(&self, count: u64) {
        let previous = self.files_remaining.fetch_add(count, Ordering::SeqCst);
        if previous == 0 {
            self.bytes_transferred.store(0, Ordering::SeqCst);
            self.peak_active_transfers
                .store(self.active_transfers.load(Ordering::SeqCst), Ordering::SeqCst);
            self.started_at_nanos
                .store(self.nanos_since_origin(), Ordering::SeqCst);
            debug!(count, "started new batch");
        } else {
            debug!(count, outstanding = previous, "joined running batch");
        }
    }

    /// Adds freshly written bytes.
    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Marks one admitted task as finished.
    pub fn finish_file(&self, file_name: &str) {
        self.set_last_completed(file_name);
        let decremented = self
            .files_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if decremented.is_err() {
            warn!(file = file_name, "finished a file with no files remaining");
        }
    }

    /// Records the most recently finished file name.
    pub fn set_last_completed(&self, file_name: &str) {
        let mut guard = self
            .last_completed_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(file_name.to_string());
    }

    #[must_use]
    pub fn files_remaining(&self) -> u64 {
        self.files_remaining.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    /// Takes a consistent-enough snapshot of every counter.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let bytes_transferred = self.bytes_transferred();
        let elapsed = self.elapsed();
        let secs = elapsed.as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let bytes_per_second = if secs > 0.0 {
            bytes_transferred as f64 / secs
        } else {
            0.0
        };
        let last_completed_file = self
            .last_completed_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        ProgressSnapshot {
            bytes_per_second,
            bytes_transferred,
            files_remaining: self.files_remaining(),
            last_completed_file,
            active_transfers: self.active_transfers.load(Ordering::SeqCst),
            peak_active_transfers: self.peak_active_transfers.load(Ordering::SeqCst),
            elapsed,
        }
    }

    fn elapsed(&self) -> Duration {
        let started = self.started_at_nanos.load(Ordering::SeqCst);
        Duration::from_nanos(self.nanos_since_origin().saturating_sub(started))
    }

    fn nanos_since_origin(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Finishes a task when dropped.
///
/// Created as soon as a worker owns a task, so `files_remaining` is
/// decremented exactly once no matter how the worker exits (including being
/// aborted by the batch timeout).
#[derive(Debug)]
pub(crate) struct CompletionGuard {
    state: Arc<BatchState>,
    file_name: String,
}

impl CompletionGuard {
    pub(crate) fn new(state: Arc<BatchState>, file_name: String) -> Self {
        Self { state, file_name }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.state.finish_file(&self.file_name);
    }
}

/// Counts one in-flight transfer for as long as it lives.
#[derive(Debug)]
pub(crate) struct TransferGuard {
    state: Arc<BatchState>,
}

impl TransferGuard {
    pub(crate) fn new(state: Arc<BatchState>) -> Self {
        let active = state.active_transfers.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_active_transfers.fetch_max(active, Ordering::SeqCst);
        Self { state }
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.state.active_transfers.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = BatchState::new();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.files_remaining, 0);
        assert_eq!(snapshot.bytes_transferred, 0);
        assert_eq!(snapshot.last_completed_file, None);
        assert_eq!(snapshot.active_transfers, 0);
    }

    #[test]
    fn test_bytes_per_second_zero_without_bytes() {
        let state = BatchState::new();
        state.begin_batch(1);
        assert!(state.snapshot().bytes_per_second.abs() < f64::EPSILON);
    }

    #[test]
    fn test_bytes_per_second_positive_after_transfer() {
        let state = BatchState::new();
        state.begin_batch(1);
        state.add_bytes(4096);
        std::thread::sleep(Duration::from_millis(5));
        let snapshot = state.snapshot();
        assert!(snapshot.bytes_per_second > 0.0);
        assert!(snapshot.mebibytes_per_second() < snapshot.bytes_per_second);
    }

    #[test]
    fn test_finish_file_decrements_and_records_name() {
        let state = BatchState::new();
        state.begin_batch(2);
        state.finish_file("a.jar");
        let snapshot = state.snapshot();
        assert_eq!(snapshot.files_remaining, 1);
        assert_eq!(snapshot.last_completed_file.as_deref(), Some("a.jar"));
    }

    #[test]
    fn test_finish_file_never_underflows() {
        let state = BatchState::new();
        state.finish_file("stray");
        assert_eq!(state.files_remaining(), 0);
    }

    #[test]
    fn test_bytes_reset_only_when_batch_fully_drained() {
        let state = BatchState::new();
        state.begin_batch(1);
        state.add_bytes(100);

        // Joining a running batch keeps the counters.
        state.begin_batch(1);
        assert_eq!(state.bytes_transferred(), 100);

        state.finish_file("a");
        state.finish_file("b");
        assert_eq!(state.bytes_transferred(), 100);

        // Fresh batch after draining resets.
        state.begin_batch(3);
        assert_eq!(state.bytes_transferred(), 0);
        assert_eq!(state.files_remaining(), 3);
    }

    #[test]
    fn test_completion_guard_finishes_on_drop() {
        let state = Arc::new(BatchState::new());
        state.begin_batch(1);
        {
            let _guard = CompletionGuard::new(Arc::clone(&state), "client.jar".to_string());
            assert_eq!(state.files_remaining(), 1);
        }
        assert_eq!(state.files_remaining(), 0);
        assert_eq!(
            state.snapshot().last_completed_file.as_deref(),
            Some("client.jar")
        );
    }

    #[test]
    fn test_transfer_guard_tracks_peak() {
        let state = Arc::new(BatchState::new());
        state.begin_batch(3);
        let a = TransferGuard::new(Arc::clone(&state));
        let b = TransferGuard::new(Arc::clone(&state));
        assert_eq!(state.snapshot().active_transfers, 2);
        drop(a);
        drop(b);
        let _c = TransferGuard::new(Arc::clone(&state));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.active_transfers, 1);
        assert_eq!(snapshot.peak_active_transfers, 2);
    }

    #[test]
    fn test_counters_thread_safe() {
        use std::thread;

        let state = Arc::new(BatchState::new());
        state.begin_batch(1000);
        let mut handles = Vec::new();

        for _ in 0..10 {
            let state = Arc::clone(&state);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    state.add_bytes(3);
                    state.finish_file("f");
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(state.bytes_transferred(), 3000);
        assert_eq!(state.files_remaining(), 0);
    }
}
