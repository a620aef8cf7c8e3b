//! Progress UI (spinner) for download runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use launcher_fetch::{BatchState, ProgressSnapshot};

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    state: Arc<BatchState>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(state, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(state: Arc<BatchState>, stop: Arc<AtomicBool>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            spinner.set_message(format_snapshot(&state.snapshot()));
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}

/// One status line: remaining files, throughput and the last finished file.
pub(crate) fn format_snapshot(snapshot: &ProgressSnapshot) -> String {
    let mut line = format!(
        "{} file(s) left, {:.2} MB/s",
        snapshot.files_remaining,
        snapshot.mebibytes_per_second()
    );
    if let Some(last) = &snapshot.last_completed_file {
        line.push_str(", last: ");
        line.push_str(last);
    }
    line
}
