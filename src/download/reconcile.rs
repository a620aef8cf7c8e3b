//! Post-batch reconciliation: find the tasks whose files are missing or wrong.

use futures_util::{StreamExt, stream};
use tracing::{debug, info, instrument, warn};

use super::constants::RECONCILE_PARALLELISM;
use super::task::FetchTask;
use super::verify::sha1_hex;
use super::worker::remove_quietly;

/// Re-checks every task against the disk and returns the ones that need
/// another round.
///
/// A task is bad when its destination is absent, cannot be derived, or (with
/// verification enabled and a hash supplied) does not hash to the expected
/// value. Files that were read and hash wrongly are deleted so nothing
/// corrupt survives the pass; files that cannot be read are left in place.
/// Results come back in no particular order.
#[instrument(skip(tasks), fields(tasks = tasks.len()))]
pub async fn reconcile(tasks: &[FetchTask], insecure: bool) -> Vec<FetchTask> {
    let bad: Vec<FetchTask> = stream::iter(tasks)
        .map(|task| async move { (!is_satisfied(task, insecure).await).then(|| task.clone()) })
        .buffer_unordered(RECONCILE_PARALLELISM)
        .filter_map(std::future::ready)
        .collect()
        .await;

    info!(checked = tasks.len(), bad = bad.len(), "reconciliation complete");
    bad
}

async fn is_satisfied(task: &FetchTask, insecure: bool) -> bool {
    let destination = match task.destination() {
        Ok(path) => path,
        Err(e) => {
            warn!(url = %task.url(), error = %e, "task has no valid destination");
            return false;
        }
    };

    match task.expected_sha1() {
        Some(expected) if !insecure => match sha1_hex(&destination).await {
            Ok(actual) if actual.eq_ignore_ascii_case(expected.trim()) => true,
            Ok(actual) => {
                debug!(path = %destination.display(), %actual, expected, "mismatched");
                remove_quietly(&destination).await;
                false
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %destination.display(), "missing");
                false
            }
            Err(e) => {
                warn!(path = %destination.display(), error = %e, "cannot hash file");
                false
            }
        },
        _ => {
            let present = tokio::fs::try_exists(&destination).await.unwrap_or(false);
            if !present {
                debug!(path = %destination.display(), "missing");
            }
            present
        }
    }
}
