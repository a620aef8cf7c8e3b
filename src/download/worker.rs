//! Single-file fetch: skip-if-satisfied, gated transfer, verification.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, instrument, warn};

use super::progress::{BatchState, TransferGuard};
use super::task::FetchTask;
use super::verify::{VerificationOutcome, sha1_hex};
use super::{DownloadError, HttpClient};

/// What happened to one task.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The destination already held acceptable content; nothing was transferred.
    AlreadySatisfied(VerificationOutcome),
    /// The file was transferred and then checked.
    ///
    /// With [`VerificationOutcome::Mismatch`] the file has already been deleted.
    Transferred {
        /// Bytes written to disk.
        bytes: u64,
        /// Result of the post-transfer check.
        verification: VerificationOutcome,
    },
    /// The task could not be completed.
    Failed(DownloadError),
}

impl FetchOutcome {
    /// True when an acceptable file is on disk.
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::AlreadySatisfied(verification)
            | Self::Transferred { verification, .. } => verification.is_acceptable(),
            Self::Failed(_) => false,
        }
    }
}

/// How a task's file is to be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HashCheck<'a> {
    Sha1(&'a str),
    Skip(VerificationOutcome),
}

/// Everything a worker needs; cheap to clone into each spawned task.
#[derive(Debug, Clone)]
pub(crate) struct FetchWorker {
    pub(crate) client: HttpClient,
    pub(crate) gate: Arc<Semaphore>,
    /// Bounds concurrent hashing of files already on disk.
    pub(crate) verify_gate: Arc<Semaphore>,
    pub(crate) state: Arc<BatchState>,
    pub(crate) insecure: bool,
}

impl FetchWorker {
    /// Fetches one task. Errors are logged here and returned as
    /// [`FetchOutcome::Failed`]; nothing propagates to sibling workers.
    ///
    /// `files_remaining` bookkeeping is the caller's job (see
    /// `CompletionGuard`) so it also covers workers that never get polled.
    #[instrument(level = "debug", skip(self, task), fields(url = %task.url()))]
    pub(crate) async fn fetch(&self, task: &FetchTask) -> FetchOutcome {
        let destination = match task.destination() {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "cannot place task on disk");
                return FetchOutcome::Failed(e);
            }
        };

        let check = match self.hash_check(task) {
            Ok(check) => check,
            Err(e) => {
                error!(error = %e, "malformed task");
                return FetchOutcome::Failed(e);
            }
        };

        if let Some(verification) = self.existing_satisfies(&destination, check).await {
            debug!(path = %destination.display(), "already on disk");
            return FetchOutcome::AlreadySatisfied(verification);
        }

        let Ok(permit) = self.gate.acquire().await else {
            let e = DownloadError::admission_closed(task.url().as_str());
            error!(error = %e, "admission gate closed");
            return FetchOutcome::Failed(e);
        };
        let transfer = TransferGuard::new(Arc::clone(&self.state));

        let result = self
            .client
            .download_to_path(task.url(), &destination, &self.state)
            .await;
        drop(transfer);
        drop(permit);

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.is_transient() {
                    warn!(error = %e, "transfer failed");
                } else {
                    error!(error = %e, "fetch failed");
                }
                return FetchOutcome::Failed(e);
            }
        };

        let verification = match check {
            HashCheck::Sha1(expected) => {
                let digest = {
                    let _hashing = self.verify_gate.acquire().await.ok();
                    sha1_hex(&destination).await
                };
                match digest {
                    Ok(actual) if actual.eq_ignore_ascii_case(expected.trim()) => {
                        VerificationOutcome::Verified
                    }
                    Ok(actual) => {
                        warn!(
                            file = %task.file_name(),
                            expected,
                            %actual,
                            "SHA-1 mismatch, deleting file (run with --insecure to skip hash checks)"
                        );
                        remove_quietly(&destination).await;
                        VerificationOutcome::Mismatch
                    }
                    Err(e) => {
                        // Left in place; reconciliation re-checks it.
                        let e = DownloadError::io(destination.clone(), e);
                        error!(error = %e, "cannot hash downloaded file");
                        return FetchOutcome::Failed(e);
                    }
                }
            }
            HashCheck::Skip(outcome) => {
                debug!(file = %task.file_name(), ?outcome, "ignoring hash check for this file");
                outcome
            }
        };

        debug!(bytes, ?verification, "fetch finished");
        FetchOutcome::Transferred {
            bytes,
            verification,
        }
    }

    fn hash_check<'a>(&self, task: &'a FetchTask) -> Result<HashCheck<'a>, DownloadError> {
        if self.insecure {
            return Ok(HashCheck::Skip(VerificationOutcome::SkippedInsecure));
        }
        match task.expected_sha1() {
            None => Ok(HashCheck::Skip(VerificationOutcome::SkippedNoHash)),
            Some(hash) if hash.trim().is_empty() => {
                Err(DownloadError::missing_hash(task.url().as_str()))
            }
            Some(hash) => Ok(HashCheck::Sha1(hash)),
        }
    }

    /// Returns the outcome to report if the file on disk can be kept as is.
    ///
    /// A hashed file is re-verified under `verify_gate`. Only a file that was
    /// read in full and hashes differently is removed; a read error leaves
    /// it in place and falls through to a fresh transfer. Without a hash,
    /// presence is enough.
    async fn existing_satisfies(
        &self,
        path: &Path,
        check: HashCheck<'_>,
    ) -> Option<VerificationOutcome> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return None;
        }
        let expected = match check {
            HashCheck::Sha1(expected) => expected,
            HashCheck::Skip(outcome) => return Some(outcome),
        };

        let Ok(_hashing) = self.verify_gate.acquire().await else {
            debug!(path = %path.display(), "verify gate closed, not checking existing file");
            return None;
        };
        match sha1_hex(path).await {
            Ok(actual) if actual.eq_ignore_ascii_case(expected.trim()) => {
                Some(VerificationOutcome::Verified)
            }
            Ok(actual) => {
                debug!(path = %path.display(), %actual, expected, "existing file is stale");
                remove_quietly(path).await;
                None
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot hash existing file, fetching again");
                None
            }
        }
    }
}

/// Deletes `path`, logging (not returning) failures.
pub(crate) async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => error!(path = %path.display(), error = %e, "failed to delete file"),
    }
}
