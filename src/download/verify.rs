//! SHA-1 integrity checks for files on disk.
//!
//! Hashing streams the file through a fixed buffer so multi-hundred-megabyte
//! client jars never sit in memory.

use std::path::Path;

use sha1::{Digest, Sha1};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, error};

use super::constants::HASH_BUFFER_SIZE;

/// Result of checking a fetched file against its expected hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Digest matched the expected value.
    Verified,
    /// Digest did not match; the file has been removed.
    Mismatch,
    /// The task carried no hash, so nothing was checked.
    SkippedNoHash,
    /// Verification is globally disabled (insecure mode).
    SkippedInsecure,
}

impl VerificationOutcome {
    /// True when the file may stay on disk.
    #[must_use]
    pub fn is_acceptable(self) -> bool {
        !matches!(self, Self::Mismatch)
    }
}

/// Computes the lowercase hex SHA-1 of the file at `path`.
///
/// # Errors
///
/// Returns the underlying IO error if the file cannot be opened or read.
pub async fn sha1_hex(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Returns true if the file at `path` hashes to `expected` (case-insensitive).
///
/// Fails closed: a missing or unreadable file is reported as a mismatch.
pub async fn verify_sha1(path: &Path, expected: &str) -> bool {
    match sha1_hex(path).await {
        Ok(actual) => {
            let matches = actual.eq_ignore_ascii_case(expected.trim());
            debug!(path = %path.display(), %actual, expected, matches, "hashed file");
            matches
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "file to verify does not exist");
            false
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to hash file");
            false
        }
    }
}
