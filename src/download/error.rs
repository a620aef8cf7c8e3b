//! Error types for the download module.
//!
//! Every error carries the URL or path it concerns so a failed task can be
//! logged and reported without extra bookkeeping at the call site.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching a single file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error (create directories, write, delete).
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The URL path cannot be mapped to a location under the destination root.
    #[error("cannot derive a destination path from {url}: {reason}")]
    UnsafePath {
        /// The URL whose path was rejected.
        url: String,
        /// Why the path was rejected.
        reason: &'static str,
    },

    /// The admission gate was closed before the transfer could start.
    #[error("admission gate closed before {url} could start")]
    AdmissionClosed {
        /// The URL that never got a slot.
        url: String,
    },

    /// Verification is enabled but the task carries a blank hash.
    #[error("blank SHA-1 for {url}; refusing to keep an unverified file")]
    MissingHash {
        /// The URL of the malformed task.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an unsafe destination path error.
    pub fn unsafe_path(url: impl Into<String>, reason: &'static str) -> Self {
        Self::UnsafePath {
            url: url.into(),
            reason,
        }
    }

    /// Creates an admission-closed error.
    pub fn admission_closed(url: impl Into<String>) -> Self {
        Self::AdmissionClosed { url: url.into() }
    }

    /// Creates a malformed-task error for a blank expected hash.
    pub fn missing_hash(url: impl Into<String>) -> Self {
        Self::MissingHash { url: url.into() }
    }

    /// Returns true for failures that may clear up on a later round
    /// (connection problems, timeouts, server-side 5xx/429).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Io { .. }
            | Self::InvalidUrl { .. }
            | Self::UnsafePath { .. }
            | Self::AdmissionClosed { .. }
            | Self::MissingHash { .. } => false,
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// URL or path, which the source errors don't carry.
