//! Streaming HTTP GET into a file on disk.
//!
//! [`HttpClient`] owns the pooled reqwest client and writes response bodies
//! chunk by chunk, reporting bytes to the batch's progress counters.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use super::progress::BatchState;
use crate::user_agent;

/// HTTP client for downloading files with streaming support.
///
/// This client is designed to be created once and reused for a whole batch,
/// taking advantage of connection pooling. Cloning is cheap.
///
/// # Example
///
/// ```no_run
/// use launcher_fetch::{BatchState, HttpClient};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let progress = BatchState::new();
/// let url = url::Url::parse("https://example.com/client.jar")?;
/// let bytes = client
///     .download_to_path(&url, Path::new("./versions/client.jar"), &progress)
///     .await?;
/// println!("wrote {bytes} bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes (for large files)
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error if the TLS backend cannot be
    /// initialised.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Streams `url` into the file at `path`, creating parent directories.
    ///
    /// Each chunk's length is added to `progress` as soon as it has been
    /// handed to the writer. On any error (or if the returned future is
    /// dropped mid-transfer) the partially written file is removed.
    ///
    /// # Returns
    ///
    /// Number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The request fails (network error, timeout)
    /// - The server returns an error status (4xx, 5xx)
    /// - Creating directories or writing to disk fails
    #[instrument(skip(self, progress), fields(url = %url, path = %path.display()))]
    pub async fn download_to_path(
        &self,
        url: &Url,
        path: &Path,
        progress: &BatchState,
    ) -> Result<u64, DownloadError> {
        let response = self.send_get(url).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        // Declared before the file handle so the handle is closed first on drop.
        let partial = PartialFile::new(path);
        let mut file = match File::create(path).await {
            Ok(file) => file,
            Err(e) => {
                // Nothing was truncated, so whatever is on disk stays.
                partial.keep();
                return Err(DownloadError::io(path, e));
            }
        };

        let bytes_written = stream_to_file(&mut file, response, url, path, progress).await?;
        drop(file);
        partial.keep();

        debug!(bytes = bytes_written, "stream complete");
        Ok(bytes_written)
    }

    async fn send_get(&self, url: &Url) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }
        Ok(response)
    }
}

/// Copies the body into `file` and returns the byte count.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &Url,
    file_path: &Path,
    progress: &BatchState,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::network(url.as_str(), e))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;

        let len = chunk.len() as u64;
        bytes_written += len;
        progress.add_bytes(len);
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

/// Removes a partially written file unless [`PartialFile::keep`] is called.
///
/// Cleanup happens in `Drop` so it also runs when the owning future is
/// cancelled.
#[derive(Debug)]
struct PartialFile {
    path: Option<PathBuf>,
}

impl PartialFile {
    fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            debug!(path = %path.display(), "cleaning up partial file");
            if let Err(e) = std::fs::remove_file(&path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "failed to remove partial file");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn url_for(server: &wiremock::MockServer, route: &str) -> Url {
        Url::parse(&format!("{}{route}", server.uri())).unwrap()
    }

    #[tokio::test]
    async fn test_download_to_path_success_counts_bytes() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/client.jar"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jar content here"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let progress = BatchState::new();
        progress.begin_batch(1);
        let target = temp_dir.path().join("versions/1.21/client.jar");

        let written = client
            .download_to_path(&url_for(&mock_server, "/client.jar"), &target, &progress)
            .await
            .unwrap();

        assert_eq!(written, 16);
        assert_eq!(progress.bytes_transferred(), 16);
        assert_eq!(std::fs::read(&target).unwrap(), b"jar content here");
    }

    #[tokio::test]
    async fn test_download_to_path_404_leaves_no_file() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/missing.jar"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let progress = BatchState::new();
        let target = temp_dir.path().join("missing.jar");

        let result = client
            .download_to_path(&url_for(&mock_server, "/missing.jar"), &target, &progress)
            .await;

        match result {
            Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_download_to_path_500_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/error"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let result = client
            .download_to_path(
                &url_for(&mock_server, "/error"),
                &temp_dir.path().join("error"),
                &BatchState::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(DownloadError::HttpStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_download_cleanup_on_read_timeout() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/slow.jar"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::with_timeouts(1, 1).unwrap();
        let target = temp_dir.path().join("slow.jar");
        let result = client
            .download_to_path(&url_for(&mock_server, "/slow.jar"), &target, &BatchState::new())
            .await;

        assert!(
            matches!(result, Err(DownloadError::Timeout { .. })),
            "Expected timeout, got: {result:?}"
        );
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_download_large_file_streams() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let large_content = vec![0u8; 1024 * 1024];

        Mock::given(method("GET"))
            .and(path("/large.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(large_content))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let progress = BatchState::new();
        let target = temp_dir.path().join("large.bin");
        client
            .download_to_path(&url_for(&mock_server, "/large.bin"), &target, &progress)
            .await
            .unwrap();

        assert_eq!(std::fs::metadata(&target).unwrap().len(), 1024 * 1024);
        assert_eq!(progress.bytes_transferred(), 1024 * 1024);
    }

    #[tokio::test]
    async fn test_default_download_sends_user_agent() {
        use wiremock::matchers::header;

        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        let temp_dir = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/ua"))
            .and(header("user-agent", user_agent::default_user_agent().as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok"))
            .mount(&mock_server)
            .await;

        let result = HttpClient::default()
            .download_to_path(
                &url_for(&mock_server, "/ua"),
                &temp_dir.path().join("ua"),
                &BatchState::new(),
            )
            .await;
        assert!(result.is_ok(), "UA header should match: {result:?}");
    }

    #[test]
    fn test_refused_connection_leaves_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("a.jar");
        std::fs::write(&target, b"previous").unwrap();

        let client = HttpClient::new();
        let url = Url::parse("http://127.0.0.1:9/a.jar").unwrap();
        let result =
            tokio_test::block_on(client.download_to_path(&url, &target, &BatchState::new()));

        assert!(result.is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"previous");
    }

    #[test]
    fn test_partial_file_removed_unless_kept() {
        let temp_dir = TempDir::new().unwrap();
        let dropped = temp_dir.path().join("dropped");
        let kept = temp_dir.path().join("kept");
        std::fs::write(&dropped, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(PartialFile::new(&dropped));
        PartialFile::new(&kept).keep();

        assert!(!dropped.exists());
        assert!(kept.exists());
    }
}
