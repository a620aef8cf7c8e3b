//! Fetch tasks and destination path derivation.

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use super::DownloadError;

/// How a task's URL maps onto its destination root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PathLayout {
    /// Recreate the remote directory structure: `https://host/a/b/c.jar`
    /// lands at `<root>/a/b/c.jar`.
    #[default]
    MirrorUrlPath,
    /// Keep only the final path segment: `<root>/c.jar`.
    FileNameOnly,
}

/// One unit of work: a URL, its optional SHA-1 and where it belongs on disk.
///
/// A task is immutable once built; the builder methods consume `self`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchTask {
    url: Url,
    expected_sha1: Option<String>,
    root: PathBuf,
    layout: PathLayout,
}

impl FetchTask {
    /// Parses `url` and creates a task rooted at `root` with no expected hash.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if the URL does not parse or is
    /// not `http`/`https`.
    pub fn new(url: &str, root: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        Self::from_url(parsed, root)
    }

    /// Creates a task from an already parsed URL.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for schemes other than `http`/`https`.
    pub fn from_url(url: Url, root: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url.as_str()));
        }
        Ok(Self {
            url,
            expected_sha1: None,
            root: root.into(),
            layout: PathLayout::default(),
        })
    }

    /// Sets the expected SHA-1 (hex, any case).
    #[must_use]
    pub fn with_sha1(mut self, sha1: impl Into<String>) -> Self {
        self.expected_sha1 = Some(sha1.into());
        self
    }

    /// Sets the path layout.
    #[must_use]
    pub fn with_layout(mut self, layout: PathLayout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn expected_sha1(&self) -> Option<&str> {
        self.expected_sha1.as_deref()
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn layout(&self) -> PathLayout {
        self.layout
    }

    /// Resolves the on-disk location of this task.
    ///
    /// Segments are percent-decoded; empty intermediate segments (`//`) are
    /// skipped. Dot segments and segments containing path separators are
    /// rejected so a URL can never escape the destination root.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::UnsafePath`] when the URL has no file name or
    /// contains a segment that cannot be placed under the root.
    pub fn destination(&self) -> Result<PathBuf, DownloadError> {
        let segments = self.decoded_segments()?;
        let Some(file_name) = segments.last() else {
            return Err(DownloadError::unsafe_path(
                self.url.as_str(),
                "URL path has no file name",
            ));
        };

        let path = match self.layout {
            PathLayout::MirrorUrlPath => segments
                .iter()
                .fold(self.root.clone(), |acc, segment| acc.join(segment)),
            PathLayout::FileNameOnly => self.root.join(file_name),
        };
        Ok(path)
    }

    /// Last path segment, used for progress display.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                urlencoding::decode(segment)
                    .map_or_else(|_| segment.to_string(), std::borrow::Cow::into_owned)
            })
            .unwrap_or_else(|| self.url.as_str().to_string())
    }

    fn decoded_segments(&self) -> Result<Vec<String>, DownloadError> {
        let Some(raw_segments) = self.url.path_segments() else {
            return Err(DownloadError::unsafe_path(
                self.url.as_str(),
                "URL cannot be a base",
            ));
        };
        let raw: Vec<&str> = raw_segments.collect();
        if raw.last().is_none_or(|last| last.is_empty()) {
            return Err(DownloadError::unsafe_path(
                self.url.as_str(),
                "URL path has no file name",
            ));
        }

        let mut decoded = Vec::with_capacity(raw.len());
        for segment in raw.into_iter().filter(|s| !s.is_empty()) {
            let segment = urlencoding::decode(segment)
                .map_err(|_| DownloadError::unsafe_path(self.url.as_str(), "segment is not UTF-8"))?
                .into_owned();
            if segment == "." || segment == ".." {
                return Err(DownloadError::unsafe_path(
                    self.url.as_str(),
                    "dot segment in URL path",
                ));
            }
            if segment.contains(['/', '\\', '\0']) {
                return Err(DownloadError::unsafe_path(
                    self.url.as_str(),
                    "separator inside URL path segment",
                ));
            }
            decoded.push(segment);
        }
        Ok(decoded)
    }
}

impl fmt::Display for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_layout_keeps_remote_directories() {
        let task = FetchTask::new(
            "https://libraries.example.net/org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1.jar",
            "/games/libraries",
        )
        .unwrap();
        assert_eq!(
            task.destination().unwrap(),
            PathBuf::from("/games/libraries/org/lwjgl/lwjgl/3.3.1/lwjgl-3.3.1.jar")
        );
    }

    #[test]
    fn test_file_name_layout_flattens() {
        let task = FetchTask::new("https://cdn.example.net/v1/objects/client.jar", "/games/v")
            .unwrap()
            .with_layout(PathLayout::FileNameOnly);
        assert_eq!(
            task.destination().unwrap(),
            PathBuf::from("/games/v/client.jar")
        );
    }

    #[test]
    fn test_query_string_is_not_part_of_the_path() {
        let task = FetchTask::new("https://cdn.example.net/a/b.json?token=1", "/r").unwrap();
        assert_eq!(task.destination().unwrap(), PathBuf::from("/r/a/b.json"));
    }

    #[test]
    fn test_percent_encoded_segments_are_decoded() {
        let task = FetchTask::new("https://cdn.example.net/sounds/ambient%20cave.ogg", "/r")
            .unwrap()
            .with_layout(PathLayout::FileNameOnly);
        assert_eq!(
            task.destination().unwrap(),
            PathBuf::from("/r/ambient cave.ogg")
        );
        assert_eq!(task.file_name(), "ambient cave.ogg");
    }

    #[test]
    fn test_double_slashes_are_skipped() {
        let task = FetchTask::new("https://cdn.example.net//ab//abcdef", "/r").unwrap();
        assert_eq!(task.destination().unwrap(), PathBuf::from("/r/ab/abcdef"));
    }

    #[test]
    fn test_trailing_slash_has_no_file_name() {
        let task = FetchTask::new("https://cdn.example.net/dir/", "/r").unwrap();
        assert!(matches!(
            task.destination(),
            Err(DownloadError::UnsafePath { .. })
        ));
    }

    #[test]
    fn test_encoded_traversal_is_rejected() {
        let task = FetchTask::new("https://cdn.example.net/a/%2E%2E%2Fetc/passwd", "/r").unwrap();
        assert!(matches!(
            task.destination(),
            Err(DownloadError::UnsafePath { .. })
        ));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        let result = FetchTask::new("ftp://example.net/file.jar", "/r");
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[test]
    fn test_unparseable_url_rejected() {
        let result = FetchTask::new("not a url", "/r");
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[test]
    fn test_builder_sets_hash_and_layout() {
        let task = FetchTask::new("https://e.net/x.jar", "/r")
            .unwrap()
            .with_sha1("ABC")
            .with_layout(PathLayout::FileNameOnly);
        assert_eq!(task.expected_sha1(), Some("ABC"));
        assert_eq!(task.layout(), PathLayout::FileNameOnly);
        assert_eq!(task.root(), Path::new("/r"));
        assert_eq!(task.to_string(), "https://e.net/x.jar");
    }
}
