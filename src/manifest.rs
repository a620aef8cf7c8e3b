//! Task input for the CLI: positional URLs and JSON manifests.

use std::path::Path;

use anyhow::{Context, Result};
use launcher_fetch::{FetchTask, PathLayout};
use serde::Deserialize;

/// `sha1` value some version resolvers emit for files that carry no hash
/// (asset indexes). Treated exactly like an absent `sha1`.
const NO_HASH_SENTINEL: &str = "UNPROVIDED";

/// One manifest entry as produced by a version resolver.
///
/// ```json
/// [
///   { "url": "https://libraries.example.net/org/lwjgl/lwjgl.jar", "sha1": "..." },
///   { "url": "https://example.net/indexes/17.json", "path_layout": "file_name_only" }
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub path_layout: Option<LayoutSetting>,
}

/// Path layout label accepted in manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutSetting {
    MirrorUrlPath,
    FileNameOnly,
}

impl From<LayoutSetting> for PathLayout {
    fn from(value: LayoutSetting) -> Self {
        match value {
            LayoutSetting::MirrorUrlPath => Self::MirrorUrlPath,
            LayoutSetting::FileNameOnly => Self::FileNameOnly,
        }
    }
}

/// Parses a JSON manifest into tasks rooted at `dest`.
///
/// Entries without a `path_layout` use `default_layout`.
pub fn parse_manifest(raw: &str, dest: &Path, default_layout: PathLayout) -> Result<Vec<FetchTask>> {
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(raw).context("Manifest is not a JSON array of entries")?;

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let mut task = FetchTask::new(&entry.url, dest)
                .with_context(|| format!("Manifest entry {index} has an invalid URL"))?
                .with_layout(entry.path_layout.map_or(default_layout, PathLayout::from));
            if let Some(sha1) = entry.sha1.filter(|sha1| sha1 != NO_HASH_SENTINEL) {
                task = task.with_sha1(sha1);
            }
            Ok(task)
        })
        .collect()
}

/// Builds unhashed tasks from positional URLs.
pub fn tasks_from_urls(urls: &[String], dest: &Path, layout: PathLayout) -> Result<Vec<FetchTask>> {
    urls.iter()
        .map(|url| {
            FetchTask::new(url, dest)
                .map(|task| task.with_layout(layout))
                .with_context(|| format!("Cannot download '{url}'"))
        })
        .collect()
}
