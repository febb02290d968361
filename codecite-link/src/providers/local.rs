//! File-backed providers
//!
//! Replay previously crawled provider responses from disk so the linking passes can run
//! offline and reproducibly.

use super::{CitationProvider, CitationRecord, ProviderError, RepositoryProvider};
use async_trait::async_trait;
use codecite_common::{Platform, RepositoryKey, RepositorySnapshot};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Date pointers checked when none are configured (Scopus-style and plain year fields)
const DEFAULT_DATE_POINTERS: &[&str] = &["/prism:coverDisplayDate", "/prism:coverDate", "/year"];

/// Snapshots stored as `<root>/<platform>/<owner>/<name>.json`
pub struct SnapshotDirProvider {
    root: PathBuf,
    platform: Platform,
}

impl SnapshotDirProvider {
    pub fn new(root: impl Into<PathBuf>, platform: Platform) -> Self {
        Self {
            root: root.into(),
            platform,
        }
    }

    fn snapshot_path(&self, key: &RepositoryKey) -> PathBuf {
        self.root
            .join(key.platform.as_str())
            .join(&key.owner)
            .join(format!("{}.json", key.name))
    }
}

#[async_trait]
impl RepositoryProvider for SnapshotDirProvider {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(&self, key: &RepositoryKey) -> Result<RepositorySnapshot, ProviderError> {
        let path = self.snapshot_path(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::NotFound(key.as_key()))
            }
            Err(e) => return Err(ProviderError::Transient(format!("{}: {}", path.display(), e))),
        };

        let mut snapshot: RepositorySnapshot = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Other(format!("{}: {}", path.display(), e)))?;
        // Stored files may spell the key differently
        snapshot.key = key.clone();

        debug!(key = %key, path = %path.display(), "Loaded repository snapshot");
        Ok(snapshot)
    }
}

/// Citation search over a JSON array of raw provider records
pub struct CitationDumpProvider {
    source: String,
    records: Vec<Value>,
    title_pointer: String,
    date_pointers: Vec<String>,
}

impl CitationDumpProvider {
    pub fn new(source: impl Into<String>, records: Vec<Value>) -> Self {
        Self {
            source: source.into(),
            records,
            title_pointer: "/title".to_string(),
            date_pointers: DEFAULT_DATE_POINTERS.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Load records from a file holding a JSON array
    pub fn from_file(source: impl Into<String>, path: &Path) -> Result<Self, ProviderError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ProviderError::Other(format!("{}: {}", path.display(), e)))?;
        let records: Vec<Value> = serde_json::from_str(&content)
            .map_err(|e| ProviderError::Other(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(source, records))
    }

    pub fn with_date_pointers(mut self, pointers: Vec<String>) -> Self {
        self.date_pointers = pointers;
        self
    }

    fn to_citation_record(&self, raw: &Value) -> CitationRecord {
        CitationRecord {
            title: raw
                .pointer(&self.title_pointer)
                .and_then(Value::as_str)
                .map(str::to_string),
            date_fields: self
                .date_pointers
                .iter()
                .filter_map(|pointer| raw.pointer(pointer))
                .cloned()
                .collect(),
            raw: raw.clone(),
        }
    }
}

#[async_trait]
impl CitationProvider for CitationDumpProvider {
    fn source(&self) -> &str {
        &self.source
    }

    /// Records whose normalized title contains the normalized query (or vice versa).
    /// Year filtering is left to the date window.
    async fn search(&self, title: &str, _year: i32) -> Result<Vec<CitationRecord>, ProviderError> {
        let query = normalize_title(title);
        if query.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .records
            .iter()
            .map(|raw| self.to_citation_record(raw))
            .filter(|record| {
                record.title.as_deref().map(normalize_title).is_some_and(|candidate| {
                    !candidate.is_empty() && (candidate.contains(&query) || query.contains(&candidate))
                })
            })
            .collect())
    }
}

/// Lowercase, keep alphanumerics, collapse everything else to single spaces
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
