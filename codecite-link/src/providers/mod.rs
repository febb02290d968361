//! Provider seam
//!
//! Citation providers answer "which records describe this title from this year";
//! repository providers turn an identity key into a raw snapshot. Both sit behind a
//! [`Throttle`] that enforces the provider's call budget and retries transient failures.

mod local;
mod throttle;

pub use local::{normalize_title, CitationDumpProvider, SnapshotDirProvider};
pub use throttle::Throttle;

use async_trait::async_trait;
use codecite_common::{Platform, RepositoryKey, RepositorySnapshot};
use serde_json::Value;
use thiserror::Error;

/// Provider failures
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Worth retrying (timeouts, 5xx, dropped connections)
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Provider asked us to slow down
    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider error: {0}")]
    Other(String),
}

/// One raw record returned by a citation provider
#[derive(Debug, Clone, PartialEq)]
pub struct CitationRecord {
    pub title: Option<String>,
    /// Date-bearing fields present on the record (display date, cover date, ...)
    pub date_fields: Vec<Value>,
    /// Record as returned, stored verbatim when accepted
    pub raw: Value,
}

#[async_trait]
pub trait CitationProvider: Send + Sync {
    /// Source name the accepted records are stored under (e.g. `scholar`)
    fn source(&self) -> &str;

    async fn search(&self, title: &str, year: i32) -> Result<Vec<CitationRecord>, ProviderError>;
}

#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch(&self, key: &RepositoryKey) -> Result<RepositorySnapshot, ProviderError>;
}
