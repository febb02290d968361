//! Export error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    /// Bucket widths are whole days and must be positive
    #[error("Invalid bucket width: {0}")]
    InvalidBucketWidth(u32),

    #[error("Unknown feature group: {0}")]
    UnknownFeatureGroup(String),

    #[error("Invalid export schema: {0}")]
    InvalidSchema(String),

    #[error("Unknown export format: {0}")]
    UnknownFormat(String),

    #[error("Store error: {0}")]
    Store(#[from] codecite_common::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
