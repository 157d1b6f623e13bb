//! Error types for the watch-wrapped library.
//!
//! Per-row enrichment failures are recorded as data in the enriched dataset and
//! never surface here. This type covers the failures that abort a batch: local
//! file integrity problems, unusable configuration, and unmet preconditions.

use thiserror::Error;

/// Errors that can occur in the watch-wrapped pipeline.
#[derive(Error, Debug)]
pub enum WrappedError {
    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV read/write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Transport or HTTP status failure talking to the catalog
    #[error("Catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A temp file could not be moved over its destination
    #[error("Failed to persist {path}: {source}")]
    Persist {
        /// Temp file that could not be moved
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The pipeline is not in a state that allows the operation
    #[error("Preconditions not met: {0}")]
    Precondition(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `WrappedError`
pub type Result<T> = std::result::Result<T, WrappedError>;

impl From<anyhow::Error> for WrappedError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<tempfile::PersistError> for WrappedError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Persist {
            path: err.file.path().display().to_string(),
            source: err.error,
        }
    }
}
