//! Export error types.

use std::path::PathBuf;

use sieve_storage::StorageError;
use thiserror::Error;

/// Errors that abort an export.
///
/// Failures scoped to one record never surface here; the record is skipped
/// and the batch continues.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Loading records failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Writing the output failed after it was created.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The output file could not be created.
    #[error("Cannot create export destination {path:?}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The background export task panicked or was cancelled.
    #[error("Export task failed: {0}")]
    Task(String),
}

/// Result type for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;
