//! Storage error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the session, policy and body stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored JSON value (config entry, body sidecar) did not round-trip.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A body file or its sidecar could not be read or written.
    #[error("Body file {path:?}: {source}")]
    Body {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Record not found: {0}")]
    NotFound(String),

    /// A policy document cannot be stored as given.
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    pub(crate) fn body(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| StorageError::Body { path, source }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
