use std::path::PathBuf;
use thiserror::Error;

/// Errors that can abort a run before or during execution.
///
/// Validation errors and pipeline errors (see SPEC_FULL.md 4.13) use this
/// type and unwind to the caller. Per-file errors are *not* represented
/// here once they reach the pipeline: they are converted into
/// [`crate::model::FileDifference`] records and `Report::errors` entries so
/// that one failing file never aborts the run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("source path does not exist: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("destination path does not exist: {path}\nuse --create-dest to create it")]
    DestinationNotFound { path: PathBuf },

    #[error("source and destination must not be nested: {source} / {destination}")]
    NestedPaths { source: PathBuf, destination: PathBuf },

    #[error("permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to list directory: {path}\ncause: {source}")]
    ListError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read: {path}\ncause: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write: {path}\ncause: {source}")]
    CopyError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid path: {path}")]
    InvalidPath { path: PathBuf },

    #[error("invalid configuration value for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to load sync state at {path}\ncause: {source}")]
    StateCorrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
