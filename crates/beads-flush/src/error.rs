//! Errors for the auto-flush pipeline.

use thiserror::Error;

/// Errors the auto-flush pipeline can surface.
#[derive(Debug, Error)]
pub enum FlushError {
    /// I/O failure writing the log or its temp file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reading from or writing to the store.
    #[error("storage error: {0}")]
    Storage(#[from] beads_storage::StorageError),

    /// Failure encoding or decoding JSONL.
    #[error("jsonl error: {0}")]
    Jsonl(#[from] beads_core::jsonl::JsonlError),
}

/// A specialized `Result` type for auto-flush operations.
pub type Result<T> = std::result::Result<T, FlushError>;
