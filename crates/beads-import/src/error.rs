//! Errors for the auto-import pipeline.

use thiserror::Error;

/// Errors the auto-import pipeline can surface.
#[derive(Debug, Error)]
pub enum ImportError {
    /// I/O failure reading the log.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reading from or writing to the store.
    #[error("storage error: {0}")]
    Storage(#[from] beads_storage::StorageError),

    /// Failure decoding a JSONL snapshot.
    #[error("jsonl error: {0}")]
    Jsonl(#[from] beads_core::jsonl::JsonlError),

    /// The log contains an unresolved VCS merge-conflict marker; the user
    /// must resolve it before import can proceed.
    #[error("log has an unresolved merge conflict marker at line {line}")]
    MergeConflict {
        /// 1-based line number of the first marker found.
        line: usize,
    },

    /// An issue ID doesn't parse as `<prefix>-<integer>`, so a new ID can't
    /// be allocated for it during a remap.
    #[error("malformed issue id: {0}")]
    MalformedId(String),

    /// The post-import integrity check failed: the store shrank.
    #[error("post-import integrity check failed: {before} issues before, {after} after")]
    Integrity {
        /// Issue count before import.
        before: i64,
        /// Issue count after import.
        after: i64,
    },
}

/// A specialized `Result` type for auto-import operations.
pub type Result<T> = std::result::Result<T, ImportError>;
