//! Errors for the daemon, IPC server, watcher, and VCS synchronizer.

use thiserror::Error;

/// Errors the daemon can surface.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// I/O failure on the socket, lockfile, or watched path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reading from or writing to the store.
    #[error("storage error: {0}")]
    Storage(#[from] beads_storage::StorageError),

    /// Failure in the auto-flush pipeline.
    #[error("flush error: {0}")]
    Flush(#[from] beads_flush::FlushError),

    /// Failure in the auto-import pipeline.
    #[error("import error: {0}")]
    Import(#[from] beads_import::ImportError),

    /// Failure acquiring a lockfile.
    #[error("lock error: {0}")]
    Lock(#[from] beads_lockfile::LockError),

    /// A `git` subprocess failed.
    #[error("git error: {0}")]
    Git(#[from] beads_git::commands::GitError),

    /// Malformed IPC request or response frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The store's `repo_id` doesn't match this repository's fingerprint.
    #[error("repository fingerprint mismatch: store belongs to {expected}, this repo is {actual}")]
    FingerprintMismatch {
        /// `repo_id` recorded in the store.
        expected: String,
        /// `repo_id` freshly computed for this repository.
        actual: String,
    },

    /// The socket's claim file names a different database than the one the
    /// client intends to use.
    #[error("socket at {socket} is claimed by database {claimed}, not {requested}")]
    ClaimMismatch {
        /// Path to the socket.
        socket: String,
        /// Database path recorded in the claim file.
        claimed: String,
        /// Database path the client requested.
        requested: String,
    },

    /// A client could not reach a daemon (existing or freshly auto-started)
    /// within the dial budget.
    #[error("could not connect to daemon at {0} after auto-start")]
    AutoStartTimedOut(String),
}

/// A specialized `Result` type for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;
