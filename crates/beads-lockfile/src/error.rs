//! Errors for the locking primitives.

use thiserror::Error;

/// Errors that can occur while acquiring or releasing a lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock is held by another process (and, for PID locks, that
    /// process appears to still be alive).
    #[error("lock at {path} is already held by pid {pid}")]
    AlreadyLocked {
        /// Path to the lockfile.
        path: String,
        /// PID of the process holding the lock, if known.
        pid: i32,
    },

    /// I/O failure opening, reading, or writing the lockfile.
    #[error("lockfile I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for lockfile operations.
pub type Result<T> = std::result::Result<T, LockError>;
