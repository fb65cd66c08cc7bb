//! Store-level exclusive advisory lock.
//!
//! Covers the whole database file (§4.6 "single-writer discipline"). The
//! daemon holds one of these for its entire lifetime; direct-mode clients
//! acquire one only for the duration of a single command.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{LockError, Result};

/// An exclusive advisory lock held against a single file.
///
/// The lock is released when this value is dropped; there is no explicit
/// `unlock` method because `fs2` releases the OS-level lock when the file
/// descriptor closes.
pub struct StoreLock {
    path: PathBuf,
    file: File,
}

impl StoreLock {
    /// Acquire the lock, blocking until it becomes available.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = open_lockfile(path)?;
        file.lock_exclusive()?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Attempt to acquire the lock without blocking.
    ///
    /// Returns `Ok(None)` if another process already holds it, rather than
    /// an error — callers that only want a yes/no answer (e.g. "is the
    /// daemon running?") can match on this directly.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lockfile(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                path: path.to_path_buf(),
                file,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(LockError::Io(e)),
        }
    }

    /// The path the lock was acquired against.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lockfile(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let lock = StoreLock::acquire(&path).unwrap();
        drop(lock);

        // Should be free again.
        let lock2 = StoreLock::try_acquire(&path).unwrap();
        assert!(lock2.is_some());
    }

    #[test]
    fn try_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let _held = StoreLock::acquire(&path).unwrap();
        let second = StoreLock::try_acquire(&path).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("store.db");

        let lock = StoreLock::acquire(&path).unwrap();
        assert!(lock.path().exists());
    }
}
