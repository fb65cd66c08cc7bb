//! PID lockfile with stale-lock reclamation.
//!
//! Used for the daemon's own startup lock (`daemon.pid`, §4.6) and for the
//! auto-start mutex (`bd.sock.startlock`, §4.6 "Auto-start") that serializes
//! concurrent clients racing to fork a daemon. Both are the same primitive:
//! an exclusive lockfile holding the owning PID, reclaimed if that PID is no
//! longer alive.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{LockError, Result};

/// An acquired PID lockfile. Holding one means this process's PID is
/// recorded in the file and the underlying OS lock is held; both are
/// released when the value is dropped.
pub struct PidLock {
    path: PathBuf,
    file: std::fs::File,
}

impl PidLock {
    /// Acquire the PID lock, reclaiming it if the recorded PID is dead.
    ///
    /// On success, writes the current process's PID into the file.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                let owner = read_pid(&file).unwrap_or(0);
                if owner != 0 && process_alive(owner) {
                    return Err(LockError::AlreadyLocked {
                        path: path.display().to_string(),
                        pid: owner,
                    });
                }
                // Stale: the recorded owner is gone, reclaim the lock.
                file.try_lock_exclusive().or_else(|e| {
                    if e.kind() == std::io::ErrorKind::WouldBlock {
                        Err(LockError::AlreadyLocked {
                            path: path.display().to_string(),
                            pid: owner,
                        })
                    } else {
                        Err(LockError::Io(e))
                    }
                })?;
            }
            Err(e) => return Err(LockError::Io(e)),
        }

        let mut file = file;
        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// The path the lock was acquired against.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock and remove the lockfile.
    ///
    /// Consumes `self`; dropping without calling this leaves the lockfile
    /// on disk (harmless — the next `acquire` reclaims it once this
    /// process exits) but is the expected path for an abrupt shutdown.
    pub fn release(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn read_pid(file: &std::fs::File) -> Option<i32> {
    let mut file = file.try_clone().ok()?;
    use std::io::Seek;
    file.seek(std::io::SeekFrom::Start(0)).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    // No portable liveness check without adding a platform dependency;
    // assume alive so a live daemon is never reclaimed from under itself.
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_own_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");

        let lock = PidLock::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        drop(lock);
    }

    #[test]
    fn second_acquire_fails_while_first_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");

        let _first = PidLock::acquire(&path).unwrap();
        let second = PidLock::acquire(&path);
        assert!(second.is_err());
        match second {
            Err(LockError::AlreadyLocked { pid, .. }) => {
                assert_eq!(pid, std::process::id() as i32);
            }
            other => panic!("expected AlreadyLocked, got {other:?}"),
        }
    }

    #[test]
    fn reclaims_lock_with_dead_pid_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");

        // Simulate a stale lockfile left by a dead process: a PID number
        // that (almost certainly) does not correspond to a live process,
        // and no OS-level lock held against the file.
        std::fs::write(&path, "999999999").unwrap();

        let lock = PidLock::acquire(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        drop(lock);
    }

    #[test]
    fn release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");

        let lock = PidLock::acquire(&path).unwrap();
        lock.release().unwrap();
        assert!(!path.exists());
    }
}
