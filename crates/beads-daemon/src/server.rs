//! Daemon lifecycle: startup, the accept loop, and graceful shutdown (§4.6).

use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use beads_lockfile::PidLock;
use beads_storage::Storage;
use tracing::{info, warn};

use crate::claim;
use crate::dispatch::{self, DispatchContext};
use crate::error::{DaemonError, Result};
use crate::fingerprint;
use crate::framing::{read_frame, write_frame};
use crate::protocol::{Request, Response};

const REPO_ID_KEY: &str = "repo_id";
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Paths the daemon owns for the lifetime of one run.
pub struct DaemonPaths {
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub socket_path: PathBuf,
    pub pid_path: PathBuf,
}

/// Runs the daemon until a shutdown signal arrives or the listener errors.
///
/// `ignore_repo_mismatch` mirrors the `BEADS_IGNORE_REPO_MISMATCH` override
/// from §6.5: when set, a fingerprint mismatch is logged but not fatal.
pub fn run(
    repo_root: &Path,
    paths: DaemonPaths,
    storage: Arc<dyn Storage>,
    flush: Arc<beads_flush::FlushController>,
    ignore_repo_mismatch: bool,
) -> Result<()> {
    let _pid_lock = PidLock::acquire(&paths.pid_path)?;

    verify_or_stamp_fingerprint(repo_root, storage.as_ref(), ignore_repo_mismatch)?;

    if paths.socket_path.exists() {
        let _ = std::fs::remove_file(&paths.socket_path);
    }
    let listener = UnixListener::bind(&paths.socket_path)?;
    listener.set_nonblocking(true)?;
    claim::write_claim(&paths.socket_path, &paths.db_path)?;

    let cancel = Arc::new(AtomicBool::new(false));
    install_signal_handler(Arc::clone(&cancel));

    let ctx = Arc::new(DispatchContext { storage, flush, log_path: paths.log_path.clone() });

    info!(socket = %paths.socket_path.display(), "daemon listening");
    accept_loop(&listener, &cancel, &ctx);

    info!("daemon shutting down");
    ctx.flush.close()?;
    claim::remove_claim(&paths.socket_path);
    let _ = std::fs::remove_file(&paths.socket_path);
    Ok(())
}

/// SIGTERM/SIGINT set the cancel flag so in-flight requests finish and the
/// accept loop exits cleanly; a second signal is not treated specially here
/// since the daemon has no interactive work to abandon (unlike the `bd` CLI's
/// double-press escape hatch).
fn install_signal_handler(cancel: Arc<AtomicBool>) {
    let _ = ctrlc::set_handler(move || {
        cancel.store(true, Ordering::SeqCst);
    });
}

fn accept_loop(listener: &UnixListener, cancel: &AtomicBool, ctx: &Arc<DispatchContext>) {
    let mut handles = Vec::new();
    while !cancel.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let ctx = Arc::clone(ctx);
                handles.push(thread::spawn(move || handle_connection(stream, &ctx)));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL);
            }
        }
        handles.retain(|h| !h.is_finished());
    }
    for h in handles {
        let _ = h.join();
    }
}

fn handle_connection(mut stream: UnixStream, ctx: &DispatchContext) {
    loop {
        let req: Option<Request> = match read_frame(&mut stream) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "connection read failed");
                return;
            }
        };
        let Some(req) = req else { return };

        let resp = dispatch::handle(ctx, req);
        if let Err(e) = write_frame(&mut stream, &resp) {
            warn!(error = %e, "connection write failed");
            return;
        }
    }
}

/// On first run for a fresh store, stamps the computed `repo_id` into
/// metadata. On subsequent runs, verifies the stored value still matches --
/// a mismatch means the store was copied into an unrelated repository
/// (§6.4, §7 `FingerprintMismatch`).
fn verify_or_stamp_fingerprint(
    repo_root: &Path,
    storage: &dyn Storage,
    ignore_repo_mismatch: bool,
) -> Result<()> {
    let actual = fingerprint::compute_repo_id(repo_root);

    match storage.get_metadata(REPO_ID_KEY) {
        Ok(expected) if expected == actual => Ok(()),
        Ok(expected) => {
            if ignore_repo_mismatch {
                warn!(expected, actual, "repo_id mismatch ignored by override");
                Ok(())
            } else {
                Err(DaemonError::FingerprintMismatch { expected, actual })
            }
        }
        Err(beads_storage::StorageError::NotFound { .. }) => {
            storage.set_metadata(REPO_ID_KEY, &actual)?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_storage::SqliteStore;

    #[test]
    fn fresh_store_stamps_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        verify_or_stamp_fingerprint(dir.path(), &store, false).unwrap();
        let stamped = store.get_metadata(REPO_ID_KEY).unwrap();
        assert_eq!(stamped, fingerprint::compute_repo_id(dir.path()));
    }

    #[test]
    fn matching_fingerprint_passes() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        verify_or_stamp_fingerprint(dir.path(), &store, false).unwrap();
        assert!(verify_or_stamp_fingerprint(dir.path(), &store, false).is_ok());
    }

    #[test]
    fn mismatched_fingerprint_is_refused() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        verify_or_stamp_fingerprint(dir_a.path(), &store, false).unwrap();
        let err = verify_or_stamp_fingerprint(dir_b.path(), &store, false).unwrap_err();
        assert!(matches!(err, DaemonError::FingerprintMismatch { .. }));
    }

    #[test]
    fn mismatched_fingerprint_with_override_passes() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        verify_or_stamp_fingerprint(dir_a.path(), &store, false).unwrap();
        assert!(verify_or_stamp_fingerprint(dir_b.path(), &store, true).is_ok());
    }
}
