//! Client-side daemon auto-start (§4.6 "Auto-start").
//!
//! A client that can't reach a running daemon forks its own binary in daemon
//! mode, then polls the socket with bounded dial probes. Concurrent clients
//! racing to start the same daemon serialize through a startlock; the loser
//! just waits for the winner's daemon to come up.

use std::io::ErrorKind;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use beads_lockfile::PidLock;

use crate::error::{DaemonError, Result};

/// Total time budget for the dial loop after a daemon has been (or might be)
/// started.
const DIAL_BUDGET: Duration = Duration::from_secs(5);
/// Upper bound on any single connect attempt.
const DIAL_PROBE_TIMEOUT: Duration = Duration::from_millis(200);
const DIAL_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Exponential backoff schedule (seconds) for repeated auto-start attempts,
/// capped at the last entry.
const BACKOFF_SCHEDULE: &[u64] = &[5, 10, 20, 40, 80, 120];

/// Returns the backoff delay for the `attempt`-th (0-based) auto-start retry.
pub fn backoff_for_attempt(attempt: usize) -> Duration {
    let idx = attempt.min(BACKOFF_SCHEDULE.len() - 1);
    Duration::from_secs(BACKOFF_SCHEDULE[idx])
}

/// Dials `socket_path`, returning as soon as a connection succeeds.
pub fn dial(socket_path: &Path) -> Result<UnixStream> {
    UnixStream::connect(socket_path).map_err(DaemonError::Io)
}

/// Ensures a daemon is listening on `socket_path`, starting one via
/// `daemon_binary <daemon_args> <db_path>` if nothing answers. Serializes
/// concurrent auto-start attempts through `startlock_path`.
pub fn ensure_daemon_running(
    socket_path: &Path,
    startlock_path: &Path,
    daemon_binary: &Path,
    daemon_args: &[&str],
    db_path: &Path,
) -> Result<()> {
    if dial(socket_path).is_ok() {
        return Ok(());
    }

    let lock = PidLock::acquire(startlock_path)?;

    // Re-check: the lock winner might have been beaten to it by a daemon
    // that was already mid-startup when we first dialed.
    if dial(socket_path).is_ok() {
        lock.release()?;
        return Ok(());
    }

    spawn_detached(daemon_binary, daemon_args, db_path)?;
    let result = wait_for_socket(socket_path);
    lock.release()?;
    result
}

fn spawn_detached(daemon_binary: &Path, daemon_args: &[&str], db_path: &Path) -> Result<()> {
    Command::new(daemon_binary)
        .args(daemon_args)
        .arg(db_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(DaemonError::Io)?;
    Ok(())
}

fn wait_for_socket(socket_path: &Path) -> Result<()> {
    let deadline = Instant::now() + DIAL_BUDGET;
    while Instant::now() < deadline {
        match probe(socket_path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound || e.kind() == ErrorKind::ConnectionRefused => {
                std::thread::sleep(DIAL_RETRY_INTERVAL);
            }
            Err(e) => return Err(DaemonError::Io(e)),
        }
    }
    Err(DaemonError::AutoStartTimedOut(socket_path.display().to_string()))
}

fn probe(socket_path: &Path) -> std::io::Result<()> {
    let stream = UnixStream::connect(socket_path)?;
    stream.set_read_timeout(Some(DIAL_PROBE_TIMEOUT))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_schedule_and_caps() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(5));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(20));
        assert_eq!(backoff_for_attempt(5), Duration::from_secs(120));
        assert_eq!(backoff_for_attempt(50), Duration::from_secs(120));
    }

    #[test]
    fn dial_against_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("bd.sock");
        assert!(dial(&socket).is_err());
    }

    #[test]
    fn ensure_daemon_running_times_out_without_a_real_binary() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("bd.sock");
        let startlock = dir.path().join("bd.sock.startlock");
        let fake_binary = dir.path().join("nonexistent-binary");
        let db = dir.path().join("beads.db");

        let err = ensure_daemon_running(&socket, &startlock, &fake_binary, &["daemon", "exec"], &db).unwrap_err();
        assert!(matches!(err, DaemonError::Io(_)));
    }
}
