//! Socket claim file: binds a socket path to the absolute database path it
//! serves (§4.6 "Single-writer discipline").
//!
//! A client that finds a live socket must confirm it actually fronts the
//! database it intends to use before sending requests -- otherwise two
//! unrelated projects whose control directories happen to share a socket
//! name (symlinked `.beads/`, container path collisions) could cross-talk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DaemonError, Result};

/// Writes the claim file for `socket_path`, recording that it serves
/// `db_path`. Called once, before the daemon starts listening.
pub fn write_claim(socket_path: &Path, db_path: &Path) -> Result<()> {
    let claim_path = claim_path_for(socket_path);
    let abs_db = db_path.canonicalize().unwrap_or_else(|_| db_path.to_path_buf());
    fs::write(&claim_path, abs_db.display().to_string())?;
    Ok(())
}

/// Verifies that the claim file for `socket_path` (if any) names `db_path`.
/// A missing claim file is treated as unclaimed and passes -- the daemon
/// may not have finished starting yet.
pub fn verify_claim(socket_path: &Path, db_path: &Path) -> Result<()> {
    let claim_path = claim_path_for(socket_path);
    let Ok(claimed) = fs::read_to_string(&claim_path) else {
        return Ok(());
    };

    let abs_db = db_path.canonicalize().unwrap_or_else(|_| db_path.to_path_buf());
    if claimed.trim() != abs_db.display().to_string() {
        return Err(DaemonError::ClaimMismatch {
            socket: socket_path.display().to_string(),
            claimed: claimed.trim().to_string(),
            requested: abs_db.display().to_string(),
        });
    }
    Ok(())
}

/// Removes the claim file. Called during daemon shutdown alongside the
/// socket and PID files.
pub fn remove_claim(socket_path: &Path) {
    let _ = fs::remove_file(claim_path_for(socket_path));
}

fn claim_path_for(socket_path: &Path) -> PathBuf {
    let mut os = socket_path.as_os_str().to_owned();
    os.push(".claim");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_claim_passes() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("bd.sock");
        let db = dir.path().join("beads.db");
        std::fs::write(&db, "").unwrap();

        write_claim(&socket, &db).unwrap();
        assert!(verify_claim(&socket, &db).is_ok());
    }

    #[test]
    fn mismatched_claim_fails() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("bd.sock");
        let db = dir.path().join("beads.db");
        let other = dir.path().join("other.db");
        std::fs::write(&db, "").unwrap();
        std::fs::write(&other, "").unwrap();

        write_claim(&socket, &db).unwrap();
        let err = verify_claim(&socket, &other).unwrap_err();
        assert!(matches!(err, DaemonError::ClaimMismatch { .. }));
    }

    #[test]
    fn missing_claim_file_passes() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("bd.sock");
        let db = dir.path().join("beads.db");
        assert!(verify_claim(&socket, &db).is_ok());
    }
}
