//! Private worktree for the dedicated sync branch (§4.8 "Sync branch").
//!
//! When `sync.branch` names a branch, the synchronizer commits and pulls
//! there instead of the user's current branch, via its own worktree under
//! the VCS control directory so the user's working tree is never disturbed.
//! Grounded in `bd worktree`'s linkage discipline: a marker file inside the
//! worktree names the main database it belongs to; a missing marker means
//! the worktree is corrupt (or was never finished) and gets rebuilt.

use std::fs;
use std::path::{Path, PathBuf};

use beads_git::commands::git_command;

use crate::error::Result;

const LINK_FILE: &str = "main-db";

/// Path the sync worktree lives at, under the repo's `.git` control dir so
/// it's never mistaken for a user-visible directory.
pub fn worktree_path(git_dir: &Path) -> PathBuf {
    git_dir.join("beads-sync-worktree")
}

/// Ensures a healthy worktree exists for `branch`, creating or rebuilding it
/// as needed. Returns the worktree's path.
pub fn ensure_worktree(repo_root: &Path, git_dir: &Path, db_path: &Path, branch: &str) -> Result<PathBuf> {
    let wt_path = worktree_path(git_dir);

    if wt_path.is_dir() {
        if is_healthy(&wt_path, db_path) {
            return Ok(wt_path);
        }
        rebuild(repo_root, &wt_path)?;
    }

    create(repo_root, &wt_path, db_path, branch)?;
    Ok(wt_path)
}

fn is_healthy(wt_path: &Path, db_path: &Path) -> bool {
    let link_path = wt_path.join(LINK_FILE);
    let Ok(recorded) = fs::read_to_string(&link_path) else {
        return false;
    };
    let abs_db = db_path.canonicalize().unwrap_or_else(|_| db_path.to_path_buf());
    recorded.trim() == abs_db.display().to_string()
}

fn create(repo_root: &Path, wt_path: &Path, db_path: &Path, branch: &str) -> Result<()> {
    let branch_exists = git_command(&["rev-parse", "--verify", branch], repo_root).is_ok();
    if branch_exists {
        git_command(&["worktree", "add", wt_path.to_str().unwrap_or_default(), branch], repo_root)?;
    } else {
        git_command(
            &["worktree", "add", "-b", branch, wt_path.to_str().unwrap_or_default()],
            repo_root,
        )?;
    }

    let abs_db = db_path.canonicalize().unwrap_or_else(|_| db_path.to_path_buf());
    fs::write(wt_path.join(LINK_FILE), abs_db.display().to_string())?;
    Ok(())
}

fn rebuild(repo_root: &Path, wt_path: &Path) -> Result<()> {
    let _ = git_command(&["worktree", "remove", "--force", wt_path.to_str().unwrap_or_default()], repo_root);
    if wt_path.exists() {
        fs::remove_dir_all(wt_path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unhealthy_without_link_file() {
        let dir = tempfile::tempdir().unwrap();
        let wt = dir.path().join("wt");
        fs::create_dir_all(&wt).unwrap();
        let db = dir.path().join("beads.db");
        assert!(!is_healthy(&wt, &db));
    }

    #[test]
    fn healthy_when_link_matches() {
        let dir = tempfile::tempdir().unwrap();
        let wt = dir.path().join("wt");
        fs::create_dir_all(&wt).unwrap();
        let db = dir.path().join("beads.db");
        fs::write(&db, "").unwrap();
        let abs_db = db.canonicalize().unwrap();
        fs::write(wt.join(LINK_FILE), abs_db.display().to_string()).unwrap();
        assert!(is_healthy(&wt, &db));
    }

    #[test]
    fn unhealthy_when_link_points_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let wt = dir.path().join("wt");
        fs::create_dir_all(&wt).unwrap();
        let db = dir.path().join("beads.db");
        let other = dir.path().join("other.db");
        fs::write(&db, "").unwrap();
        fs::write(&other, "").unwrap();
        fs::write(wt.join(LINK_FILE), other.canonicalize().unwrap().display().to_string()).unwrap();
        assert!(!is_healthy(&wt, &db));
    }
}
