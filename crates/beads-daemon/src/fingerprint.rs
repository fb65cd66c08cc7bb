//! Repository fingerprint (§6.4).
//!
//! `repo_id` must be the same across every clone of a given repository
//! (so a team shares one store identity) and must not collide with an
//! unrelated repository. The remote URL alone isn't sufficient -- a repo
//! without a configured remote (or two forks sharing a remote during
//! early setup) would either have nothing to hash or collide. The root
//! commit hash is identical across every clone of the same history and
//! present even with no remote configured, so it serves as the "stable
//! local salt" alongside the canonicalized remote URL.
use std::path::Path;

use sha2::{Digest, Sha256};

use beads_git::commands::git_command;

/// Computes the repository fingerprint for the repo rooted at `cwd`.
///
/// Combines the canonicalized `origin` remote URL (if any) with the
/// repository's root commit hash (if any commits exist), hashed together.
/// A repository with neither (no remote, no commits yet) falls back to the
/// canonicalized absolute path, which is at least stable for the lifetime
/// of that single working copy.
pub fn compute_repo_id(cwd: &Path) -> String {
    let remote = git_command(&["remote", "get-url", "origin"], cwd)
        .ok()
        .map(|url| canonicalize_remote_url(&url));
    let root_commit = git_command(&["rev-list", "--max-parents=0", "HEAD"], cwd)
        .ok()
        .and_then(|out| out.lines().last().map(str::to_string));

    let salt = match (&remote, &root_commit) {
        (Some(url), Some(commit)) => format!("{url}\n{commit}"),
        (Some(url), None) => url.clone(),
        (None, Some(commit)) => commit.clone(),
        (None, None) => cwd
            .canonicalize()
            .unwrap_or_else(|_| cwd.to_path_buf())
            .display()
            .to_string(),
    };

    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Strips a trailing `.git` suffix and a trailing slash so that
/// `git@host:org/repo.git`, `https://host/org/repo.git`, and
/// `https://host/org/repo` all fingerprint identically.
fn canonicalize_remote_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    url.strip_suffix(".git").unwrap_or(url).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_strips_git_suffix_and_case() {
        assert_eq!(
            canonicalize_remote_url("https://Example.com/org/Repo.git"),
            "https://example.com/org/repo"
        );
        assert_eq!(
            canonicalize_remote_url("git@example.com:org/repo.git"),
            "git@example.com:org/repo"
        );
    }

    #[test]
    fn fallback_path_is_stable_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let first = compute_repo_id(dir.path());
        let second = compute_repo_id(dir.path());
        assert_eq!(first, second);
    }

    #[test]
    fn different_directories_fingerprint_differently() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        assert_ne!(compute_repo_id(a.path()), compute_repo_id(b.path()));
    }
}
