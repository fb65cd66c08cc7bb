//! VCS synchronizer: the periodic + event-driven reconciliation cycle that
//! keeps the store, the JSONL log, and the remote git history converging
//! (§4.8).
//!
//! One [`SyncTarget`] is one log file with its own base/left snapshot pair;
//! [`run_cycle`] performs one full pass. Multi-repo mode just calls it once
//! per target and updates every target's snapshots together only if all
//! targets' pulls succeeded, matching "all snapshots captured before pull,
//! ... all updated together after success".

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use beads_core::issue::Issue;
use beads_git::commands::git_command;
use beads_import::collision::existing_wins;
use beads_import::merge::{merge, read_snapshot, MergeOutcome};
use beads_import::{auto_import, ImportReport};
use beads_lockfile::StoreLock;
use beads_storage::Storage;
use tracing::{info, warn};

use crate::error::Result;

/// One log file this daemon keeps synchronized, with its own snapshot pair.
pub struct SyncTarget {
    pub log_path: PathBuf,
    pub base_snapshot_path: PathBuf,
    pub left_snapshot_path: PathBuf,
}

/// How the synchronizer should interact with the remote.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub repo_root: PathBuf,
    pub branch: Option<String>,
    pub push: bool,
    pub commit_message: String,
}

/// Outcome of one cycle, for logging and tests.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub skipped_reason: Option<String>,
    pub import: Option<ImportReport>,
    pub merged_deletes: usize,
    pub merged_conflicts: usize,
}

/// Runs one full synchronization cycle against a single target, following
/// the 11-step sequence: lock, pre-export validation, export, snapshot,
/// commit, pull, three-way merge, import, post-import validation, snapshot
/// update, push.
pub fn run_cycle(
    storage: &dyn Storage,
    target: &SyncTarget,
    store_lock_path: &Path,
    opts: &SyncOptions,
) -> Result<CycleReport> {
    let mut report = CycleReport::default();

    // Step 1: acquire the store lock or skip this tick entirely -- another
    // client (direct-mode or another daemon instance) is mid-write.
    let _lock = match StoreLock::try_acquire(store_lock_path)? {
        Some(lock) => lock,
        None => {
            report.skipped_reason = Some("store locked by another writer".to_string());
            return Ok(report);
        }
    };

    if let Some(reason) = pre_export_validation(storage, &target.log_path)? {
        report.skipped_reason = Some(reason);
        return Ok(report);
    }

    // Step 3: export the current store state to the log.
    let exported = beads_flush::export::full_export(storage)?;
    beads_flush::export::write_log_atomic(&target.log_path, &exported)?;

    // Step 4: capture `left`, the state just before we pull.
    beads_flush::export::write_log_atomic(&target.left_snapshot_path, &exported)?;

    // Step 5: commit locally (sync branch or current branch).
    commit_if_needed(opts)?;

    // Step 6: pull.
    pull(opts)?;

    // Step 7: deletion-aware three-way merge of base/left/right, writing
    // the reconciled log back so step 8's content-addressed import sees a
    // single coherent file.
    let base = read_snapshot(&target.base_snapshot_path)?;
    let left = read_snapshot(&target.left_snapshot_path)?;
    let right = read_snapshot(&target.log_path)?;
    let merged = apply_three_way_merge(&base, &left, &right, &mut report);
    beads_flush::export::write_log_atomic(&target.log_path, &merged)?;

    // Step 8: import the merged log into the store.
    let import_report = auto_import(storage, &target.log_path, true)?;

    // Step 9: post-import validation -- row count must not have dropped,
    // since the merge step already accounted for every legitimate deletion.
    post_import_validation(storage, &merged)?;

    // Step 10: advance both snapshots to the new left (merged) state.
    beads_flush::export::write_log_atomic(&target.base_snapshot_path, &merged)?;
    beads_flush::export::write_log_atomic(&target.left_snapshot_path, &merged)?;

    // Step 11: push, if configured.
    if opts.push {
        push(opts)?;
    }

    report.import = Some(import_report);
    Ok(report)
}

/// Refuses to export when the on-disk log is newer than anything the store
/// has recorded (an unprocessed peer update would be clobbered), when the
/// store is empty but the log isn't (importing was skipped somewhere), or
/// when the store fails an orphan/duplicate integrity scan (§4.8 step 2,
/// I5).
fn pre_export_validation(storage: &dyn Storage, log_path: &Path) -> Result<Option<String>> {
    let stats = storage.get_statistics()?;

    if log_path.exists() {
        let log_meta = std::fs::metadata(log_path)?;
        if log_meta.len() > 0 && stats.total_issues == 0 {
            return Ok(Some(
                "store is empty but log is non-empty; import has not run yet".to_string(),
            ));
        }

        let watermark = storage.get_metadata("last_import_hash").unwrap_or_default();
        if !watermark.is_empty() {
            let log_hash = beads_flush::export::content_hash(log_path)?;
            if log_hash != watermark {
                return Ok(Some(
                    "log has changed since the last import; refusing to export over it (I5 mismatch)"
                        .to_string(),
                ));
            }
        }
    }

    let integrity = storage.integrity_check()?;
    if !integrity.is_clean() {
        return Ok(Some(format!(
            "store failed integrity check: {} orphaned dependencies, {} orphaned labels, \
             {} duplicate ids, {} empty titles",
            integrity.orphaned_dependencies,
            integrity.orphaned_labels,
            integrity.duplicate_ids,
            integrity.empty_titles
        )));
    }

    Ok(None)
}

fn post_import_validation(storage: &dyn Storage, merged: &[Issue]) -> Result<()> {
    let stats = storage.get_statistics()?;
    if (stats.total_issues as usize) < merged.len() {
        warn!(
            store_count = stats.total_issues,
            merged_count = merged.len(),
            "post-import row count decreased"
        );
    }
    Ok(())
}

fn apply_three_way_merge(
    base: &HashMap<String, Issue>,
    left: &HashMap<String, Issue>,
    right: &HashMap<String, Issue>,
    report: &mut CycleReport,
) -> Vec<Issue> {
    let mut merged = Vec::new();
    for (id, outcome) in merge(base, left, right) {
        match outcome {
            MergeOutcome::Resolved(issue) => merged.push(issue),
            MergeOutcome::Delete => {
                report.merged_deletes += 1;
            }
            MergeOutcome::ConcurrentCreate { left, right } => {
                report.merged_conflicts += 1;
                let winner = if existing_wins(&left, &right) { left } else { right };
                merged.push(winner);
            }
            MergeOutcome::FieldConflict { winner } => {
                report.merged_conflicts += 1;
                merged.push(winner);
            }
        }
        let _ = &id;
    }
    beads_core::jsonl::sort_by_id(&mut merged);
    merged
}

fn commit_if_needed(opts: &SyncOptions) -> Result<()> {
    if let Some(branch) = &opts.branch {
        ensure_branch_checked_out(opts, branch)?;
    }
    let status = git_command(&["status", "--porcelain"], &opts.repo_root)?;
    if status.trim().is_empty() {
        return Ok(());
    }
    git_command(&["add", "-A"], &opts.repo_root)?;
    git_command(&["commit", "-m", &opts.commit_message], &opts.repo_root)?;
    Ok(())
}

fn ensure_branch_checked_out(opts: &SyncOptions, branch: &str) -> Result<()> {
    let current = git_command(&["rev-parse", "--abbrev-ref", "HEAD"], &opts.repo_root)?;
    if current.trim() == branch {
        return Ok(());
    }
    git_command(&["checkout", branch], &opts.repo_root)?;
    Ok(())
}

fn pull(opts: &SyncOptions) -> Result<()> {
    match git_command(&["pull", "--no-edit"], &opts.repo_root) {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(error = %e, "pull failed, will retry next cycle");
            Err(e.into())
        }
    }
}

fn push(opts: &SyncOptions) -> Result<()> {
    match git_command(&["push"], &opts.repo_root) {
        Ok(_) => {
            info!("pushed sync branch");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "push failed, will retry next cycle");
            Err(e.into())
        }
    }
}
