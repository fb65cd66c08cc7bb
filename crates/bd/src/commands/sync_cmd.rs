//! `bd sync` -- run one VCS synchronization cycle directly (no daemon).
//!
//! Exports dirty state, commits, pulls, three-way-merges, and imports, per
//! the same cycle the daemon runs on a timer -- useful for one-shot CI jobs
//! or a user who runs entirely in direct mode (`sync.no-daemon`).

use anyhow::{bail, Context, Result};

use beads_config::config::load_config;
use beads_daemon::sync::{run_cycle, SyncOptions, SyncTarget};
use beads_git::gitdir::find_git_root;
use beads_storage::SqliteStore;

use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd sync` command.
pub fn run(ctx: &RuntimeContext) -> Result<()> {
    if ctx.readonly {
        bail!("cannot sync in read-only mode");
    }
    if ctx.sandbox {
        println!("bd sync: skipped (sandbox mode)");
        return Ok(());
    }

    let beads_dir = ctx
        .resolve_db_path()
        .context("no beads database found. Run 'bd init' to create one.")?;
    let db_path = beads_dir.join("beads.db");
    if !db_path.exists() {
        bail!("no beads database found at {}", db_path.display());
    }

    let repo_root = find_git_root(&beads_dir).context("not inside a git repository")?;
    let config = load_config(&beads_dir)?;

    let storage = SqliteStore::open(&db_path)?;
    let target = SyncTarget {
        log_path: beads_dir.join("issues.jsonl"),
        base_snapshot_path: beads_dir.join(".merge-base"),
        left_snapshot_path: beads_dir.join(".merge-left"),
    };
    let store_lock_path = beads_dir.join("beads.db.lock");

    let opts = SyncOptions {
        repo_root: repo_root.clone(),
        branch: if config.sync.branch.is_empty() { None } else { Some(config.sync.branch.clone()) },
        push: !config.no_push,
        commit_message: "bd sync: update issues".to_string(),
    };

    let report = run_cycle(&storage, &target, &store_lock_path, &opts)?;

    if let Some(reason) = &report.skipped_reason {
        if ctx.json {
            output_json(&serde_json::json!({"skipped": true, "reason": reason}));
        } else {
            println!("sync skipped: {reason}");
        }
        return Ok(());
    }

    if ctx.json {
        output_json(&serde_json::json!({
            "skipped": false,
            "merged_deletes": report.merged_deletes,
            "merged_conflicts": report.merged_conflicts,
            "import": report.import.map(|r| serde_json::json!({
                "created": r.created,
                "updated": r.updated,
                "unchanged": r.unchanged,
                "remapped": r.remapped,
                "unresolved_collisions": r.unresolved_collisions,
            })),
        }));
    } else {
        println!("sync complete");
        if report.merged_deletes > 0 {
            println!("  {} deletion(s) applied from peer", report.merged_deletes);
        }
        if report.merged_conflicts > 0 {
            println!("  {} conflict(s) auto-resolved", report.merged_conflicts);
        }
    }

    Ok(())
}
