//! `bd export` -- force a full export of the store to the JSONL log (§4.2, §6.1).

use anyhow::{bail, Context, Result};

use beads_flush::export::{full_export, write_log_atomic};
use beads_storage::SqliteStore;

use crate::cli::{ExportArgs, ExportCommands};
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd export` command.
pub fn run(ctx: &RuntimeContext, args: &ExportArgs) -> Result<()> {
    if let Some(ExportCommands::Obsidian(_)) = &args.command {
        bail!("bd export obsidian: not supported by this build");
    }

    let beads_dir = ctx
        .resolve_db_path()
        .context("no beads database found. Run 'bd init' to create one.")?;
    let db_path = beads_dir.join("beads.db");
    if !db_path.exists() {
        bail!("no beads database found at {}", db_path.display());
    }

    let storage = SqliteStore::open(&db_path)?;
    let issues = full_export(&storage)?;
    let log_path = beads_dir.join("issues.jsonl");
    write_log_atomic(&log_path, &issues)?;

    if ctx.json {
        output_json(&serde_json::json!({"exported": issues.len(), "path": log_path.display().to_string()}));
    } else {
        println!("exported {} issue(s) to {}", issues.len(), log_path.display());
    }

    Ok(())
}
