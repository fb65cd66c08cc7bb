//! `bd import` -- run the content-addressed auto-import pipeline against the
//! JSONL log (§4.3, §4.4).

use anyhow::{bail, Context, Result};

use beads_import::auto_import;
use beads_storage::SqliteStore;

use crate::cli::ImportArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd import` command.
pub fn run(ctx: &RuntimeContext, args: &ImportArgs) -> Result<()> {
    if ctx.readonly {
        bail!("cannot import in read-only mode");
    }

    let beads_dir = ctx
        .resolve_db_path()
        .context("no beads database found. Run 'bd init' to create one.")?;
    let db_path = beads_dir.join("beads.db");
    if !db_path.exists() {
        bail!("no beads database found at {}", db_path.display());
    }

    let log_path = match &args.source {
        Some(source) => std::path::PathBuf::from(source),
        None => beads_dir.join("issues.jsonl"),
    };

    let storage = SqliteStore::open(&db_path)?;
    let report = auto_import(&storage, &log_path, true)?;

    if ctx.json {
        output_json(&serde_json::json!({
            "skipped": report.skipped,
            "created": report.created,
            "updated": report.updated,
            "unchanged": report.unchanged,
            "remapped": report.remapped,
            "unresolved_collisions": report.unresolved_collisions,
        }));
    } else if report.skipped {
        println!("import skipped: log unchanged or missing");
    } else {
        println!(
            "import complete: {} created, {} updated, {} unchanged",
            report.created, report.updated, report.unchanged
        );
        if !report.unresolved_collisions.is_empty() {
            println!("  {} unresolved collision(s): {:?}", report.unresolved_collisions.len(), report.unresolved_collisions);
        }
    }

    Ok(())
}
