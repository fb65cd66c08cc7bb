//! `bd init` -- initialize a beads database in the current directory.

use std::env;
use std::fs;

use anyhow::{bail, Context, Result};

use beads_storage::{SqliteStore, Storage};

use crate::cli::InitArgs;
use crate::context::RuntimeContext;

/// Default gitignore content for the `.beads` directory.
const GITIGNORE_CONTENT: &str = r#"# Beads database files
*.db
*.db-journal
*.db-wal
*.db-shm

# Local state
bd.sock
bd.sock.startlock
daemon.pid
.merge-base
.merge-left
"#;

/// Execute the `bd init` command.
pub fn run(ctx: &RuntimeContext, args: &InitArgs) -> Result<()> {
    let cwd = env::current_dir().context("failed to get current directory")?;
    let beads_dir = cwd.join(".beads");

    if !args.force && beads_dir.is_dir() {
        let db_path = beads_dir.join("beads.db");
        if db_path.exists() {
            bail!(
                "Found existing database in {}\n\n\
                This workspace is already initialized.\n\n\
                To use the existing database:\n  \
                Just run bd commands normally (e.g., bd list)\n\n\
                To completely reinitialize (data loss warning):\n  \
                rm -rf {} && bd init\n\n\
                Or use --force to re-initialize.",
                beads_dir.display(),
                beads_dir.display()
            );
        }
    }

    let prefix = match &args.prefix {
        Some(p) => p.trim_end_matches('-').to_string(),
        None => {
            let dir_name = cwd
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "bd".to_string());
            dir_name.trim_end_matches('-').to_string()
        }
    };

    fs::create_dir_all(&beads_dir)
        .with_context(|| format!("failed to create directory: {}", beads_dir.display()))?;

    let gitignore_path = beads_dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(&gitignore_path, GITIGNORE_CONTENT).with_context(|| {
            format!("failed to create .gitignore: {}", gitignore_path.display())
        })?;
    }

    let db_path = beads_dir.join("beads.db");
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to create database: {}", db_path.display()))?;
    store.set_config("issue_prefix", &prefix)?;
    store.set_metadata("bd_version", env!("CARGO_PKG_VERSION"))?;
    if !ctx.actor.is_empty() {
        store.set_metadata("init_actor", &ctx.actor)?;
    }

    let jsonl_path = beads_dir.join("issues.jsonl");
    if !jsonl_path.exists() {
        fs::write(&jsonl_path, "")
            .with_context(|| format!("failed to create issues.jsonl: {}", jsonl_path.display()))?;
    }

    if !args.quiet {
        println!();
        println!("bd initialized successfully!");
        println!();
        println!("  Database: {}", db_path.display());
        println!("  Issue prefix: {}", prefix);
        println!(
            "  Issues will be named: {}-<n> (e.g., {}-1)",
            prefix, prefix
        );
        println!();
        println!("Run `bd create \"My first issue\"` to get started.");
        println!();
    }

    Ok(())
}
