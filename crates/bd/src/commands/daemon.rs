//! `bd daemon` -- start, stop, and check on the background sync daemon (§4.6).

use std::os::unix::net::UnixStream;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use beads_config::config::load_config;
use beads_daemon::autostart::ensure_daemon_running;
use beads_daemon::framing::{read_frame, write_frame};
use beads_daemon::protocol::Request;
use beads_daemon::server::DaemonPaths;
use beads_storage::SqliteStore;

use crate::cli::{DaemonArgs, DaemonCommands};
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd daemon` command.
pub fn run(ctx: &RuntimeContext, args: &DaemonArgs) -> Result<()> {
    match &args.command {
        DaemonCommands::Start => start(ctx),
        DaemonCommands::Stop => stop(ctx),
        DaemonCommands::Status => status(ctx),
        DaemonCommands::Exec => exec(ctx),
    }
}

fn resolve_paths(ctx: &RuntimeContext) -> Result<DaemonPaths> {
    let beads_dir = ctx
        .resolve_db_path()
        .context("no beads database found. Run 'bd init' to create one.")?;
    Ok(DaemonPaths {
        db_path: beads_dir.join("beads.db"),
        log_path: beads_dir.join("issues.jsonl"),
        socket_path: beads_dir.join("bd.sock"),
        pid_path: beads_dir.join("daemon.pid"),
    })
}

fn start(ctx: &RuntimeContext) -> Result<()> {
    let paths = resolve_paths(ctx)?;
    if !paths.db_path.exists() {
        bail!("no beads database found at {}", paths.db_path.display());
    }

    let startlock_path = paths.socket_path.with_extension("sock.startlock");
    let daemon_binary = std::env::current_exe()?;
    ensure_daemon_running(
        &paths.socket_path,
        &startlock_path,
        &daemon_binary,
        &["daemon", "exec"],
        &paths.db_path,
    )?;

    if ctx.json {
        output_json(&serde_json::json!({"started": true}));
    } else {
        println!("daemon running at {}", paths.socket_path.display());
    }
    Ok(())
}

fn stop(ctx: &RuntimeContext) -> Result<()> {
    let paths = resolve_paths(ctx)?;
    if !paths.pid_path.exists() {
        if ctx.json {
            output_json(&serde_json::json!({"stopped": false, "reason": "not running"}));
        } else {
            println!("daemon is not running");
        }
        return Ok(());
    }

    let pid: i32 = std::fs::read_to_string(&paths.pid_path)?.trim().parse().unwrap_or(0);
    if pid > 0 {
        let _ = std::process::Command::new("kill").arg("-TERM").arg(pid.to_string()).status();
    }

    if ctx.json {
        output_json(&serde_json::json!({"stopped": true, "pid": pid}));
    } else {
        println!("sent shutdown signal to daemon (pid {pid})");
    }
    Ok(())
}

fn status(ctx: &RuntimeContext) -> Result<()> {
    let paths = resolve_paths(ctx)?;

    let response = UnixStream::connect(&paths.socket_path).ok().and_then(|mut stream| {
        let req = Request { op: "health".to_string(), args: serde_json::json!({}) };
        write_frame(&mut stream, &req).ok()?;
        read_frame::<_, beads_daemon::protocol::Response>(&mut stream).ok()?
    });

    match response {
        Some(resp) if resp.ok => {
            if ctx.json {
                output_json(&serde_json::json!({"running": true, "health": resp.data}));
            } else {
                println!("daemon is running: {}", resp.data.unwrap_or_default());
            }
        }
        _ => {
            if ctx.json {
                output_json(&serde_json::json!({"running": false}));
            } else {
                println!("daemon is not running");
            }
        }
    }
    Ok(())
}

/// Runs as the daemon itself. Invoked by `ensure_daemon_running`'s
/// fork-and-detach, or directly by a user who wants to run it in the
/// foreground.
fn exec(ctx: &RuntimeContext) -> Result<()> {
    let paths = resolve_paths(ctx)?;
    let beads_dir = ctx.resolve_db_path().context("no beads database found")?;
    let repo_root = beads_git::gitdir::find_git_root(&beads_dir).context("not inside a git repository")?;
    let config = load_config(&beads_dir)?;

    let storage: Arc<dyn beads_storage::Storage> = Arc::new(SqliteStore::open(&paths.db_path)?);
    let flush = beads_flush::FlushController::init(
        storage.clone(),
        paths.log_path.clone(),
        std::time::Duration::from_secs(config.sync.flush_debounce),
    );

    beads_daemon::server::run(&repo_root, paths, storage, flush, config.sync.ignore_repo_mismatch)?;
    Ok(())
}
