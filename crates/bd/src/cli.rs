//! Clap CLI definitions for the `bd` command.
//!
//! This module defines the complete CLI structure using clap 4 derive macros.
//! It mirrors the Go Cobra command tree from the original beads project.

use clap::{Args, Parser, Subcommand};

/// bd -- Dependency-aware issue tracker.
///
/// Issues chained together like beads. A lightweight issue tracker
/// with first-class dependency support.
#[derive(Parser, Debug)]
#[command(
    name = "bd",
    about = "Dependency-aware issue tracker",
    long_about = "Issues chained together like beads. A lightweight issue tracker with first-class dependency support.",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Global flags available to all subcommands.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Database path (default: auto-discover .beads/*.db).
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Actor name for audit trail (default: $BD_ACTOR, git user.name, $USER).
    #[arg(long, global = true, env = "BD_ACTOR")]
    pub actor: Option<String>,

    /// Output in JSON format.
    #[arg(long, global = true)]
    pub json: bool,

    /// Sandbox mode: disable auto-sync.
    #[arg(long, global = true)]
    pub sandbox: bool,

    /// Allow operations on potentially stale data (skip staleness check).
    #[arg(long, global = true)]
    pub allow_stale: bool,

    /// Read-only mode: block write operations (for worker sandboxes).
    #[arg(long, global = true)]
    pub readonly: bool,

    /// Enable verbose/debug output.
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output (errors only).
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

/// All available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // ===== Working With Issues =====
    /// Create a new issue (or multiple issues from markdown file).
    #[command(alias = "new")]
    Create(CreateArgs),

    /// Show issue details.
    #[command(alias = "view")]
    Show(ShowArgs),

    /// List issues.
    List(ListArgs),

    /// Close one or more issues.
    Close(CloseArgs),

    /// Add a comment to an issue.
    Comment(CommentArgs),

    /// List comments on an issue.
    Comments(CommentsArgs),

    // ===== Dependencies & Structure =====
    /// Manage dependencies between issues.
    Dep(DepArgs),

    /// Manage labels on an issue.
    Label(LabelArgs),

    // ===== Setup & Configuration =====
    /// Initialize bd in the current directory.
    Init(InitArgs),

    /// Manage configuration.
    Config(ConfigArgs),

    /// Run one synchronization cycle: export, commit, pull, merge, import.
    Sync,

    /// Manage the background synchronization daemon.
    Daemon(DaemonArgs),

    /// Print version information.
    Version,

    // ===== Sync, Import & Export =====
    /// Import issues from the JSONL log.
    Import(ImportArgs),

    /// Export issues to the JSONL log.
    Export(ExportArgs),

    // ===== Database & Maintenance =====
    /// Check and repair database health.
    Doctor(DoctorArgs),

    // ===== Utilities =====
    /// Generate shell completions.
    Completion(CompletionArgs),

    /// Manage git worktrees with shared beads database.
    Worktree(WorktreeArgs),
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

/// Arguments for `bd create`.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Issue title (positional argument).
    pub title: Option<String>,

    /// Issue title (alternative to positional argument).
    #[arg(long)]
    pub title_flag: Option<String>,

    /// Issue description.
    #[arg(short = 'd', long)]
    pub description: Option<String>,

    /// Issue type (bug|feature|task|epic|chore|decision).
    #[arg(short = 't', long = "type", default_value = "task")]
    pub issue_type: String,

    /// Priority (0-4 or P0-P4).
    #[arg(short = 'p', long, default_value = "2")]
    pub priority: String,

    /// Assignee.
    #[arg(short = 'a', long)]
    pub assignee: Option<String>,

    /// Labels (comma-separated, repeatable).
    #[arg(short = 'l', long = "label", num_args = 1..)]
    pub labels: Vec<String>,

    /// Explicit issue ID (e.g., 'bd-42' for partitioning).
    #[arg(long)]
    pub id: Option<String>,

    /// Parent issue ID for hierarchical child.
    #[arg(long)]
    pub parent: Option<String>,

    /// Preview what would be created without actually creating.
    #[arg(long)]
    pub dry_run: bool,

    /// Output only the issue ID (for scripting).
    #[arg(long)]
    pub silent: bool,

    /// Force creation even if prefix doesn't match.
    #[arg(long)]
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Show
// ---------------------------------------------------------------------------

/// Arguments for `bd show`.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Issue IDs to display.
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Show compact one-line output per issue.
    #[arg(long)]
    pub short: bool,
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// Arguments for `bd list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by status (open, in_progress, blocked, deferred, closed).
    #[arg(short = 's', long)]
    pub status: Option<String>,

    /// Filter by issue type.
    #[arg(short = 't', long = "type")]
    pub issue_type: Option<String>,

    /// Filter by assignee.
    #[arg(short = 'a', long)]
    pub assignee: Option<String>,

    /// Filter by labels (AND: must have ALL).
    #[arg(short = 'l', long = "label", num_args = 1..)]
    pub labels: Vec<String>,

    /// Filter by labels (OR: must have ANY). Comma-separated.
    #[arg(long = "label-any", num_args = 1..)]
    pub label_any: Vec<String>,

    /// Filter by priority (0-4 or P0-P4).
    #[arg(short = 'p', long)]
    pub priority: Option<String>,

    /// Sort by field: priority, created, updated, closed, status, id, title, type, assignee.
    #[arg(long)]
    pub sort: Option<String>,

    /// Reverse sort order.
    #[arg(short = 'r', long)]
    pub reverse: bool,

    /// Limit results (default 50, use 0 for unlimited).
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: i32,

    /// Show all issues including closed.
    #[arg(long)]
    pub all: bool,

    /// Show detailed multi-line output for each issue.
    #[arg(long)]
    pub long: bool,

    /// Display issues in a tree format with status/priority symbols.
    #[arg(long)]
    pub tree: bool,
}

// ---------------------------------------------------------------------------
// Close
// ---------------------------------------------------------------------------

/// Arguments for `bd close`.
#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Issue IDs to close.
    pub ids: Vec<String>,

    /// Reason for closing.
    #[arg(short = 'r', long)]
    pub reason: Option<String>,

    /// Force close pinned issues or unsatisfied gates.
    #[arg(short = 'f', long)]
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

/// Arguments for `bd init`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Issue prefix (default: current directory name).
    #[arg(short = 'p', long)]
    pub prefix: Option<String>,

    /// Suppress output.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Force re-initialization even if data already exists.
    #[arg(long)]
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Arguments for `bd config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Set a configuration value.
    Set(ConfigSetArgs),
    /// Get a configuration value.
    Get(ConfigGetArgs),
    /// List all configuration values.
    List,
    /// Unset a configuration value.
    Unset(ConfigUnsetArgs),
}

/// Arguments for `bd config set`.
#[derive(Args, Debug)]
pub struct ConfigSetArgs {
    /// Configuration key.
    pub key: String,
    /// Configuration value.
    pub value: String,
}

/// Arguments for `bd config get`.
#[derive(Args, Debug)]
pub struct ConfigGetArgs {
    /// Configuration key.
    pub key: String,
}

/// Arguments for `bd config unset`.
#[derive(Args, Debug)]
pub struct ConfigUnsetArgs {
    /// Configuration key.
    pub key: String,
}

// ---------------------------------------------------------------------------
// Dep
// ---------------------------------------------------------------------------

/// Arguments for `bd dep`.
#[derive(Args, Debug)]
pub struct DepArgs {
    #[command(subcommand)]
    pub command: DepCommands,
}

/// Dependency subcommands.
#[derive(Subcommand, Debug)]
pub enum DepCommands {
    /// Add a dependency between issues.
    Add(DepAddArgs),
    /// Remove a dependency between issues.
    Remove(DepRemoveArgs),
    /// List dependencies for an issue.
    List(DepListArgs),
    /// Detect dependency cycles.
    Cycles,
    /// Show parent issues (issues with parent-child dependency where given issue is the child).
    Parents(DepParentsArgs),
    /// Show child issues (issues that depend on given issue via parent-child).
    Children(DepChildrenArgs),
}

/// Arguments for `bd dep add`.
#[derive(Args, Debug)]
pub struct DepAddArgs {
    /// Source issue ID.
    pub from: String,
    /// Target issue ID.
    pub to: String,
    /// Dependency type (blocks, related, parent-child, discovered-from).
    #[arg(short = 't', long = "type", default_value = "blocks")]
    pub dep_type: String,
}

/// Arguments for `bd dep remove`.
#[derive(Args, Debug)]
pub struct DepRemoveArgs {
    /// Source issue ID.
    pub from: String,
    /// Target issue ID.
    pub to: String,
}

/// Arguments for `bd dep list`.
#[derive(Args, Debug)]
pub struct DepListArgs {
    /// Issue ID to list dependencies for.
    pub id: String,
}

/// Arguments for `bd dep parents`.
#[derive(Args, Debug)]
pub struct DepParentsArgs {
    /// Issue ID to find parents of.
    pub id: String,
}

/// Arguments for `bd dep children`.
#[derive(Args, Debug)]
pub struct DepChildrenArgs {
    /// Issue ID to find children of.
    pub id: String,
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

/// Arguments for `bd comment` (add a comment).
#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Issue ID.
    pub id: String,
    /// Comment text (if not provided, opens editor).
    pub text: Option<String>,
}

/// Arguments for `bd comments` (list comments).
#[derive(Args, Debug)]
pub struct CommentsArgs {
    /// Issue ID.
    pub id: String,
}

// ---------------------------------------------------------------------------
// Label (subcommands)
// ---------------------------------------------------------------------------

/// Arguments for `bd label`.
#[derive(Args, Debug)]
pub struct LabelArgs {
    /// Issue ID.
    pub id: String,
    #[command(subcommand)]
    pub command: LabelCommands,
}

/// Label subcommands.
#[derive(Subcommand, Debug)]
pub enum LabelCommands {
    /// Add a label to an issue.
    Add(LabelAddArgs),
    /// Remove a label from an issue.
    Remove(LabelRemoveArgs),
    /// List labels on an issue.
    List,
}

/// Arguments for `bd label <id> add`.
#[derive(Args, Debug)]
pub struct LabelAddArgs {
    /// Label to add.
    pub label: String,
}

/// Arguments for `bd label <id> remove`.
#[derive(Args, Debug)]
pub struct LabelRemoveArgs {
    /// Label to remove.
    pub label: String,
}

// ---------------------------------------------------------------------------
// Import (Phase 5 stub)
// ---------------------------------------------------------------------------

/// Arguments for `bd import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Source file or URL to import from.
    pub source: Option<String>,

    /// Import format (json, csv, markdown).
    #[arg(short = 'f', long, default_value = "json")]
    pub format: String,
}

// ---------------------------------------------------------------------------
// Export (Phase 5 stub)
// ---------------------------------------------------------------------------

/// Arguments for `bd export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(subcommand)]
    pub command: Option<ExportCommands>,
}

/// Export subcommands.
#[derive(Subcommand, Debug)]
pub enum ExportCommands {
    /// Export to Obsidian vault format.
    Obsidian(ExportObsidianArgs),
}

/// Arguments for `bd export obsidian`.
#[derive(Args, Debug)]
pub struct ExportObsidianArgs {
    /// Output directory for the Obsidian vault.
    pub output: Option<String>,
}

// ---------------------------------------------------------------------------
// Doctor (Phase 6)
// ---------------------------------------------------------------------------

/// Arguments for `bd doctor`.
#[derive(Args, Debug)]
pub struct DoctorArgs {
    #[command(subcommand)]
    pub command: Option<DoctorCommands>,
}

/// Doctor subcommands.
#[derive(Subcommand, Debug)]
pub enum DoctorCommands {
    /// Attempt to fix detected issues.
    Fix,
    /// Check database health (default if no subcommand given).
    Health,
    /// Validate database schema and data integrity.
    Validate,
    /// Detect data pollution.
    Pollution,
    /// Check for orphaned artifacts.
    Artifacts,
}
// ---------------------------------------------------------------------------
// Completion (Phase 8 -- real implementation)
// ---------------------------------------------------------------------------

/// Arguments for `bd completion`.
#[derive(Args, Debug)]
pub struct CompletionArgs {
    #[command(subcommand)]
    pub command: CompletionCommands,
}

/// Completion subcommands.
#[derive(Subcommand, Debug)]
pub enum CompletionCommands {
    /// Generate Bash completions.
    Bash,
    /// Generate Zsh completions.
    Zsh,
    /// Generate Fish completions.
    Fish,
    /// Generate PowerShell completions.
    Powershell,
}

// ---------------------------------------------------------------------------
// Worktree
// ---------------------------------------------------------------------------

/// Arguments for `bd worktree`.
#[derive(Args, Debug)]
pub struct WorktreeArgs {
    #[command(subcommand)]
    pub command: WorktreeCommands,
}

/// Worktree subcommands.
#[derive(Subcommand, Debug)]
pub enum WorktreeCommands {
    /// Create a new worktree with shared beads database.
    Create(WorktreeCreateArgs),
    /// Remove a worktree.
    Remove(WorktreeRemoveArgs),
    /// List all worktrees with beads state.
    List,
    /// Show info about the current worktree.
    Info,
}

/// Arguments for `bd worktree create`.
#[derive(Args, Debug)]
pub struct WorktreeCreateArgs {
    /// Name for the new worktree.
    pub name: Option<String>,

    /// Branch name (defaults to worktree name).
    #[arg(long)]
    pub branch: Option<String>,
}

/// Arguments for `bd worktree remove`.
#[derive(Args, Debug)]
pub struct WorktreeRemoveArgs {
    /// Name of the worktree to remove.
    pub name: String,

    /// Skip safety checks (uncommitted changes, unpushed commits).
    #[arg(long)]
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Daemon
// ---------------------------------------------------------------------------

/// Arguments for `bd daemon`.
#[derive(Args, Debug)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommands,
}

/// Daemon subcommands.
#[derive(Subcommand, Debug)]
pub enum DaemonCommands {
    /// Start the daemon if it isn't already running.
    Start,
    /// Stop the running daemon.
    Stop,
    /// Report whether the daemon is running and its health.
    Status,
    /// Run as the daemon process itself (internal: used by auto-start).
    #[command(hide = true)]
    Exec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_version() {
        // Verify the parser doesn't panic for basic invocations
        let cli = Cli::try_parse_from(["bd", "version"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn cli_parses_create() {
        let cli = Cli::try_parse_from(["bd", "create", "Test issue"]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        match cli.command {
            Some(Commands::Create(args)) => {
                assert_eq!(args.title, Some("Test issue".to_string()));
            }
            _ => panic!("Expected Create command"),
        }
    }

    #[test]
    fn cli_global_flags() {
        let cli = Cli::try_parse_from(["bd", "--json", "--verbose", "list"]);
        assert!(cli.is_ok());
        let cli = cli.unwrap();
        assert!(cli.global.json);
        assert!(cli.global.verbose);
    }

    #[test]
    fn cli_parses_config_set() {
        let cli = Cli::try_parse_from(["bd", "config", "set", "key", "value"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn cli_parses_dep_add() {
        let cli = Cli::try_parse_from(["bd", "dep", "add", "bd-abc", "bd-def"]);
        assert!(cli.is_ok());
    }
}
