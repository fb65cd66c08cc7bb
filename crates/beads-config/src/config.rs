//! Configuration types and loading for the beads system.
//!
//! The main entry point is [`BeadsConfig`], which represents the contents of
//! `.beads/config.yaml`. Configuration is loaded with [`load_config`] and
//! saved with [`save_config`].
//!
//! Ported from Go `internal/config/config.go`, `sync.go`, and `repos.go`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// The `.beads/` directory was not found.
    #[error("no .beads directory found (run 'bd init' first)")]
    BeadsDirNotFound,

    /// A configuration value was invalid.
    #[error("invalid configuration value for key '{key}': {reason}")]
    InvalidValue {
        /// The configuration key that had an invalid value.
        key: String,
        /// A description of why the value is invalid.
        reason: String,
    },
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Sync-core configuration
// ---------------------------------------------------------------------------

/// Sync configuration section: the daemon/VCS-synchronizer knobs (§4.6, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Dedicated branch for log commits, checked out in a private worktree.
    /// Empty means commit on whatever branch is currently checked out.
    #[serde(default, rename = "branch")]
    pub branch: String,

    /// Quiet window (seconds) before the auto-flush pipeline exports dirty
    /// rows. See §4.2.
    #[serde(default = "default_flush_debounce", rename = "flush-debounce")]
    pub flush_debounce: u64,

    /// Whether a client that fails to connect to the daemon socket may
    /// fork-and-detach a new daemon process.
    #[serde(default = "default_true", rename = "auto-start-daemon")]
    pub auto_start_daemon: bool,

    /// Force direct-mode store access, never talking to a daemon.
    #[serde(default, rename = "no-daemon")]
    pub no_daemon: bool,

    /// Override the repository fingerprint check on daemon startup (§6.4).
    #[serde(default, rename = "ignore-repo-mismatch")]
    pub ignore_repo_mismatch: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            branch: String::new(),
            flush_debounce: default_flush_debounce(),
            auto_start_daemon: true,
            no_daemon: false,
            ignore_repo_mismatch: false,
        }
    }
}

fn default_flush_debounce() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Git-related configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GitConfig {
    /// Override commit author (e.g., `"beads-bot <beads@example.com>"`).
    #[serde(default)]
    pub author: String,

    /// Disable GPG signing for beads commits.
    #[serde(default, rename = "no-gpg-sign")]
    pub no_gpg_sign: bool,
}

/// Routing configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Routing mode.
    #[serde(default)]
    pub mode: String,

    /// Default route.
    #[serde(default = "default_route_dot")]
    pub default: String,

    /// Maintainer route.
    #[serde(default = "default_route_dot")]
    pub maintainer: String,

    /// Contributor route.
    #[serde(default = "default_contributor_route")]
    pub contributor: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: String::new(),
            default: default_route_dot(),
            maintainer: default_route_dot(),
            contributor: default_contributor_route(),
        }
    }
}

fn default_route_dot() -> String {
    ".".to_string()
}

fn default_contributor_route() -> String {
    "~/.beads-planning".to_string()
}

/// Validation configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Validation behavior on create. Values: `"none"` | `"warn"` | `"error"`.
    #[serde(default = "default_validation_none", rename = "on-create")]
    pub on_create: String,

    /// Validation behavior on sync. Values: `"none"` | `"warn"` | `"error"`.
    #[serde(default = "default_validation_none", rename = "on-sync")]
    pub on_sync: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            on_create: default_validation_none(),
            on_sync: default_validation_none(),
        }
    }
}

fn default_validation_none() -> String {
    "none".to_string()
}

/// Hierarchy configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Maximum nesting depth for hierarchical IDs.
    #[serde(default = "default_max_depth", rename = "max-depth")]
    pub max_depth: u32,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

fn default_max_depth() -> u32 {
    3
}

/// Create command configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateConfig {
    /// Whether a description is required when creating issues.
    #[serde(default, rename = "require-description")]
    pub require_description: bool,
}

/// Multi-repo configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReposConfig {
    /// Primary repo path (where canonical issues live).
    #[serde(default)]
    pub primary: String,

    /// Additional repos to hydrate from.
    #[serde(default)]
    pub additional: Vec<String>,
}

/// AI configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// The AI model identifier.
    #[serde(default = "default_ai_model")]
    pub model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_ai_model(),
        }
    }
}

fn default_ai_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

/// Custom types configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TypesConfig {
    /// Comma-separated list of custom issue types.
    #[serde(default)]
    pub custom: String,
}

/// Custom statuses configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatusConfig {
    /// Comma-separated list of custom statuses.
    #[serde(default)]
    pub custom: String,
}

// ---------------------------------------------------------------------------
// Main config struct
// ---------------------------------------------------------------------------

/// The full beads configuration, corresponding to `.beads/config.yaml`.
///
/// All fields use `serde` defaults so that a partially-specified YAML file
/// will be deserialized correctly with sensible default values.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BeadsConfig {
    /// Issue ID prefix (e.g., `"bd-"`).
    #[serde(default, rename = "issue-prefix")]
    pub prefix: Option<String>,

    /// Output JSON instead of human-readable text.
    #[serde(default)]
    pub json: bool,

    /// Disable database usage.
    #[serde(default, rename = "no-db")]
    pub no_db: bool,

    /// Database path override.
    #[serde(default)]
    pub db: Option<String>,

    /// Actor identity override.
    #[serde(default)]
    pub actor: Option<String>,

    /// User identity for messaging.
    #[serde(default)]
    pub identity: Option<String>,

    /// Disable git push operations.
    #[serde(default, rename = "no-push")]
    pub no_push: bool,

    /// Disable all git operations.
    #[serde(default, rename = "no-git-ops")]
    pub no_git_ops: bool,

    /// Custom issue types.
    #[serde(default)]
    pub types: TypesConfig,

    /// Custom statuses.
    #[serde(default)]
    pub status: StatusConfig,

    /// Sync configuration.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Git-related configuration.
    #[serde(default)]
    pub git: GitConfig,

    /// Routing configuration.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Validation configuration.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Hierarchy configuration.
    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    /// Create command configuration.
    #[serde(default)]
    pub create: CreateConfig,

    /// Multi-repo configuration.
    #[serde(default)]
    pub repos: ReposConfig,

    /// AI configuration.
    #[serde(default)]
    pub ai: AiConfig,

    /// Directory-to-label mapping for monorepo scoping.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// External projects for cross-project dependency resolution.
    #[serde(default)]
    pub external_projects: HashMap<String, String>,
}

/// Directory label configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryConfig {
    /// Maps directory patterns to labels.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Helper methods on BeadsConfig
// ---------------------------------------------------------------------------

impl BeadsConfig {
    /// Return custom types as a vector of trimmed, non-empty strings.
    ///
    /// The `types.custom` field in the YAML is a comma-separated string.
    pub fn custom_types(&self) -> Vec<String> {
        parse_comma_list(&self.types.custom)
    }

    /// Return custom statuses as a vector of trimmed, non-empty strings.
    ///
    /// The `status.custom` field in the YAML is a comma-separated string.
    pub fn custom_statuses(&self) -> Vec<String> {
        parse_comma_list(&self.status.custom)
    }
}

/// Parse a comma-separated string into a vector of trimmed, non-empty strings.
fn parse_comma_list(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load configuration from `.beads/config.yaml` inside the given `.beads/` directory.
///
/// If the file does not exist, a default [`BeadsConfig`] is returned.
///
/// # Errors
///
/// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
/// or [`ConfigError::ParseError`] if it contains invalid YAML.
pub fn load_config(beads_dir: &Path) -> Result<BeadsConfig> {
    let config_path = beads_dir.join("config.yaml");

    if !config_path.exists() {
        return Ok(BeadsConfig::default());
    }

    let content = std::fs::read_to_string(&config_path)?;

    // An empty file is valid and yields default config.
    if content.trim().is_empty() {
        return Ok(BeadsConfig::default());
    }

    let config: BeadsConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to `.beads/config.yaml` inside the given `.beads/` directory.
///
/// The directory is created if it does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::ReadError`] on I/O failure or [`ConfigError::ParseError`]
/// if serialization fails.
pub fn save_config(beads_dir: &Path, config: &BeadsConfig) -> Result<()> {
    std::fs::create_dir_all(beads_dir)?;

    let config_path = beads_dir.join("config.yaml");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(config_path, yaml)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config() {
        let cfg = BeadsConfig::default();
        assert!(cfg.prefix.is_none());
        assert!(!cfg.json);
        assert!(!cfg.no_db);
        assert!(cfg.custom_types().is_empty());
        assert!(cfg.custom_statuses().is_empty());
    }

    #[test]
    fn test_load_missing_config_returns_default() {
        let dir = PathBuf::from("/nonexistent/path/.beads");
        let cfg = load_config(&dir).unwrap();
        assert!(cfg.prefix.is_none());
    }

    #[test]
    fn test_parse_comma_list() {
        assert_eq!(parse_comma_list(""), Vec::<String>::new());
        assert_eq!(parse_comma_list("a, b, c"), vec!["a", "b", "c"]);
        assert_eq!(parse_comma_list(" x "), vec!["x"]);
        assert_eq!(parse_comma_list(",,"), Vec::<String>::new());
    }

    #[test]
    fn test_roundtrip_config() {
        let dir = tempfile::tempdir().unwrap();
        let beads_dir = dir.path().join(".beads");

        let mut cfg = BeadsConfig::default();
        cfg.prefix = Some("test-".to_string());
        cfg.types.custom = "epic, spike".to_string();

        save_config(&beads_dir, &cfg).unwrap();
        let loaded = load_config(&beads_dir).unwrap();

        assert_eq!(loaded.prefix.as_deref(), Some("test-"));
        assert_eq!(loaded.custom_types(), vec!["epic", "spike"]);
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = "issue-prefix: proj-\njson: true\n";
        let cfg: BeadsConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.prefix.as_deref(), Some("proj-"));
        assert!(cfg.json);
        // Everything else should be default
        assert!(!cfg.no_db);
        assert_eq!(cfg.hierarchy.max_depth, 3);
    }

    #[test]
    fn test_sync_config_defaults() {
        let cfg = BeadsConfig::default();
        assert_eq!(cfg.sync.flush_debounce, 10);
        assert!(cfg.sync.auto_start_daemon);
        assert!(!cfg.sync.no_daemon);
        assert!(!cfg.sync.ignore_repo_mismatch);
        assert_eq!(cfg.sync.branch, "");
    }

    #[test]
    fn test_sync_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let beads_dir = dir.path().join(".beads");

        let mut cfg = BeadsConfig::default();
        cfg.sync.branch = "beads-sync".to_string();
        cfg.sync.flush_debounce = 30;
        cfg.sync.no_daemon = true;

        save_config(&beads_dir, &cfg).unwrap();
        let loaded = load_config(&beads_dir).unwrap();

        assert_eq!(loaded.sync.branch, "beads-sync");
        assert_eq!(loaded.sync.flush_debounce, 30);
        assert!(loaded.sync.no_daemon);
    }
}
