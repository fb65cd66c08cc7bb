//! Auto-import pipeline: gates on the content-hash watermark, parses the
//! log, classifies each incoming issue, and applies the result (§4.3).

use std::fs;
use std::path::Path;

use beads_core::issue::Issue;
use beads_core::jsonl::find_merge_conflict_marker;
use beads_storage::Storage;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::apply::{apply_new_issue, replace_issue_in_place};
use crate::collision::{classify, existing_wins, Classification};
use crate::error::{ImportError, Result};
use crate::remap::{allocate_new_id, relocate_existing, rewrite_batch_references};

const METADATA_WATERMARK_KEY: &str = "last_import_hash";

/// Summary of one auto-import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// The log's content hash matched the watermark; nothing was done.
    pub skipped: bool,
    /// Number of issues created (new IDs, including relocated losers).
    pub created: usize,
    /// Number of issues whose content at an existing ID was replaced.
    pub updated: usize,
    /// Number of incoming issues identical to the stored copy.
    pub unchanged: usize,
    /// Collisions that were auto-resolved: `(original_id, relocated_id)`.
    pub remapped: Vec<(String, String)>,
    /// Collision IDs left untouched because `auto_resolve` was false.
    pub unresolved_collisions: Vec<String>,
    /// Lines that failed to parse as JSON, with a position-tagged message.
    pub parse_warnings: Vec<String>,
}

/// Runs the full auto-import pipeline against `log_path`.
///
/// When `auto_resolve` is `false`, collisions are reported but left
/// unapplied along with their embedded labels/dependencies/comments, which
/// are retried on the next import once the collision resolves (§4.4 "Open
/// Question" resolution).
pub fn auto_import(storage: &dyn Storage, log_path: &Path, auto_resolve: bool) -> Result<ImportReport> {
    let mut report = ImportReport::default();

    if !log_path.exists() {
        report.skipped = true;
        return Ok(report);
    }

    let raw = fs::read_to_string(log_path)?;

    if let Some(line) = find_merge_conflict_marker(&raw) {
        return Err(ImportError::MergeConflict { line });
    }

    let hash = content_hash(raw.as_bytes());
    let watermark = storage.get_metadata(METADATA_WATERMARK_KEY).unwrap_or_default();
    if !hash.is_empty() && hash == watermark {
        report.skipped = true;
        return Ok(report);
    }

    let before = storage.get_statistics()?.total_issues;

    let mut batch = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Issue>(trimmed) {
            Ok(mut issue) => {
                issue.set_defaults();
                batch.push(issue);
            }
            Err(e) => report
                .parse_warnings
                .push(format!("line {}: {e}", line_no + 1)),
        }
    }

    apply_batch(storage, &mut batch, auto_resolve, &mut report)?;

    let after = storage.get_statistics()?.total_issues;
    if after < before {
        return Err(ImportError::Integrity { before, after });
    }

    storage.set_metadata(METADATA_WATERMARK_KEY, &hash)?;
    Ok(report)
}

fn apply_batch(
    storage: &dyn Storage,
    batch: &mut Vec<Issue>,
    auto_resolve: bool,
    report: &mut ImportReport,
) -> Result<()> {
    let mut i = 0;
    while i < batch.len() {
        let incoming = batch[i].clone();
        match classify(storage, incoming)? {
            Classification::New(issue) => {
                apply_new_issue(storage, &issue)?;
                report.created += 1;
            }
            Classification::Exact(_) => {
                report.unchanged += 1;
            }
            Classification::Collision(collision) => {
                if !auto_resolve {
                    report.unresolved_collisions.push(collision.id);
                    i += 1;
                    continue;
                }

                let id = collision.id.clone();
                if existing_wins(&collision.existing, &collision.incoming) {
                    let new_id = allocate_new_id(storage, &id)?;
                    let mut relocated = collision.incoming;
                    relocated.id = new_id.clone();
                    apply_new_issue(storage, &relocated)?;
                    rewrite_batch_references(batch, &id, &new_id);
                    report.created += 1;
                    report.remapped.push((id, new_id));
                } else {
                    let new_id = allocate_new_id(storage, &id)?;
                    relocate_existing(storage, &id, &new_id)?;
                    replace_issue_in_place(storage, &collision.incoming)?;
                    report.updated += 1;
                    report.remapped.push((id, new_id));
                }
            }
        }
        i += 1;
    }

    if !report.parse_warnings.is_empty() {
        for w in &report.parse_warnings {
            warn!(warning = w.as_str(), "import: skipped unparseable log line");
        }
    }

    Ok(())
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn write_log(dir: &Path, issues: &[Issue]) -> std::path::PathBuf {
        let path = dir.join("issues.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        beads_core::jsonl::write_jsonl(&mut file, issues).unwrap();
        path
    }

    #[test]
    fn missing_log_is_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let report = auto_import(&store, &dir.path().join("issues.jsonl"), true).unwrap();
        assert!(report.skipped);
    }

    #[test]
    fn imports_new_issues() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(
            dir.path(),
            &[IssueBuilder::new("From peer").id("bd-1").build()],
        );

        let report = auto_import(&store, &log, true).unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(store.get_issue("bd-1").unwrap().title, "From peer");
    }

    #[test]
    fn second_import_is_gated_by_watermark() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let log = write_log(
            dir.path(),
            &[IssueBuilder::new("From peer").id("bd-1").build()],
        );

        auto_import(&store, &log, true).unwrap();
        let report = auto_import(&store, &log, true).unwrap();
        assert!(report.skipped);
    }

    #[test]
    fn merge_conflict_marker_aborts() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("issues.jsonl");
        std::fs::write(&log, "<<<<<<< HEAD\n{}\n=======\n{}\n>>>>>>> theirs\n").unwrap();

        let err = auto_import(&store, &log, true).unwrap_err();
        assert!(matches!(err, ImportError::MergeConflict { line: 1 }));
    }

    #[test]
    fn collision_auto_resolves_by_relocating_loser() {
        let store = SqliteStore::open_in_memory().unwrap();
        let existing = IssueBuilder::new("Local version")
            .id("bd-1")
            .updated_at(
                chrono::DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&chrono::Utc),
            )
            .build();
        store.create_issue(&existing, "alice").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let incoming = IssueBuilder::new("Peer version")
            .id("bd-1")
            .updated_at(
                chrono::DateTime::parse_from_rfc3339("2020-06-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&chrono::Utc),
            )
            .build();
        let log = write_log(dir.path(), &[incoming]);

        let report = auto_import(&store, &log, true).unwrap();
        assert_eq!(report.remapped.len(), 1);
        // incoming has the later updated_at, so it wins and keeps bd-1;
        // the local version is relocated to the remap target.
        assert_eq!(store.get_issue("bd-1").unwrap().title, "Peer version");
        let (_, new_id) = &report.remapped[0];
        assert_eq!(store.get_issue(new_id).unwrap().title, "Local version");
    }

    #[test]
    fn collision_left_unresolved_when_not_auto_resolving() {
        let store = SqliteStore::open_in_memory().unwrap();
        let existing = IssueBuilder::new("Local").id("bd-1").build();
        store.create_issue(&existing, "alice").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut incoming = IssueBuilder::new("Peer").id("bd-1").build();
        incoming.updated_at = chrono::Utc::now() + chrono::Duration::seconds(5);
        let log = write_log(dir.path(), &[incoming]);

        let report = auto_import(&store, &log, false).unwrap();
        assert_eq!(report.unresolved_collisions, vec!["bd-1".to_string()]);
        assert_eq!(store.get_issue("bd-1").unwrap().title, "Local");
    }
}
