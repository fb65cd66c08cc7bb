//! Incremental and full export of the store to the JSONL log (§4.2, §6.1).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use beads_core::issue::Issue;
use beads_core::jsonl;
use beads_storage::Storage;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Fetches dependency edges, labels, and comments for `issue` and embeds
/// them, matching the fully-populated log entry shape of §6.1.
pub fn hydrate(storage: &dyn Storage, mut issue: Issue) -> Result<Issue> {
    issue.dependencies = storage.get_dependency_records(&issue.id)?;
    issue.labels = storage.get_labels(&issue.id)?;
    issue.comments = storage.get_comments(&issue.id)?;
    Ok(issue)
}

/// Full export: every issue currently in the store, fully hydrated and
/// sorted by identifier. Used after ID-changing operations (renumber,
/// collision remap) where the existing log can't be trusted to patch.
pub fn full_export(storage: &dyn Storage) -> Result<Vec<Issue>> {
    let issues = storage.search_issues("", &beads_core::filter::IssueFilter::default())?;
    let mut hydrated = Vec::with_capacity(issues.len());
    for issue in issues {
        hydrated.push(hydrate(storage, issue)?);
    }
    jsonl::sort_by_id(&mut hydrated);
    Ok(hydrated)
}

/// Incremental export: read the current log, replace or remove each dirty
/// entry, and return the merged set sorted by identifier. The caller writes
/// the result back with [`write_log_atomic`].
pub fn incremental_export(
    storage: &dyn Storage,
    log_path: &Path,
    dirty_ids: &[String],
) -> Result<Vec<Issue>> {
    let mut by_id = read_existing(log_path)?;

    for id in dirty_ids {
        match storage.get_issue(id) {
            Ok(issue) => {
                let hydrated = hydrate(storage, issue)?;
                by_id.insert(id.clone(), hydrated);
            }
            Err(e) if e.is_not_found() => {
                by_id.remove(id);
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut issues: Vec<Issue> = by_id.into_values().collect();
    jsonl::sort_by_id(&mut issues);
    Ok(issues)
}

fn read_existing(log_path: &Path) -> Result<HashMap<String, Issue>> {
    if !log_path.exists() {
        return Ok(HashMap::new());
    }
    let file = File::open(log_path)?;
    let reader = BufReader::new(file);
    let mut map = HashMap::new();
    for issue in jsonl::read_jsonl(reader) {
        let issue = issue?;
        map.insert(issue.id.clone(), issue);
    }
    Ok(map)
}

/// Writes `issues` to `log_path` atomically: a sibling temp file suffixed
/// with the writer's PID is written, `fsync`'d, and renamed over the
/// target (§4.2 "Atomicity").
pub fn write_log_atomic(log_path: &Path, issues: &[Issue]) -> Result<()> {
    let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let file_name = log_path
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("issues.jsonl");
    let tmp_path = dir.join(format!("{file_name}.tmp.{}", std::process::id()));

    let write_result = (|| -> Result<()> {
        let mut file = File::create(&tmp_path)?;
        jsonl::write_jsonl(&mut file, issues)?;
        file.sync_all()?;
        set_permissions_0600(&tmp_path)?;
        Ok(())
    })();

    if let Err(e) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Err(e) = fs::rename(&tmp_path, log_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    Ok(())
}

#[cfg(unix)]
fn set_permissions_0600(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions_0600(_path: &Path) -> Result<()> {
    Ok(())
}

/// SHA-256 hex digest of the log file's current bytes, used as the
/// `last_import_hash` watermark.
pub fn content_hash(log_path: &Path) -> Result<String> {
    let bytes = fs::read(log_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn full_export_hydrates_labels_and_deps() {
        let store = test_store();
        let parent = IssueBuilder::new("Parent").id("bd-1").build();
        let child = IssueBuilder::new("Child").id("bd-2").build();
        store.create_issue(&parent, "alice").unwrap();
        store.create_issue(&child, "alice").unwrap();
        store.add_label("bd-2", "urgent", "alice").unwrap();
        let dep = beads_core::dependency::Dependency {
            issue_id: "bd-2".into(),
            depends_on_id: "bd-1".into(),
            dep_type: beads_core::enums::DependencyType::ParentChild,
            created_at: chrono::Utc::now(),
            created_by: "alice".into(),
        };
        store.add_dependency(&dep, "alice").unwrap();

        let exported = full_export(&store).unwrap();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].id, "bd-1");
        assert_eq!(exported[1].id, "bd-2");
        assert_eq!(exported[1].labels, vec!["urgent"]);
        assert_eq!(exported[1].dependencies.len(), 1);
        assert_eq!(exported[1].dependencies[0].depends_on_id, "bd-1");
    }

    #[test]
    fn write_log_atomic_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("issues.jsonl");

        let issues = vec![
            IssueBuilder::new("A").id("bd-1").build(),
            IssueBuilder::new("B").id("bd-2").build(),
        ];
        write_log_atomic(&log_path, &issues).unwrap();

        let contents = fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 2);

        // No leftover temp file.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn incremental_export_removes_deleted_issue() {
        let store = test_store();
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("issues.jsonl");

        let a = IssueBuilder::new("A").id("bd-1").build();
        let b = IssueBuilder::new("B").id("bd-2").build();
        store.create_issue(&a, "alice").unwrap();
        store.create_issue(&b, "alice").unwrap();

        let initial = full_export(&store).unwrap();
        write_log_atomic(&log_path, &initial).unwrap();

        store.delete_issue("bd-2").unwrap();

        let merged =
            incremental_export(&store, &log_path, &["bd-2".to_string()]).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "bd-1");
    }

    #[test]
    fn content_hash_changes_with_content() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("issues.jsonl");

        write_log_atomic(&log_path, &[IssueBuilder::new("A").id("bd-1").build()]).unwrap();
        let hash1 = content_hash(&log_path).unwrap();

        write_log_atomic(
            &log_path,
            &[
                IssueBuilder::new("A").id("bd-1").build(),
                IssueBuilder::new("B").id("bd-2").build(),
            ],
        )
        .unwrap();
        let hash2 = content_hash(&log_path).unwrap();

        assert_ne!(hash1, hash2);
    }
}
