//! Applies a fully-populated incoming issue (with its embedded labels,
//! dependencies, and comments) to the store, using set semantics: members
//! already present are never duplicated, and dependencies naming an unknown
//! issue are skipped with a warning rather than rejected outright.

use beads_core::issue::Issue;
use beads_storage::Storage;
use tracing::warn;

use crate::error::Result;

/// Creates `issue` and attaches its embedded labels, dependencies, and
/// comments. The caller is responsible for ensuring no row already exists
/// at `issue.id`.
pub fn apply_new_issue(storage: &dyn Storage, issue: &Issue) -> Result<()> {
    let mut core = issue.clone();
    let labels = std::mem::take(&mut core.labels);
    let dependencies = std::mem::take(&mut core.dependencies);
    let comments = std::mem::take(&mut core.comments);

    storage.create_issue(&core, &core.created_by)?;
    apply_children(storage, &core.id, &labels, &dependencies, &comments)
}

/// Replaces the issue at `issue.id` with `issue`'s content: deletes the
/// existing row (cascading its old labels/dependencies/comments) and
/// recreates it fresh, then reapplies the embedded children. Used when an
/// incoming record wins a collision and supersedes the existing content at
/// the same identifier.
pub fn replace_issue_in_place(storage: &dyn Storage, issue: &Issue) -> Result<()> {
    storage.delete_issue(&issue.id)?;
    apply_new_issue(storage, issue)
}

fn apply_children(
    storage: &dyn Storage,
    id: &str,
    labels: &[String],
    dependencies: &[beads_core::dependency::Dependency],
    comments: &[beads_core::comment::Comment],
) -> Result<()> {
    let existing_labels = storage.get_labels(id)?;
    for label in labels {
        if !existing_labels.iter().any(|l| l == label) {
            storage.add_label(id, label, "import")?;
        }
    }

    let existing_deps = storage.get_dependency_records(id)?;
    for dep in dependencies {
        let already_present = existing_deps
            .iter()
            .any(|d| d.depends_on_id == dep.depends_on_id && d.dep_type == dep.dep_type);
        if already_present {
            continue;
        }
        if storage.get_issue(&dep.depends_on_id).is_err() {
            warn!(
                issue = id,
                depends_on = dep.depends_on_id.as_str(),
                "import: skipping dependency on unknown issue"
            );
            continue;
        }
        storage.add_dependency(dep, &dep.created_by)?;
    }

    let existing_comments = storage.get_comments(id)?;
    for comment in comments {
        let already_present = existing_comments
            .iter()
            .any(|c| c.author == comment.author && c.text == comment.text);
        if already_present {
            continue;
        }
        storage.import_comment(id, &comment.author, &comment.text, comment.created_at)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::dependency::Dependency;
    use beads_core::enums::DependencyType;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    #[test]
    fn apply_new_issue_attaches_children() {
        let store = SqliteStore::open_in_memory().unwrap();
        let target = IssueBuilder::new("Target").id("bd-1").build();
        store.create_issue(&target, "alice").unwrap();

        let mut incoming = IssueBuilder::new("New").id("bd-2").build();
        incoming.labels = vec!["urgent".to_string()];
        incoming.dependencies = vec![Dependency {
            issue_id: "bd-2".into(),
            depends_on_id: "bd-1".into(),
            dep_type: DependencyType::Blocks,
            created_at: chrono::Utc::now(),
            created_by: "alice".into(),
        }];

        apply_new_issue(&store, &incoming).unwrap();

        assert_eq!(store.get_labels("bd-2").unwrap(), vec!["urgent"]);
        assert_eq!(store.get_dependency_records("bd-2").unwrap().len(), 1);
    }

    #[test]
    fn apply_new_issue_skips_unknown_dependency() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut incoming = IssueBuilder::new("New").id("bd-2").build();
        incoming.dependencies = vec![Dependency {
            issue_id: "bd-2".into(),
            depends_on_id: "bd-404".into(),
            dep_type: DependencyType::Blocks,
            created_at: chrono::Utc::now(),
            created_by: "alice".into(),
        }];

        apply_new_issue(&store, &incoming).unwrap();
        assert!(store.get_dependency_records("bd-2").unwrap().is_empty());
    }

    #[test]
    fn replace_in_place_swaps_content_at_same_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let original = IssueBuilder::new("Original").id("bd-1").build();
        store.create_issue(&original, "alice").unwrap();

        let replacement = IssueBuilder::new("Replaced").id("bd-1").build();
        replace_issue_in_place(&store, &replacement).unwrap();

        assert_eq!(store.get_issue("bd-1").unwrap().title, "Replaced");
    }
}
