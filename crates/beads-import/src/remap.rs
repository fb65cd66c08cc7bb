//! Collision remapping: relocates the losing side of a collision to a fresh
//! identifier while preserving referential integrity (§4.4).

use beads_core::idgen::{format_id, parse_id};
use beads_core::issue::Issue;
use beads_storage::Storage;

use crate::error::{ImportError, Result};

/// Allocates the next free identifier in the same prefix as `old_id`.
pub fn allocate_new_id(storage: &dyn Storage, old_id: &str) -> Result<String> {
    let (prefix, _) =
        parse_id(old_id).ok_or_else(|| ImportError::MalformedId(old_id.to_string()))?;
    let n = storage.next_id(prefix)?;
    Ok(format_id(prefix, n))
}

/// Moves the issue currently stored at `old_id` to `new_id`, carrying its
/// labels, comments, and dependency edges (both directions) along, then
/// deletes the old row. Used when the existing issue loses a collision: the
/// winning incoming record will be written to `old_id` afterward.
///
/// Every dependency edge in the store that referenced `old_id` is rewritten
/// to `new_id`, preserving referential integrity for the relocated issue's
/// history.
pub fn relocate_existing(storage: &dyn Storage, old_id: &str, new_id: &str) -> Result<()> {
    let existing = storage.get_issue(old_id)?;

    let mut relocated = existing.clone();
    relocated.id = new_id.to_string();
    relocated.labels.clear();
    relocated.dependencies.clear();
    relocated.comments.clear();
    storage.create_issue(&relocated, &existing.created_by)?;

    for label in &existing.labels {
        storage.add_label(new_id, label, &existing.created_by)?;
    }
    for comment in &existing.comments {
        storage.import_comment(new_id, &comment.author, &comment.text, comment.created_at)?;
    }

    // Edges pointing at the relocated issue (reverse direction).
    for dependent in storage.get_dependents_with_metadata(old_id)? {
        storage.remove_dependency(&dependent.issue.id, old_id, "import")?;
        let mut dep = dependent.dependency;
        dep.depends_on_id = new_id.to_string();
        storage.add_dependency(&dep, "import")?;
    }

    // The relocated issue's own outgoing edges.
    for dep in storage.get_dependency_records(old_id)? {
        let mut moved = dep;
        moved.issue_id = new_id.to_string();
        storage.add_dependency(&moved, "import")?;
    }

    storage.delete_issue(old_id)?;
    Ok(())
}

/// Rewrites dependency edges embedded in incoming batch records that refer
/// to `old_id`, so siblings that pointed at the now-relocated issue follow
/// it to `new_id`.
pub fn rewrite_batch_references(batch: &mut [Issue], old_id: &str, new_id: &str) {
    for issue in batch.iter_mut() {
        for dep in issue.dependencies.iter_mut() {
            if dep.depends_on_id == old_id {
                dep.depends_on_id = new_id.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::dependency::Dependency;
    use beads_core::enums::DependencyType;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    #[test]
    fn relocate_moves_labels_and_deps() {
        let store = SqliteStore::open_in_memory().unwrap();
        let parent = IssueBuilder::new("Parent").id("bd-1").build();
        let child = IssueBuilder::new("Child").id("bd-2").build();
        let grandchild = IssueBuilder::new("Grandchild").id("bd-3").build();
        store.create_issue(&parent, "alice").unwrap();
        store.create_issue(&child, "alice").unwrap();
        store.create_issue(&grandchild, "alice").unwrap();
        store.add_label("bd-2", "urgent", "alice").unwrap();
        store
            .add_dependency(
                &Dependency {
                    issue_id: "bd-2".into(),
                    depends_on_id: "bd-1".into(),
                    dep_type: DependencyType::ParentChild,
                    created_at: chrono::Utc::now(),
                    created_by: "alice".into(),
                },
                "alice",
            )
            .unwrap();
        store
            .add_dependency(
                &Dependency {
                    issue_id: "bd-3".into(),
                    depends_on_id: "bd-2".into(),
                    dep_type: DependencyType::Blocks,
                    created_at: chrono::Utc::now(),
                    created_by: "alice".into(),
                },
                "alice",
            )
            .unwrap();

        let new_id = allocate_new_id(&store, "bd-2").unwrap();
        relocate_existing(&store, "bd-2", &new_id).unwrap();

        assert!(store.get_issue("bd-2").is_err());
        let relocated = store.get_issue(&new_id).unwrap();
        assert_eq!(relocated.title, "Child");
        assert_eq!(store.get_labels(&new_id).unwrap(), vec!["urgent"]);

        // bd-3 depended on bd-2: must now point at new_id.
        let deps = store.get_dependency_records("bd-3").unwrap();
        assert_eq!(deps[0].depends_on_id, new_id);

        // the relocated issue's own forward edge (to bd-1) survived.
        let forward = store.get_dependency_records(&new_id).unwrap();
        assert_eq!(forward[0].depends_on_id, "bd-1");
    }

    #[test]
    fn rewrite_batch_references_updates_matching_deps() {
        let mut batch = vec![IssueBuilder::new("Sibling").id("bd-5").build()];
        batch[0].dependencies.push(Dependency {
            issue_id: "bd-5".into(),
            depends_on_id: "bd-2".into(),
            dep_type: DependencyType::Blocks,
            created_at: chrono::Utc::now(),
            created_by: "alice".into(),
        });

        rewrite_batch_references(&mut batch, "bd-2", "bd-99");
        assert_eq!(batch[0].dependencies[0].depends_on_id, "bd-99");
    }
}
