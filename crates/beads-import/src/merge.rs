//! Deletion-aware three-way merge over base/left/right log snapshots (§4.5).
//!
//! The log alone can't distinguish "never present" from "deleted by peer".
//! A base snapshot (state after the last successful cross-peer sync) and a
//! left snapshot (state just before the pull) let the merge tell the two
//! apart: if an ID vanished between base and right but was still present in
//! left, a peer deleted it and the deletion should be applied locally.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use beads_core::issue::Issue;
use beads_core::jsonl;

use crate::collision::existing_wins;
use crate::error::Result;

/// Per-identifier outcome of the three-way comparison.
pub enum MergeOutcome {
    /// Present in right only, or left and right agree: take as-is.
    Resolved(Issue),
    /// Peer deleted it (present in base+left, absent in right), or it was
    /// deleted locally and right tried to reintroduce it: stays deleted.
    Delete,
    /// Absent in base but present in both left and right: two peers
    /// independently created the same identifier. Hand to the collision
    /// path rather than resolving here.
    ConcurrentCreate { left: Issue, right: Issue },
    /// Changed on both sides since base with at least one field conflict
    /// that can't be resolved by straight 3-way field comparison. The
    /// deterministic collision scorer picks a whole-record winner.
    FieldConflict { winner: Issue },
}

/// Runs the three-way merge over three id-indexed snapshots.
pub fn merge(
    base: &HashMap<String, Issue>,
    left: &HashMap<String, Issue>,
    right: &HashMap<String, Issue>,
) -> Vec<(String, MergeOutcome)> {
    let ids: HashSet<&String> = base.keys().chain(left.keys()).chain(right.keys()).collect();

    let mut out = Vec::new();
    for id in ids {
        let b = base.get(id);
        let l = left.get(id);
        let r = right.get(id);

        let outcome = if b.is_some() && l.is_some() && r.is_none() {
            // present, present, absent -> deleted by peer.
            MergeOutcome::Delete
        } else if b.is_some() && l.is_none() && r.is_some() {
            // present, absent, present -> deleted locally, stays deleted.
            MergeOutcome::Delete
        } else if b.is_none() && l.is_some() && r.is_some() {
            MergeOutcome::ConcurrentCreate {
                left: l.unwrap().clone(),
                right: r.unwrap().clone(),
            }
        } else if let (Some(base_issue), Some(left_issue), Some(right_issue)) = (b, l, r) {
            resolve_three_way(base_issue, left_issue, right_issue)
        } else if let Some(right_issue) = r {
            MergeOutcome::Resolved(right_issue.clone())
        } else if let Some(left_issue) = l {
            MergeOutcome::Resolved(left_issue.clone())
        } else {
            continue;
        };
        out.push((id.clone(), outcome));
    }
    out
}

fn resolve_three_way(base: &Issue, left: &Issue, right: &Issue) -> MergeOutcome {
    use beads_core::content_hash::compute_content_hash;

    if compute_content_hash(left) == compute_content_hash(right) {
        return MergeOutcome::Resolved(left.clone());
    }

    let mut merged = left.clone();
    let mut conflict = false;

    macro_rules! field {
        ($name:ident) => {
            match merge_field(&base.$name, &left.$name, &right.$name) {
                Some(v) => merged.$name = v,
                None => conflict = true,
            }
        };
    }
    field!(title);
    field!(description);
    field!(design);
    field!(acceptance_criteria);
    field!(notes);
    field!(status);
    field!(priority);
    field!(issue_type);
    field!(assignee);
    field!(estimated_minutes);
    field!(external_ref);

    if !conflict {
        merged.updated_at = left.updated_at.max(right.updated_at);
        return MergeOutcome::Resolved(merged);
    }

    let winner = if existing_wins(left, right) {
        left.clone()
    } else {
        right.clone()
    };
    MergeOutcome::FieldConflict { winner }
}

fn merge_field<T: Clone + PartialEq>(base: &T, left: &T, right: &T) -> Option<T> {
    if left == right {
        Some(left.clone())
    } else if left == base {
        Some(right.clone())
    } else if right == base {
        Some(left.clone())
    } else {
        None
    }
}

/// Reads a snapshot file (`.merge-base` / `.merge-left`) into an id-indexed
/// map. A missing file is treated as an empty snapshot (nothing has ever
/// been synced).
pub fn read_snapshot(path: &Path) -> Result<HashMap<String, Issue>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut map = HashMap::new();
    for issue in jsonl::read_jsonl(reader) {
        let issue = issue?;
        map.insert(issue.id.clone(), issue);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    fn snap(issues: Vec<Issue>) -> HashMap<String, Issue> {
        issues.into_iter().map(|i| (i.id.clone(), i)).collect()
    }

    #[test]
    fn peer_deletion_is_applied_locally() {
        let issue = IssueBuilder::new("Gone").id("bd-1").build();
        let base = snap(vec![issue.clone()]);
        let left = snap(vec![issue]);
        let right = snap(vec![]);

        let result = merge(&base, &left, &right);
        assert_eq!(result.len(), 1);
        assert!(matches!(result[0].1, MergeOutcome::Delete));
    }

    #[test]
    fn local_deletion_is_kept() {
        let issue = IssueBuilder::new("Gone locally").id("bd-1").build();
        let base = snap(vec![issue.clone()]);
        let left = snap(vec![]);
        let right = snap(vec![issue]);

        let result = merge(&base, &left, &right);
        assert!(matches!(result[0].1, MergeOutcome::Delete));
    }

    #[test]
    fn concurrent_create_needs_collision_path() {
        let left_issue = IssueBuilder::new("Mine").id("bd-1").build();
        let right_issue = IssueBuilder::new("Theirs").id("bd-1").build();
        let base = snap(vec![]);
        let left = snap(vec![left_issue]);
        let right = snap(vec![right_issue]);

        let result = merge(&base, &left, &right);
        assert!(matches!(result[0].1, MergeOutcome::ConcurrentCreate { .. }));
    }

    #[test]
    fn non_conflicting_field_changes_merge_cleanly() {
        let base = IssueBuilder::new("Title").id("bd-1").build();
        let mut left_issue = base.clone();
        left_issue.description = "left added this".to_string();
        let mut right_issue = base.clone();
        right_issue.priority = 1;

        let result = merge(&snap(vec![base]), &snap(vec![left_issue]), &snap(vec![right_issue]));
        match &result[0].1 {
            MergeOutcome::Resolved(merged) => {
                assert_eq!(merged.description, "left added this");
                assert_eq!(merged.priority, 1);
            }
            _ => panic!("expected clean field-level merge"),
        }
    }

    #[test]
    fn same_field_changed_both_sides_is_a_conflict() {
        let base = IssueBuilder::new("Title").id("bd-1").build();
        let mut left_issue = base.clone();
        left_issue.title = "Left's title".to_string();
        left_issue.updated_at = chrono::Utc::now();
        let mut right_issue = base.clone();
        right_issue.title = "Right's title".to_string();
        right_issue.updated_at = chrono::Utc::now() + chrono::Duration::seconds(60);

        let result = merge(&snap(vec![base]), &snap(vec![left_issue]), &snap(vec![right_issue]));
        match &result[0].1 {
            MergeOutcome::FieldConflict { winner } => assert_eq!(winner.title, "Right's title"),
            _ => panic!("expected a field conflict"),
        }
    }
}
