//! Collision detection and deterministic scoring (§4.4).

use beads_core::content_hash::compute_content_hash;
use beads_core::issue::Issue;
use beads_storage::Storage;

use crate::error::Result;

/// Outcome of comparing one incoming issue against the store.
pub enum Classification {
    /// No existing issue at this ID.
    New(Issue),
    /// Existing issue has identical body fields and `updated_at` -- nothing
    /// to do.
    Exact(Issue),
    /// Both an incoming and an existing issue claim the same ID with
    /// differing content.
    Collision(Collision),
}

/// A same-ID conflict between an incoming record and the issue already in
/// the store.
pub struct Collision {
    pub id: String,
    pub incoming: Issue,
    pub existing: Issue,
    /// Names of the fields that differ, for user-facing reports.
    pub conflicting_fields: Vec<String>,
}

/// Fetches the same-ID issue (if any) and classifies `incoming` against it.
pub fn classify(storage: &dyn Storage, incoming: Issue) -> Result<Classification> {
    let existing = match storage.get_issue(&incoming.id) {
        Ok(issue) => issue,
        Err(e) if e.is_not_found() => return Ok(Classification::New(incoming)),
        Err(e) => return Err(e.into()),
    };

    if compute_content_hash(&incoming) == compute_content_hash(&existing)
        && incoming.updated_at == existing.updated_at
    {
        return Ok(Classification::Exact(incoming));
    }

    let conflicting_fields = diff_fields(&existing, &incoming);
    Ok(Classification::Collision(Collision {
        id: incoming.id.clone(),
        incoming,
        existing,
        conflicting_fields,
    }))
}

/// Returns the names of body fields that differ between two same-ID issues.
fn diff_fields(existing: &Issue, incoming: &Issue) -> Vec<String> {
    let mut fields = Vec::new();
    macro_rules! check {
        ($name:literal, $field:ident) => {
            if existing.$field != incoming.$field {
                fields.push($name.to_string());
            }
        };
    }
    check!("title", title);
    check!("description", description);
    check!("design", design);
    check!("acceptance_criteria", acceptance_criteria);
    check!("notes", notes);
    check!("status", status);
    check!("priority", priority);
    check!("issue_type", issue_type);
    check!("assignee", assignee);
    check!("estimated_minutes", estimated_minutes);
    check!("external_ref", external_ref);
    check!("updated_at", updated_at);
    fields
}

/// Returns `true` if `existing` wins the collision and keeps the original
/// ID. Ties are broken deterministically so the outcome is reproducible
/// given the same two records regardless of which host evaluates it:
/// higher `updated_at`, then more non-empty fields set, then longer combined
/// body text, then lexicographically smaller `created_by`.
pub fn existing_wins(existing: &Issue, incoming: &Issue) -> bool {
    score(existing, incoming) != std::cmp::Ordering::Less
}

fn score(existing: &Issue, incoming: &Issue) -> std::cmp::Ordering {
    existing
        .updated_at
        .cmp(&incoming.updated_at)
        .then_with(|| non_empty_field_count(existing).cmp(&non_empty_field_count(incoming)))
        .then_with(|| body_length(existing).cmp(&body_length(incoming)))
        .then_with(|| incoming.created_by.cmp(&existing.created_by))
}

fn non_empty_field_count(issue: &Issue) -> usize {
    let mut n = 0;
    if !issue.description.is_empty() {
        n += 1;
    }
    if !issue.design.is_empty() {
        n += 1;
    }
    if !issue.acceptance_criteria.is_empty() {
        n += 1;
    }
    if !issue.notes.is_empty() {
        n += 1;
    }
    if !issue.assignee.is_empty() {
        n += 1;
    }
    if issue.external_ref.is_some() {
        n += 1;
    }
    if issue.estimated_minutes.is_some() {
        n += 1;
    }
    n
}

fn body_length(issue: &Issue) -> usize {
    issue.title.len()
        + issue.description.len()
        + issue.design.len()
        + issue.acceptance_criteria.len()
        + issue.notes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    #[test]
    fn classify_new_when_no_existing_issue() {
        let store = SqliteStore::open_in_memory().unwrap();
        let incoming = IssueBuilder::new("New").id("bd-1").build();
        match classify(&store, incoming).unwrap() {
            Classification::New(_) => {}
            _ => panic!("expected New"),
        }
    }

    #[test]
    fn classify_exact_when_content_and_timestamp_match() {
        let store = SqliteStore::open_in_memory().unwrap();
        let issue = IssueBuilder::new("Same").id("bd-1").build();
        store.create_issue(&issue, "alice").unwrap();
        let existing = store.get_issue("bd-1").unwrap();

        match classify(&store, existing).unwrap() {
            Classification::Exact(_) => {}
            other => panic!("expected Exact, got collision/new: {}", matches_name(&other)),
        }
    }

    #[test]
    fn classify_collision_when_content_differs() {
        let store = SqliteStore::open_in_memory().unwrap();
        let issue = IssueBuilder::new("Original").id("bd-1").build();
        store.create_issue(&issue, "alice").unwrap();

        let mut incoming = store.get_issue("bd-1").unwrap();
        incoming.title = "Edited elsewhere".to_string();
        incoming.updated_at = chrono::Utc::now() + chrono::Duration::seconds(10);

        match classify(&store, incoming).unwrap() {
            Classification::Collision(c) => assert!(c.conflicting_fields.contains(&"title".to_string())),
            _ => panic!("expected Collision"),
        }
    }

    #[test]
    fn higher_updated_at_wins() {
        let older = IssueBuilder::new("A")
            .updated_at(chrono::DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc))
            .build();
        let newer = IssueBuilder::new("A")
            .updated_at(chrono::DateTime::parse_from_rfc3339("2020-06-01T00:00:00Z").unwrap().with_timezone(&chrono::Utc))
            .build();
        assert!(!existing_wins(&older, &newer));
        assert!(existing_wins(&newer, &older));
    }

    #[test]
    fn tiebreak_falls_through_to_created_by() {
        let t = chrono::Utc::now();
        let existing = IssueBuilder::new("A").updated_at(t).created_by("bob").build();
        let incoming = IssueBuilder::new("A").updated_at(t).created_by("alice").build();
        // Equal timestamps and field counts -> smaller created_by wins.
        assert!(!existing_wins(&existing, &incoming));
    }

    fn matches_name(c: &Classification) -> &'static str {
        match c {
            Classification::New(_) => "New",
            Classification::Exact(_) => "Exact",
            Classification::Collision(_) => "Collision",
        }
    }
}
