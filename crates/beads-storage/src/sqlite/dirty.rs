//! Dirty-set tracking for the auto-flush pipeline.
//!
//! Every write path that changes an issue's on-disk representation marks the
//! issue dirty. The flush controller drains the dirty set on each debounced
//! export and clears entries once written out.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::sqlite::store::SqliteStore;

// ---------------------------------------------------------------------------
// Connection-level helpers (shared with Transaction)
// ---------------------------------------------------------------------------

pub(crate) fn mark_dirty_on_conn(conn: &Connection, issue_id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO dirty (issue_id) VALUES (?1)",
        params![issue_id],
    )?;
    Ok(())
}

pub(crate) fn get_dirty_on_conn(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT issue_id FROM dirty ORDER BY issue_id")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut ids = Vec::new();
    for row in rows {
        ids.push(row?);
    }
    Ok(ids)
}

pub(crate) fn clear_dirty_by_id_on_conn(conn: &Connection, issue_id: &str) -> Result<()> {
    conn.execute("DELETE FROM dirty WHERE issue_id = ?1", params![issue_id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Returns all issue IDs currently marked dirty, in ID order.
    pub fn get_dirty_impl(&self) -> Result<Vec<String>> {
        let conn = self.lock_conn()?;
        get_dirty_on_conn(&conn)
    }

    /// Clears the dirty flag for a single issue, after it has been exported.
    pub fn clear_dirty_by_id_impl(&self, issue_id: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        clear_dirty_by_id_on_conn(&conn, issue_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_marks_dirty() {
        let store = test_store();
        let issue = IssueBuilder::new("Dirty one").id("bd-dirty1").build();
        store.create_issue_impl(&issue, "alice").unwrap();

        let dirty = store.get_dirty_impl().unwrap();
        assert_eq!(dirty, vec!["bd-dirty1"]);
    }

    #[test]
    fn clear_dirty_removes_entry() {
        let store = test_store();
        let issue = IssueBuilder::new("Issue").id("bd-dirty2").build();
        store.create_issue_impl(&issue, "alice").unwrap();

        store.clear_dirty_by_id_impl("bd-dirty2").unwrap();
        assert!(store.get_dirty_impl().unwrap().is_empty());
    }

    #[test]
    fn update_remarks_dirty_after_clear() {
        use crate::traits::IssueUpdates;

        let store = test_store();
        let issue = IssueBuilder::new("Issue").id("bd-dirty3").build();
        store.create_issue_impl(&issue, "alice").unwrap();
        store.clear_dirty_by_id_impl("bd-dirty3").unwrap();

        store
            .update_issue_impl(
                "bd-dirty3",
                &IssueUpdates {
                    title: Some("Updated".into()),
                    ..Default::default()
                },
                "alice",
            )
            .unwrap();

        assert_eq!(store.get_dirty_impl().unwrap(), vec!["bd-dirty3"]);
    }
}
