//! Per-prefix ID counters for [`SqliteStore`].
//!
//! Each issue prefix (`bd`, `proj`, ...) has a monotonically increasing
//! counter. `next_id` claims the next value transactionally; `sync_all_counters`
//! rescans existing issue IDs to recover a counter after an import that
//! brought in IDs the local counter doesn't know about yet.

use rusqlite::{params, Connection};

use beads_core::idgen::parse_id;

use crate::error::Result;
use crate::sqlite::store::SqliteStore;

// ---------------------------------------------------------------------------
// Connection-level helpers (shared with Transaction)
// ---------------------------------------------------------------------------

pub(crate) fn next_id_on_conn(conn: &Connection, prefix: &str) -> Result<u64> {
    conn.execute(
        "INSERT INTO counters (prefix, next) VALUES (?1, 2)
         ON CONFLICT(prefix) DO UPDATE SET next = next + 1",
        params![prefix],
    )?;
    let claimed: i64 = conn.query_row(
        "SELECT next - 1 FROM counters WHERE prefix = ?1",
        params![prefix],
        |row| row.get(0),
    )?;
    Ok(claimed as u64)
}

pub(crate) fn sync_all_counters_on_conn(conn: &Connection, prefix: &str) -> Result<()> {
    let mut stmt = conn.prepare("SELECT id FROM issues WHERE id LIKE ?1")?;
    let like_pattern = format!("{prefix}-%");
    let rows = stmt.query_map(params![like_pattern], |row| row.get::<_, String>(0))?;

    let mut max_n: u64 = 0;
    for row in rows {
        let id = row?;
        if let Some((p, n)) = parse_id(&id) {
            if p == prefix && n > max_n {
                max_n = n;
            }
        }
    }

    conn.execute(
        "INSERT INTO counters (prefix, next) VALUES (?1, ?2)
         ON CONFLICT(prefix) DO UPDATE SET next = MAX(next, ?2)",
        params![prefix, (max_n + 1) as i64],
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Claims and returns the next integer for `prefix`, starting at 1.
    pub fn next_id_impl(&self, prefix: &str) -> Result<u64> {
        let conn = self.lock_conn()?;
        next_id_on_conn(&conn, prefix)
    }

    /// Rescans issues with the given prefix and advances its counter past the
    /// highest ID seen, so that subsequently claimed IDs never collide with
    /// IDs that arrived via import rather than `next_id`.
    pub fn sync_all_counters_impl(&self, prefix: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        sync_all_counters_on_conn(&conn, prefix)
    }
}
