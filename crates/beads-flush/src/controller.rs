//! Debounced auto-flush controller.
//!
//! Process-wide auto-flush state (dirty flag, timer, failure counter) is
//! encapsulated in a single object guarded by one mutex, with an
//! `init`/`close` lifecycle, per the "global mutable state" design note:
//! mutations arrive from many call sites (every write-capable command and
//! IPC handler), so there is exactly one owner for the debounce timer
//! rather than one per caller.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use beads_storage::Storage;
use tracing::{info, warn};

use crate::error::Result;
use crate::export::{content_hash, full_export, incremental_export, write_log_atomic};

const POLL_QUANTUM: Duration = Duration::from_millis(250);
const FAILURE_WARNING_THRESHOLD: u32 = 3;

struct State {
    active: bool,
    dirty: bool,
    last_write: Option<Instant>,
    needs_full_export: bool,
    failure_count: u32,
}

/// Owns the debounced export timer for one store + log pair.
pub struct FlushController {
    storage: Arc<dyn Storage>,
    log_path: PathBuf,
    debounce: Duration,
    state: Mutex<State>,
}

impl FlushController {
    /// Creates the controller and starts its background timer thread.
    ///
    /// The thread polls at a fraction of the debounce window and exits once
    /// [`FlushController::close`] marks the controller inactive, so it never
    /// touches a closed store.
    pub fn init(storage: Arc<dyn Storage>, log_path: PathBuf, debounce: Duration) -> Arc<Self> {
        let controller = Arc::new(Self {
            storage,
            log_path,
            debounce,
            state: Mutex::new(State {
                active: true,
                dirty: false,
                last_write: None,
                needs_full_export: false,
                failure_count: 0,
            }),
        });

        let weak = Arc::downgrade(&controller);
        thread::spawn(move || loop {
            thread::sleep(POLL_QUANTUM);
            let Some(controller) = weak.upgrade() else {
                return;
            };
            if !controller.is_active() {
                return;
            }
            controller.tick();
        });

        controller
    }

    fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    /// Arms the debounced flush after an incremental-safe write. Resets the
    /// debounce window (the timer fires D seconds after the *last* write,
    /// not the first).
    pub fn arm(&self) {
        self.arm_inner(false);
    }

    /// Arms the debounced flush and requests a full (non-incremental) export
    /// on the next trigger, for ID-changing operations such as renumber or
    /// collision remap.
    pub fn arm_full(&self) {
        self.arm_inner(true);
    }

    fn arm_inner(&self, full: bool) {
        let mut state = self.state.lock().unwrap();
        state.dirty = true;
        state.last_write = Some(Instant::now());
        state.needs_full_export |= full;
    }

    fn tick(&self) {
        let due = {
            let state = self.state.lock().unwrap();
            state.dirty
                && state
                    .last_write
                    .map(|t| t.elapsed() >= self.debounce)
                    .unwrap_or(false)
        };
        if due {
            if let Err(e) = self.flush() {
                warn!(error = %e, "auto-flush failed");
            }
        }
    }

    /// Flushes the dirty subset to the log immediately, bypassing the
    /// debounce window. Used by the command-exit path and by `close`.
    pub fn flush(&self) -> Result<()> {
        let full = {
            let mut state = self.state.lock().unwrap();
            if !state.dirty {
                return Ok(());
            }
            let full = state.needs_full_export;
            state.dirty = false;
            state.needs_full_export = false;
            full
        };

        let result = if full {
            self.flush_full()
        } else {
            self.flush_incremental()
        };

        match result {
            Ok(()) => {
                self.state.lock().unwrap().failure_count = 0;
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.lock().unwrap();
                state.failure_count += 1;
                // Re-arm so the next debounce window retries.
                state.dirty = true;
                if state.failure_count >= FAILURE_WARNING_THRESHOLD {
                    warn!(
                        failures = state.failure_count,
                        "auto-flush has failed {} times in a row; export manually with `bd export`",
                        state.failure_count
                    );
                }
                Err(e)
            }
        }
    }

    fn flush_incremental(&self) -> Result<()> {
        let dirty_ids = self.storage.get_dirty()?;
        if dirty_ids.is_empty() {
            return Ok(());
        }
        let issues = incremental_export(self.storage.as_ref(), &self.log_path, &dirty_ids)?;
        write_log_atomic(&self.log_path, &issues)?;
        for id in &dirty_ids {
            self.storage.clear_dirty_by_id(id)?;
        }
        self.update_watermark()?;
        info!(count = dirty_ids.len(), "incremental export complete");
        Ok(())
    }

    fn flush_full(&self) -> Result<()> {
        let issues = full_export(self.storage.as_ref())?;
        write_log_atomic(&self.log_path, &issues)?;
        for id in self.storage.get_dirty()? {
            self.storage.clear_dirty_by_id(&id)?;
        }
        self.update_watermark()?;
        info!(count = issues.len(), "full export complete");
        Ok(())
    }

    fn update_watermark(&self) -> Result<()> {
        let hash = content_hash(&self.log_path)?;
        self.storage.set_metadata("last_import_hash", &hash)?;
        Ok(())
    }

    /// Cancels the timer and flushes synchronously. Idempotent.
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if !state.active {
                return Ok(());
            }
            state.active = false;
        }
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn controller_with_store() -> (Arc<FlushController>, Arc<SqliteStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let log_path = dir.path().join("issues.jsonl");
        let controller = FlushController::init(
            store.clone(),
            log_path,
            Duration::from_secs(3600), // long enough that the background timer never fires during the test
        );
        (controller, store, dir)
    }

    #[test]
    fn flush_writes_armed_dirty_issue() {
        let (controller, store, dir) = controller_with_store();
        let issue = IssueBuilder::new("A").id("bd-1").build();
        store.create_issue(&issue, "alice").unwrap();
        controller.arm();

        controller.flush().unwrap();

        let log_path = dir.path().join("issues.jsonl");
        let contents = std::fs::read_to_string(log_path).unwrap();
        assert!(contents.contains("bd-1"));
        assert!(store.get_dirty().unwrap().is_empty());
    }

    #[test]
    fn flush_without_arm_is_noop() {
        let (controller, _store, dir) = controller_with_store();
        controller.flush().unwrap();
        assert!(!dir.path().join("issues.jsonl").exists());
    }

    #[test]
    fn close_flushes_and_is_idempotent() {
        let (controller, store, dir) = controller_with_store();
        let issue = IssueBuilder::new("A").id("bd-1").build();
        store.create_issue(&issue, "alice").unwrap();
        controller.arm();

        controller.close().unwrap();
        assert!(dir.path().join("issues.jsonl").exists());

        // Second close is a no-op, not an error.
        controller.close().unwrap();
    }

    #[test]
    fn watermark_updated_after_flush() {
        let (controller, store, _dir) = controller_with_store();
        let issue = IssueBuilder::new("A").id("bd-1").build();
        store.create_issue(&issue, "alice").unwrap();
        controller.arm();
        controller.flush().unwrap();

        let hash = store.get_metadata("last_import_hash").unwrap();
        assert_eq!(hash.len(), 64); // SHA-256 hex digest
    }
}
