//! File watcher: native OS notification with a polling fallback (§4.7).
//!
//! Watches one target path (the export log) plus the VCS ref directory, so a
//! branch update triggers reimport even when the log file's own mtime
//! doesn't move. Events are debounced: a burst of writes in quick succession
//! collapses to one `on_change` call fired after the debounce window closes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::warn;

/// Default debounce window when the caller doesn't override it.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);
/// Polling fallback interval used when native notification setup fails.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A running watcher. Dropping or calling [`FileWatcher::close`] stops the
/// background thread; `close` is idempotent.
pub struct FileWatcher {
    closed: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Watches `target` and `vcs_ref_dir`, calling `on_change` (from the
    /// watcher's background thread) no more than once per debounce window.
    pub fn watch(
        target: PathBuf,
        vcs_ref_dir: PathBuf,
        debounce: Duration,
        on_change: impl Fn() + Send + 'static,
    ) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let closed_for_thread = Arc::clone(&closed);

        let handle = thread::spawn(move || {
            if run_native(&target, &vcs_ref_dir, debounce, &on_change, &closed_for_thread).is_err() {
                warn!("native file watching unavailable, falling back to polling");
                run_polling(&target, &vcs_ref_dir, debounce, &on_change, &closed_for_thread);
            }
        });

        Self { closed, handle: Some(handle) }
    }

    /// Stops the watcher. Safe to call more than once.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_native(
    target: &Path,
    vcs_ref_dir: &Path,
    debounce: Duration,
    on_change: &(impl Fn() + Send + 'static),
    closed: &AtomicBool,
) -> notify::Result<()> {
    let (tx, rx) = channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(tx, Config::default())?;

    watch_path_or_parent(&mut watcher, target)?;
    watch_path_or_parent(&mut watcher, vcs_ref_dir)?;

    let mut pending_since: Option<Instant> = None;
    while !closed.load(Ordering::SeqCst) {
        let wait = debounce.min(Duration::from_millis(100));
        match rx.recv_timeout(wait) {
            Ok(Ok(_event)) => {
                pending_since.get_or_insert_with(Instant::now);
                let _ = watch_path_or_parent(&mut watcher, target);
                let _ = watch_path_or_parent(&mut watcher, vcs_ref_dir);
            }
            Ok(Err(e)) => warn!(error = %e, "watch error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(since) = pending_since {
            if since.elapsed() >= debounce {
                on_change();
                pending_since = None;
            }
        }
    }
    Ok(())
}

/// `notify` requires the watched path to exist. If `path` itself doesn't
/// (the log hasn't been created yet), watch its parent directory instead so
/// a create event still arrives; re-armed on the next call once it exists.
fn watch_path_or_parent(watcher: &mut RecommendedWatcher, path: &Path) -> notify::Result<()> {
    if path.exists() {
        watcher.watch(path, RecursiveMode::NonRecursive)
    } else if let Some(parent) = path.parent() {
        watcher.watch(parent, RecursiveMode::NonRecursive)
    } else {
        Ok(())
    }
}

fn run_polling(
    target: &Path,
    vcs_ref_dir: &Path,
    debounce: Duration,
    on_change: &(impl Fn() + Send + 'static),
    closed: &AtomicBool,
) {
    let mut last = snapshot(target, vcs_ref_dir);
    while !closed.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL.min(debounce));
        let current = snapshot(target, vcs_ref_dir);
        if current != last {
            last = current;
            thread::sleep(debounce);
            on_change();
        }
    }
}

/// Cheap change fingerprint: modified time and length of each watched path,
/// `None` when the path doesn't exist (covers delete-then-recreate).
fn snapshot(target: &Path, vcs_ref_dir: &Path) -> (Option<(std::time::SystemTime, u64)>, Option<(std::time::SystemTime, u64)>) {
    (stat(target), stat(vcs_ref_dir))
}

fn stat(path: &Path) -> Option<(std::time::SystemTime, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn polling_fallback_fires_on_content_change() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("issues.jsonl");
        let ref_dir = dir.path().join("refs");
        std::fs::create_dir_all(&ref_dir).unwrap();
        std::fs::write(&target, "a").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count_for_closure = Arc::clone(&count);
        let closed = Arc::new(AtomicBool::new(false));
        let closed_for_thread = Arc::clone(&closed);

        let target_clone = target.clone();
        let ref_dir_clone = ref_dir.clone();
        let handle = thread::spawn(move || {
            run_polling(
                &target_clone,
                &ref_dir_clone,
                Duration::from_millis(10),
                &move || {
                    count_for_closure.fetch_add(1, Ordering::SeqCst);
                },
                &closed_for_thread,
            );
        });

        thread::sleep(Duration::from_millis(150));
        std::fs::write(&target, "ab").unwrap();
        thread::sleep(Duration::from_millis(300));

        closed.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn snapshot_differs_after_removal_and_recreation() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("issues.jsonl");
        let ref_dir = dir.path().join("refs");
        std::fs::create_dir_all(&ref_dir).unwrap();
        std::fs::write(&target, "a").unwrap();

        let before = snapshot(&target, &ref_dir);
        std::fs::remove_file(&target).unwrap();
        let during = snapshot(&target, &ref_dir);
        assert_ne!(before, during);
        assert!(during.0.is_none());

        std::fs::write(&target, "a").unwrap();
        std::thread::sleep(Duration::from_millis(10));
        std::fs::write(&target, "ab").unwrap();
        let after = snapshot(&target, &ref_dir);
        assert_ne!(during, after);
    }
}
