//! Size-stability tracking
//!
//! The tracker holds every file seen by the watcher together with its last
//! observed size and the instant that size last changed. The stability sweep
//! re-stats each tracked file and classifies it stable once the size has
//! held still for the configured window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

/// Per-file tracking state.
#[derive(Debug, Clone)]
pub struct TrackedFile {
    /// Most recently observed size in bytes.
    pub size: u64,
    /// When the size last changed.
    pub last_change: Instant,
}

/// Table of files being watched for stability.
///
/// A file leaves the table one of three ways: it is emitted as stable, it
/// vanishes from disk, or the watcher reports it removed.
#[derive(Debug, Default)]
pub struct FileTracker {
    files: HashMap<PathBuf, TrackedFile>,
}

impl FileTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observation of `path` at `size`.
    ///
    /// A changed size resets the stability clock; an unchanged size still
    /// refreshes it, because a write event without a size change means the
    /// producer is touching the file and it is not yet finished.
    pub fn observe(&mut self, path: PathBuf, size: u64, now: Instant) {
        debug!(path = %path.display(), size, "Tracking file");
        self.files.insert(
            path,
            TrackedFile {
                size,
                last_change: now,
            },
        );
    }

    /// Drops a file from tracking.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.files.remove(path).is_some()
    }

    /// Sweeps the table and returns files that became stable.
    ///
    /// For each tracked file: gone from disk → dropped; size differs from
    /// the recorded one → both fields refreshed; unchanged for at least
    /// `stability` → removed from the table and returned with its size.
    pub fn sweep(&mut self, stability: Duration, now: Instant) -> Vec<(PathBuf, u64)> {
        let mut stable = Vec::new();
        let mut vanished = Vec::new();
        let mut grown: Vec<(PathBuf, u64)> = Vec::new();

        for (path, tracked) in &self.files {
            let current_size = match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => {
                    vanished.push(path.clone());
                    continue;
                }
            };

            if current_size != tracked.size {
                grown.push((path.clone(), current_size));
            } else if now.duration_since(tracked.last_change) >= stability {
                stable.push((path.clone(), current_size));
            }
        }

        for path in vanished {
            debug!(path = %path.display(), "Tracked file vanished");
            self.files.remove(&path);
        }
        for (path, size) in grown {
            self.observe(path, size, now);
        }
        for (path, _) in &stable {
            self.files.remove(path);
        }

        stable
    }

    /// Number of files currently tracked.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths currently tracked (diagnostics).
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, len: usize) -> PathBuf {
        let p = dir.path().join(name);
        fs::write(&p, vec![b'x'; len]).unwrap();
        p
    }

    #[test]
    fn stable_file_is_emitted_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir, "a.log", 100);
        let mut tracker = FileTracker::new();
        let t0 = Instant::now();

        tracker.observe(file.clone(), 100, t0);

        // Not yet past the stability window.
        let early = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(1));
        assert!(early.is_empty());
        assert_eq!(tracker.len(), 1);

        let stable = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(2));
        assert_eq!(stable, vec![(file, 100)]);
        assert!(tracker.is_empty());

        // A second sweep finds nothing: the file left the table.
        let again = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(10));
        assert!(again.is_empty());
    }

    #[test]
    fn size_change_resets_stability_clock() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir, "b.log", 10);
        let mut tracker = FileTracker::new();
        let t0 = Instant::now();

        tracker.observe(file.clone(), 10, t0);

        // File grows before the first sweep.
        fs::write(&file, vec![b'x'; 100]).unwrap();
        let mid = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(1));
        assert!(mid.is_empty(), "growing file must not be stable");

        // One second after the growth was observed: still not stable.
        let early = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(2));
        assert!(early.is_empty());

        // Two seconds after the growth observation: stable at the new size.
        let stable = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(3));
        assert_eq!(stable, vec![(file, 100)]);
    }

    #[test]
    fn vanished_file_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir, "c.log", 10);
        let mut tracker = FileTracker::new();
        let t0 = Instant::now();

        tracker.observe(file.clone(), 10, t0);
        fs::remove_file(&file).unwrap();

        let stable = tracker.sweep(Duration::from_secs(0), t0 + Duration::from_secs(5));
        assert!(stable.is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn re_observation_refreshes_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir, "d.log", 10);
        let mut tracker = FileTracker::new();
        let t0 = Instant::now();

        tracker.observe(file.clone(), 10, t0);
        // Producer touches the file again one second later, same size.
        tracker.observe(file.clone(), 10, t0 + Duration::from_secs(1));

        let early = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(2));
        assert!(early.is_empty(), "stability clock restarted at t0+1");

        let stable = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(3));
        assert_eq!(stable.len(), 1);
    }

    #[test]
    fn explicit_remove() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(&dir, "e.log", 10);
        let mut tracker = FileTracker::new();

        tracker.observe(file.clone(), 10, Instant::now());
        assert!(tracker.remove(&file));
        assert!(!tracker.remove(&file));
        assert!(tracker.is_empty());
    }

    #[test]
    fn multiple_files_tracked_independently() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(&dir, "a.log", 1);
        let b = write(&dir, "b.log", 2);
        let mut tracker = FileTracker::new();
        let t0 = Instant::now();

        tracker.observe(a.clone(), 1, t0);
        tracker.observe(b.clone(), 2, t0 + Duration::from_secs(1));

        let first = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(2));
        assert_eq!(first, vec![(a, 1)]);
        assert_eq!(tracker.len(), 1);

        let second = tracker.sweep(Duration::from_secs(2), t0 + Duration::from_secs(3));
        assert_eq!(second, vec![(b, 2)]);
    }
}
