//! Persistent upload queue
//!
//! A durable FIFO-by-detection-time of files waiting to be uploaded. The
//! queue is held in memory and mirrored to a JSON array on every mutation;
//! the volumes involved (tens of entries) make the rewrite cost irrelevant
//! next to the durability it buys on a vehicle that can lose power any time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fleetlog_core::domain::units::{bytes_to_gb, bytes_to_mb};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::persist::{load_json, save_json, Loaded};

/// One pending upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Absolute path of the file.
    pub filepath: PathBuf,
    /// Byte size observed at detection.
    pub size: u64,
    /// When the file was detected as stable.
    pub detected_at: DateTime<Utc>,
    /// Transient-failure count so far.
    pub attempts: u32,
}

/// Durable upload queue, persisted as a JSON array.
#[derive(Debug)]
pub struct UploadQueue {
    path: PathBuf,
    entries: Vec<QueueEntry>,
}

impl UploadQueue {
    /// Opens (or creates) the queue at `path`.
    ///
    /// Loads existing state with backup recovery, prunes entries whose files
    /// no longer exist, and persists the result if anything changed.
    pub fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(dir = %parent.display(), error = %e, "Cannot create queue directory");
            }
        }

        let loaded: Loaded<Vec<QueueEntry>> = load_json(path);
        let recovered = loaded.recovered();
        let mut queue = Self {
            path: path.to_path_buf(),
            entries: loaded.into_value(Vec::new()),
        };

        if recovered {
            queue.save();
        }
        queue.prune_missing();

        info!(
            pending = queue.entries.len(),
            "Queue opened ({:.2} GB pending)",
            bytes_to_gb(queue.total_bytes())
        );
        queue
    }

    /// Adds a file to the queue.
    ///
    /// No-op when the path is already queued or cannot be statted. Returns
    /// whether an entry was added.
    pub fn add(&mut self, filepath: &Path) -> bool {
        if self.entries.iter().any(|e| e.filepath == filepath) {
            debug!(path = %filepath.display(), "File already queued");
            return false;
        }

        let size = match std::fs::metadata(filepath) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %filepath.display(), error = %e, "Cannot stat file, not queueing");
                return false;
            }
        };

        self.entries.push(QueueEntry {
            filepath: filepath.to_path_buf(),
            size,
            detected_at: Utc::now(),
            attempts: 0,
        });
        info!(
            path = %filepath.display(),
            "Queued for upload ({:.1} MB)",
            bytes_to_mb(size)
        );
        self.save();
        true
    }

    /// Returns up to `max` paths, newest detection first.
    ///
    /// Freshest data is prioritized: on an intermittent link the oldest
    /// entries are the most likely to already be obsolete.
    pub fn next_batch(&self, max: usize) -> Vec<PathBuf> {
        let mut sorted: Vec<&QueueEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        sorted
            .into_iter()
            .take(max)
            .map(|e| e.filepath.clone())
            .collect()
    }

    /// Removes a successfully uploaded file.
    pub fn mark_uploaded(&mut self, filepath: &Path) {
        if self.remove_entry(filepath) {
            info!(path = %filepath.display(), "Removed from queue after upload");
            self.save();
        }
    }

    /// Increments the attempt counter after a transient failure.
    pub fn mark_failed(&mut self, filepath: &Path) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.filepath == filepath) {
            entry.attempts += 1;
            warn!(
                path = %filepath.display(),
                attempts = entry.attempts,
                "Upload failed, keeping in queue"
            );
        }
        self.save();
    }

    /// Removes a file that failed permanently. It will not be retried.
    pub fn mark_permanent_failure(&mut self, filepath: &Path, reason: &str) {
        if self.remove_entry(filepath) {
            error!(
                path = %filepath.display(),
                reason,
                "Permanent upload failure, removed from queue; manual intervention \
                 required if this file is still needed"
            );
            self.save();
        } else {
            debug!(path = %filepath.display(), "File not in queue (already removed)");
        }
    }

    /// Removes an entry without the upload/failure logging; used when the
    /// file is deleted from disk by the custodian.
    pub fn remove(&mut self, filepath: &Path) -> bool {
        if self.remove_entry(filepath) {
            debug!(path = %filepath.display(), "Dropped queue entry for deleted file");
            self.save();
            true
        } else {
            false
        }
    }

    /// Number of queued files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total bytes across all queued files.
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// True when `filepath` is queued.
    pub fn contains(&self, filepath: &Path) -> bool {
        self.entries.iter().any(|e| e.filepath == filepath)
    }

    /// Attempt count for a queued path, if present.
    pub fn attempts(&self, filepath: &Path) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.filepath == filepath)
            .map(|e| e.attempts)
    }

    /// Persists the queue. Failures are logged, never propagated: losing a
    /// save must not take down the upload path.
    pub fn save(&self) {
        if let Err(e) = save_json(&self.path, &self.entries) {
            error!(path = %self.path.display(), error = %e, "Failed to save queue");
        }
    }

    fn remove_entry(&mut self, filepath: &Path) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.filepath != filepath);
        self.entries.len() != before
    }

    fn prune_missing(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|e| e.filepath.exists());
        let removed = before - self.entries.len();
        if removed > 0 {
            warn!(removed, "Pruned queue entries for missing files");
            self.save();
        }
    }
}
