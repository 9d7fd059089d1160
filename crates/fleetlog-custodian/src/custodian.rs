//! Retention policies and space reclamation
//!
//! The custodian tracks which files are safe to delete (they were uploaded)
//! and runs the three cleanup policies. All methods are synchronous; they
//! are invoked from the daemon's background loops and from the post-batch
//! disk check.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use fleetlog_core::config::DirectorySpec;
use fleetlog_core::domain::units::{bytes_to_gb, bytes_to_mb};
use tracing::{debug, error, info, warn};

use crate::disk::{disk_usage, DiskUsage};
use crate::marker::{DeleteAfter, SECONDS_PER_DAY};

const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Hook invoked for every file the custodian unlinks.
pub type DeletionHook = Box<dyn Fn(&Path) + Send + Sync>;

/// Custodian construction settings.
#[derive(Debug, Clone)]
pub struct CustodianSettings {
    /// Monitored directories; the custodian never deletes outside these.
    pub roots: Vec<DirectorySpec>,
    /// Minimum free bytes to maintain.
    pub reserved_bytes: u64,
    /// Usage fraction that triggers a warning.
    pub warning_threshold: f64,
    /// Usage fraction considered critical.
    pub critical_threshold: f64,
}

/// Reclaims disk while preserving unreplicated data.
pub struct DiskCustodian {
    settings: CustodianSettings,
    /// Files safe to delete, with their deletion markers.
    uploaded: Mutex<HashMap<PathBuf, DeleteAfter>>,
    hook: Mutex<Option<DeletionHook>>,
    /// Filesystem probed for free space; the first root's filesystem.
    probe_path: PathBuf,
}

impl DiskCustodian {
    pub fn new(settings: CustodianSettings) -> Self {
        let probe_path = settings
            .roots
            .first()
            .map(|s| s.path.clone())
            .unwrap_or_else(|| PathBuf::from("/"));
        info!(
            roots = settings.roots.len(),
            reserved_gb = settings.reserved_bytes / BYTES_PER_GB,
            warning = settings.warning_threshold,
            critical = settings.critical_threshold,
            "Custodian initialized"
        );
        Self {
            settings,
            uploaded: Mutex::new(HashMap::new()),
            hook: Mutex::new(None),
            probe_path,
        }
    }

    /// Registers the hook called after every deletion (the orchestrator
    /// uses it to drop stale queue entries).
    pub fn set_deletion_hook(&self, hook: DeletionHook) {
        *self.lock_hook() = Some(hook);
    }

    // ========================================================================
    // Uploaded-file tracking
    // ========================================================================

    /// Marks a file as uploaded and therefore deletable after `keep_days`.
    ///
    /// `keep_days == 0` schedules deletion on the next sweep. Otherwise the
    /// deadline anchors to the file's mtime, so retention survives system
    /// clock corrections; when the file cannot be statted the wall clock is
    /// the fallback anchor.
    pub fn mark_uploaded(&self, path: &Path, keep_days: u32) {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if !self.within_roots(&resolved) {
            warn!(
                path = %resolved.display(),
                "Refusing to track file outside monitored directories"
            );
            return;
        }

        let marker = if keep_days == 0 {
            debug!(path = %resolved.display(), "Marked for immediate deletion");
            DeleteAfter::Immediate
        } else {
            match mtime_epoch(&resolved) {
                Some(mtime) => {
                    debug!(
                        path = %resolved.display(),
                        keep_days,
                        "Marked for deletion anchored to file mtime"
                    );
                    DeleteAfter::anchored(mtime, keep_days)
                }
                None => {
                    warn!(
                        path = %resolved.display(),
                        "Cannot stat file, anchoring deletion to wall clock"
                    );
                    DeleteAfter::AbsoluteWall(
                        now_epoch() + i64::from(keep_days) * SECONDS_PER_DAY,
                    )
                }
            }
        };

        self.lock_uploaded().insert(resolved, marker);
    }

    /// Number of files tracked as uploaded.
    pub fn uploaded_count(&self) -> usize {
        self.lock_uploaded().len()
    }

    /// True when `path` is tracked as uploaded.
    pub fn is_tracked(&self, path: &Path) -> bool {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.lock_uploaded().contains_key(&resolved)
    }

    // ========================================================================
    // Policy a: deferred deletion
    // ========================================================================

    /// Deletes tracked files whose retention has expired. Returns the
    /// number of files deleted.
    pub fn cleanup_deferred(&self) -> usize {
        self.cleanup_deferred_at(now_epoch())
    }

    /// Deferred sweep against an explicit wall-clock instant.
    pub fn cleanup_deferred_at(&self, now: i64) -> usize {
        let snapshot: Vec<(PathBuf, DeleteAfter)> = self
            .lock_uploaded()
            .iter()
            .map(|(p, m)| (p.clone(), *m))
            .collect();

        let mut deleted = 0usize;
        let mut freed = 0u64;
        for (path, marker) in snapshot {
            if !marker.is_due(now) {
                continue;
            }
            if !path.exists() {
                debug!(path = %path.display(), "File already gone, dropping from tracking");
                self.lock_uploaded().remove(&path);
                continue;
            }
            if let Some(size) = self.delete_file(&path) {
                deleted += 1;
                freed += size;
            }
            self.lock_uploaded().remove(&path);
        }

        if deleted > 0 {
            info!(
                deleted,
                "Deferred deletion freed {:.2} GB",
                bytes_to_gb(freed)
            );
        }
        deleted
    }

    // ========================================================================
    // Policy b: age-based cleanup
    // ========================================================================

    /// Deletes pattern-matching files older than `max_age_days`, uploaded
    /// or not. Returns the number of files deleted.
    pub fn cleanup_by_age(&self, max_age_days: u32) -> usize {
        self.cleanup_by_age_at(max_age_days, now_epoch())
    }

    /// Age sweep against an explicit wall-clock instant.
    pub fn cleanup_by_age_at(&self, max_age_days: u32, now: i64) -> usize {
        if max_age_days == 0 {
            debug!("Age-based cleanup disabled (max_age_days = 0)");
            return 0;
        }
        info!(max_age_days, "Running age-based cleanup");

        let cutoff = now - i64::from(max_age_days) * SECONDS_PER_DAY;
        let mut deleted = 0usize;
        let mut freed = 0u64;

        for path in self.walk_all_files() {
            if !self.matches_pattern(&path) {
                debug!(path = %path.display(), "Skipping, does not match upload pattern");
                continue;
            }
            let mtime = match mtime_epoch(&path) {
                Some(m) => m,
                None => continue,
            };
            if mtime >= cutoff {
                continue;
            }

            let age_days = (now - mtime) as f64 / SECONDS_PER_DAY as f64;
            info!(
                path = %path.display(),
                "Deleting old file ({age_days:.1} days)"
            );
            if let Some(size) = self.delete_file(&path) {
                deleted += 1;
                freed += size;
            }
            self.lock_uploaded().remove(&path);
        }

        if deleted > 0 {
            info!(
                deleted,
                "Age-based cleanup freed {:.2} GB",
                bytes_to_gb(freed)
            );
        } else {
            info!(max_age_days, "Age-based cleanup found nothing to delete");
        }
        deleted
    }

    // ========================================================================
    // Policy c: emergency reclamation
    // ========================================================================

    /// Deletes the oldest *uploaded* files until `target_free_gb` (or the
    /// reserved minimum) is available. Files never uploaded are untouchable
    /// here regardless of the target.
    pub fn cleanup_old_files(&self, target_free_gb: Option<f64>) -> usize {
        let target = self.target_bytes(target_free_gb);
        info!(
            "Reclaiming uploaded files until {:.2} GB free",
            bytes_to_gb(target)
        );

        let free = match self.disk_usage() {
            Ok(usage) => usage.free_bytes,
            Err(e) => {
                error!(error = %e, "Disk probe failed, skipping reclamation");
                return 0;
            }
        };
        if free >= target {
            info!("Sufficient space available, no reclamation needed");
            return 0;
        }

        let mut candidates: Vec<(i64, u64, PathBuf)> = self
            .lock_uploaded()
            .keys()
            .filter_map(|path| {
                let meta = std::fs::metadata(path).ok()?;
                Some((mtime_epoch(path)?, meta.len(), path.clone()))
            })
            .collect();
        candidates.sort();

        self.delete_until_target(candidates, free, target, "uploaded-file reclamation")
    }

    /// Last resort: deletes the oldest pattern-matching files, uploaded or
    /// not, until the target is available. Only invoked when the disk is
    /// critically full and the emergency policy is enabled.
    pub fn emergency_cleanup_all(&self, target_free_gb: Option<f64>) -> usize {
        let target = self.target_bytes(target_free_gb);
        warn!(
            "EMERGENCY cleanup over all files until {:.2} GB free",
            bytes_to_gb(target)
        );

        let free = match self.disk_usage() {
            Ok(usage) => usage.free_bytes,
            Err(e) => {
                error!(error = %e, "Disk probe failed, skipping emergency cleanup");
                return 0;
            }
        };
        if free >= target {
            info!("Sufficient space available, no emergency cleanup needed");
            return 0;
        }

        let mut candidates: Vec<(i64, u64, PathBuf)> = self
            .walk_all_files()
            .into_iter()
            .filter(|path| self.matches_pattern(path))
            .filter_map(|path| {
                let meta = std::fs::metadata(&path).ok()?;
                Some((mtime_epoch(&path)?, meta.len(), path))
            })
            .collect();
        candidates.sort();

        self.delete_until_target(candidates, free, target, "EMERGENCY cleanup")
    }

    // ========================================================================
    // Disk probe
    // ========================================================================

    /// Usage of the filesystem holding the monitored directories.
    pub fn disk_usage(&self) -> std::io::Result<DiskUsage> {
        disk_usage(&self.probe_path)
    }

    /// False when free space is below the reserved minimum or usage is at
    /// or past the critical threshold.
    pub fn check_disk_space(&self) -> bool {
        let usage = match self.disk_usage() {
            Ok(usage) => usage,
            Err(e) => {
                error!(error = %e, "Disk probe failed");
                return false;
            }
        };

        if usage.free_bytes < self.settings.reserved_bytes {
            warn!(
                "Low disk space: {:.2} GB free, {:.2} GB reserved",
                bytes_to_gb(usage.free_bytes),
                bytes_to_gb(self.settings.reserved_bytes)
            );
            return false;
        }
        if usage.used_fraction >= self.settings.critical_threshold {
            error!(
                "CRITICAL: disk usage at {:.1}%",
                usage.used_percent()
            );
            return false;
        }
        if usage.used_fraction >= self.settings.warning_threshold {
            warn!("Disk usage at {:.1}%", usage.used_percent());
        }
        true
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn target_bytes(&self, target_free_gb: Option<f64>) -> u64 {
        match target_free_gb {
            Some(gb) => (gb * BYTES_PER_GB as f64) as u64,
            None => self.settings.reserved_bytes,
        }
    }

    fn delete_until_target(
        &self,
        candidates: Vec<(i64, u64, PathBuf)>,
        free: u64,
        target: u64,
        label: &str,
    ) -> usize {
        let mut deleted = 0usize;
        let mut freed = 0u64;

        for (_mtime, size, path) in candidates {
            if free + freed >= target {
                break;
            }
            info!(
                path = %path.display(),
                "{label}: deleting ({:.2} MB)",
                bytes_to_mb(size)
            );
            if let Some(size) = self.delete_file(&path) {
                freed += size;
                deleted += 1;
            }
            self.lock_uploaded().remove(&path);
        }

        info!(deleted, "{label} complete, freed {:.2} GB", bytes_to_gb(freed));
        deleted
    }

    /// Unlinks one file and fires the deletion hook. Errors are logged and
    /// do not halt the surrounding sweep.
    fn delete_file(&self, path: &Path) -> Option<u64> {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!(
                    path = %path.display(),
                    "Deleted ({:.2} MB)",
                    bytes_to_mb(size)
                );
                if let Some(hook) = self.lock_hook().as_ref() {
                    hook(path);
                }
                Some(size)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to delete file");
                None
            }
        }
    }

    /// True when `path` lies under one of the monitored roots.
    fn within_roots(&self, path: &Path) -> bool {
        self.settings.roots.iter().any(|s| path.starts_with(&s.path))
    }

    /// Checks `path` against the pattern of the root that contains it.
    ///
    /// Files with no containing root are refused; a root without a pattern
    /// accepts all of its files.
    fn matches_pattern(&self, path: &Path) -> bool {
        let root = match self.settings.roots.iter().find(|s| path.starts_with(&s.path)) {
            Some(root) => root,
            None => {
                warn!(
                    path = %path.display(),
                    "File outside monitored directories, refusing deletion"
                );
                return false;
            }
        };
        let pattern = match &root.pattern {
            None => return true,
            Some(p) => p,
        };
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };
        match glob::Pattern::new(pattern) {
            Ok(p) => p.matches(name),
            Err(e) => {
                error!(pattern, error = %e, "Invalid deletion pattern, refusing");
                false
            }
        }
    }

    /// All non-hidden regular files under the monitored roots, recursively.
    fn walk_all_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in &self.settings.roots {
            walk(&root.path, &mut files);
        }
        files
    }

    fn lock_uploaded(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, DeleteAfter>> {
        self.uploaded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_hook(&self) -> std::sync::MutexGuard<'_, Option<DeletionHook>> {
        self.hook.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn insert_raw_marker(&self, path: &Path, raw: i64) {
        self.lock_uploaded()
            .insert(path.to_path_buf(), DeleteAfter::decode(raw));
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out);
        } else if path.is_file() {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(true);
            if !hidden {
                out.push(path);
            }
        }
    }
}

fn mtime_epoch(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => Some(d.as_secs() as i64),
        Err(e) => Some(-(e.duration().as_secs() as i64)),
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
