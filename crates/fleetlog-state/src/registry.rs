//! Processed-file registry
//!
//! The registry records which files have already been handed off for upload,
//! keyed by [`FileIdentity`] so a recreated file with the same name but
//! different contents is treated as new. Its presence check is what makes
//! re-detection after a restart a no-op instead of a duplicate upload.
//!
//! Unlike the queue, the registry does not persist on every insert: the
//! orchestrator checkpoints it every few successful uploads and at batch
//! end, and the monitor persists after registering a newly emitted file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use fleetlog_core::domain::identity::FileIdentity;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::persist::{load_json, save_json, Loaded};

/// Registry value: when the file was recorded and, once the upload finished,
/// the object key it was stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub uploaded_at: DateTime<Utc>,
    /// Object-store key; `None` while the file is queued but not yet
    /// transferred.
    #[serde(default)]
    pub key: Option<String>,
}

/// Durable record of processed files, persisted as a JSON object keyed by
/// the encoded [`FileIdentity`].
#[derive(Debug)]
pub struct ProcessedRegistry {
    path: PathBuf,
    entries: HashMap<String, RegistryEntry>,
}

impl ProcessedRegistry {
    /// Opens (or creates) the registry at `path`, with backup recovery.
    pub fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(dir = %parent.display(), error = %e, "Cannot create registry directory");
            }
        }

        let loaded: Loaded<HashMap<String, RegistryEntry>> = load_json(path);
        let recovered = loaded.recovered();
        let registry = Self {
            path: path.to_path_buf(),
            entries: loaded.into_value(HashMap::new()),
        };
        if recovered {
            registry.save();
        }

        info!(entries = registry.entries.len(), "Registry opened");
        registry
    }

    /// True when `identity` has already been processed.
    pub fn contains(&self, identity: &FileIdentity) -> bool {
        self.entries.contains_key(&identity.encode())
    }

    /// Records `identity`, overwriting any previous entry (this is how a
    /// queued file gains its object key once the upload completes).
    ///
    /// Does not persist; call [`ProcessedRegistry::save`] to checkpoint.
    pub fn insert(&mut self, identity: &FileIdentity, key: Option<String>, when: DateTime<Utc>) {
        self.entries.insert(
            identity.encode(),
            RegistryEntry {
                uploaded_at: when,
                key,
            },
        );
    }

    /// The recorded entry for `identity`, if any.
    pub fn get(&self, identity: &FileIdentity) -> Option<&RegistryEntry> {
        self.entries.get(&identity.encode())
    }

    /// Drops entries older than `retention_days`, persisting when anything
    /// was removed. Returns the number of evicted entries.
    pub fn prune(&mut self, now: DateTime<Utc>, retention_days: u32) -> usize {
        let cutoff = now - Duration::days(i64::from(retention_days));
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.uploaded_at >= cutoff);
        let removed = before - self.entries.len();
        if removed > 0 {
            info!(removed, retention_days, "Pruned expired registry entries");
            self.save();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Persists the registry. Failures are logged, never propagated.
    pub fn save(&self) {
        if let Err(e) = save_json(&self.path, &self.entries) {
            error!(path = %self.path.display(), error = %e, "Failed to save registry");
        }
    }
}
