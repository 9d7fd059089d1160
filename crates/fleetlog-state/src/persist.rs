//! Atomic JSON persistence with backup recovery
//!
//! State files are small, so every save rewrites the whole file:
//!
//! 1. If the primary exists, copy it to `<path>.bak` (best effort - a failed
//!    backup never blocks the save).
//! 2. Serialize to `<path>.tmp`.
//! 3. Rename the temp file over the primary. Rename on the same filesystem
//!    is atomic, so a crash leaves either the old or the new file, never a
//!    torn one.
//!
//! Loading tries the primary first; a parse failure falls back to the
//! backup, and a recovered backup is immediately re-written as the new
//! primary by the caller.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

/// Sibling backup path: `<path>.bak`.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".bak");
    PathBuf::from(os)
}

/// Sibling temp path: `<path>.tmp`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

/// Saves `value` to `path` atomically, backing up the previous contents.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if path.exists() {
        let backup = backup_path(path);
        if let Err(e) = fs::copy(path, &backup) {
            warn!(
                path = %backup.display(),
                error = %e,
                "Failed to create state backup, saving anyway"
            );
        }
    }

    let tmp = temp_path(path);
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;

    debug!(path = %path.display(), "State saved");
    Ok(())
}

/// Result of loading a state file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<T> {
    /// The primary file parsed cleanly.
    Primary(T),
    /// The primary was corrupt or missing; the backup was used. The caller
    /// should re-save to restore the primary.
    Backup(T),
    /// Neither file was usable; start from empty state.
    Fresh,
}

impl<T> Loaded<T> {
    /// Unwraps the value, substituting `default` for `Fresh`.
    pub fn into_value(self, default: T) -> T {
        match self {
            Loaded::Primary(v) | Loaded::Backup(v) => v,
            Loaded::Fresh => default,
        }
    }

    /// True when the backup had to be used.
    pub fn recovered(&self) -> bool {
        matches!(self, Loaded::Backup(_))
    }
}

/// Loads a state file, recovering from the `.bak` sibling on corruption.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Loaded<T> {
    let backup = backup_path(path);

    if path.exists() {
        match read_parse(path) {
            Ok(value) => return Loaded::Primary(value),
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Primary state file corrupted, attempting backup recovery"
                );
            }
        }
        match read_parse(&backup) {
            Ok(value) => {
                warn!(
                    path = %backup.display(),
                    "Recovered state from backup (recent changes may be lost)"
                );
                return Loaded::Backup(value);
            }
            Err(e) => {
                error!(
                    path = %backup.display(),
                    error = %e,
                    "Backup unusable, starting with empty state"
                );
                return Loaded::Fresh;
            }
        }
    }

    if backup.exists() {
        match read_parse(&backup) {
            Ok(value) => {
                warn!(
                    path = %backup.display(),
                    "Primary state file missing, recovered from backup"
                );
                return Loaded::Backup(value);
            }
            Err(e) => {
                error!(path = %backup.display(), error = %e, "Backup unusable");
                return Loaded::Fresh;
            }
        }
    }

    debug!(path = %path.display(), "No existing state file, starting fresh");
    Loaded::Fresh
}

fn read_parse<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
