//! Directory watching
//!
//! Wraps the `notify` crate to monitor log directories, converting raw OS
//! events into the two signals the tracker cares about: a file was touched
//! (created or written) or a file went away. Everything else - access
//! events, metadata-only changes on directories, renames of directories -
//! is noise at this layer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Capacity of the watcher event channel.
///
/// Rosbag splits and syslog rotations arrive in small bursts; 1024 leaves
/// generous headroom before `blocking_send` would stall the notify thread.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A filesystem observation relevant to stability tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A file was created or its contents were modified.
    Touched(PathBuf),
    /// A file was removed (or renamed away).
    Removed(PathBuf),
}

impl WatchEvent {
    /// The path this event refers to.
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Touched(p) | WatchEvent::Removed(p) => p,
        }
    }
}

/// Watches directories using the OS-native mechanism (inotify on Linux).
///
/// Events are mapped to [`WatchEvent`] values and pushed through an mpsc
/// channel consumed by the monitor's pump task. Dropping the watcher stops
/// the underlying OS subscription.
pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Creates a watcher and the receiving end of its event channel.
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created.
    pub fn new() -> Result<(Self, mpsc::Receiver<WatchEvent>)> {
        let (tx, rx) = mpsc::channel::<WatchEvent>(EVENT_CHANNEL_CAPACITY);

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for mapped in map_notify_event(&event) {
                        if let Err(e) = tx.blocking_send(mapped) {
                            warn!(error = %e, "Dropping watch event (receiver gone)");
                            return;
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "Directory watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create directory watcher")?;

        Ok((Self { watcher }, rx))
    }

    /// Starts watching a directory.
    ///
    /// # Errors
    /// Returns an error if the path cannot be watched (missing, permission
    /// denied, or the inotify watch limit is exhausted).
    pub fn watch(&mut self, path: &Path, recursive: bool) -> Result<()> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        info!(path = %path.display(), recursive, "Watching directory");
        self.watcher
            .watch(path, mode)
            .with_context(|| format!("Failed to watch directory: {}", path.display()))
    }
}

/// Maps a raw `notify::Event` into zero or more [`WatchEvent`]s.
///
/// - `Create(*)` and `Modify(*)` become `Touched` for every carried path
/// - `Remove(*)` becomes `Removed`
/// - access events and pathless events are dropped
fn map_notify_event(event: &notify::Event) -> Vec<WatchEvent> {
    match &event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| WatchEvent::Touched(p.clone()))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| WatchEvent::Removed(p.clone()))
            .collect(),
        other => {
            debug!(kind = ?other, "Ignoring event kind");
            Vec::new()
        }
    }
}
