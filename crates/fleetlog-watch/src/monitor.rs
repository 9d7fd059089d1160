//! File monitor lifecycle
//!
//! [`FileMonitor`] glues the watcher, the stability tracker, and the
//! processed-file registry together. It owns two background tasks:
//!
//! - the **pump** drains watcher events into the tracker
//! - the **checker** sweeps the tracker on a fixed tick and emits stable
//!   files through the [`ReadyHandler`]
//!
//! Before a file reaches the handler its [`FileIdentity`] is checked against
//! the registry; files already processed are dropped silently, which is what
//! bounds every file to a single emission per registry entry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use anyhow::Result;
use async_trait::async_trait;
use fleetlog_core::config::DirectorySpec;
use fleetlog_core::domain::identity::FileIdentity;
use fleetlog_state::registry::ProcessedRegistry;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Shared handle to the processed-file registry.
///
/// A std mutex: registry operations never await, and the same handle is
/// locked from synchronous contexts in the daemon.
pub type SharedRegistry = Arc<StdMutex<ProcessedRegistry>>;

fn lock_registry(registry: &SharedRegistry) -> std::sync::MutexGuard<'_, ProcessedRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

use crate::tracker::FileTracker;
use crate::watcher::{DirectoryWatcher, WatchEvent};

/// Longest allowed stability-check tick.
const MAX_TICK: Duration = Duration::from_secs(10);

/// Shortest tick, so sub-second stability windows in tests stay responsive.
const MIN_TICK: Duration = Duration::from_millis(100);

/// How long `stop()` waits for the checker to finish its current sweep.
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Receiver of stable-file notifications.
///
/// The return value decides registry bookkeeping: `true` records the file's
/// identity in the registry (it will never be emitted again), `false` leaves
/// the registry untouched so the file can be retried on a later detection.
#[async_trait]
pub trait ReadyHandler: Send + Sync {
    async fn on_file_ready(&self, path: &Path) -> bool;
}

/// Monitor construction settings.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Directories to watch, with per-directory pattern/recursive options.
    pub directories: Vec<DirectorySpec>,
    /// How long a file's size must hold still before it is emitted.
    pub stability: Duration,
    /// Emit pre-existing files at startup.
    pub scan_existing: bool,
    /// Age horizon for the startup scan.
    pub scan_max_age_days: u32,
}

/// Watches directories and emits each file once it is stable.
pub struct FileMonitor {
    settings: MonitorSettings,
    registry: SharedRegistry,
    handler: Arc<dyn ReadyHandler>,
    tracker: Arc<Mutex<FileTracker>>,
    running: Arc<AtomicBool>,
    watcher: Option<DirectoryWatcher>,
    pump_task: Option<JoinHandle<()>>,
    checker_task: Option<JoinHandle<()>>,
}

impl FileMonitor {
    pub fn new(
        settings: MonitorSettings,
        registry: SharedRegistry,
        handler: Arc<dyn ReadyHandler>,
    ) -> Self {
        info!(
            directories = settings.directories.len(),
            stability_secs = settings.stability.as_secs_f64(),
            "File monitor created"
        );
        Self {
            settings,
            registry,
            handler,
            tracker: Arc::new(Mutex::new(FileTracker::new())),
            running: Arc::new(AtomicBool::new(false)),
            watcher: None,
            pump_task: None,
            checker_task: None,
        }
    }

    /// Starts watching. Idempotent; a second call is a warning no-op.
    ///
    /// Missing directories are created. When the startup scan is enabled,
    /// pre-existing files within the age horizon are offered through the
    /// same registry-gated path as watched files.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Monitor already running");
            return Ok(());
        }

        for spec in &self.settings.directories {
            if !spec.path.exists() {
                info!(path = %spec.path.display(), "Creating missing log directory");
                std::fs::create_dir_all(&spec.path)?;
            }
        }

        let (mut watcher, mut rx) = DirectoryWatcher::new()?;
        for spec in &self.settings.directories {
            watcher.watch(&spec.path, spec.recursive)?;
        }
        self.watcher = Some(watcher);

        // Pump: watcher events into the tracker.
        let tracker = self.tracker.clone();
        let directories = self.settings.directories.clone();
        self.pump_task = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    WatchEvent::Touched(path) => {
                        if !accepts(&directories, &path) {
                            continue;
                        }
                        let size = match std::fs::metadata(&path) {
                            Ok(meta) if meta.is_file() => meta.len(),
                            _ => continue,
                        };
                        tracker.lock().await.observe(path, size, Instant::now());
                    }
                    WatchEvent::Removed(path) => {
                        tracker.lock().await.remove(&path);
                    }
                }
            }
            debug!("Watcher channel closed, event pump exiting");
        }));

        // Checker: sweep on a fixed tick, at most every MAX_TICK.
        let tick = (self.settings.stability / 2).clamp(MIN_TICK, MAX_TICK);
        let tracker = self.tracker.clone();
        let running = self.running.clone();
        let stability = self.settings.stability;
        let emitter = Emitter {
            registry: self.registry.clone(),
            handler: self.handler.clone(),
        };
        self.checker_task = Some(tokio::spawn(async move {
            info!(tick_ms = tick.as_millis() as u64, "Stability checker started");
            while running.load(Ordering::Acquire) {
                tokio::time::sleep(tick).await;
                if !running.load(Ordering::Acquire) {
                    break;
                }
                let stable = tracker.lock().await.sweep(stability, Instant::now());
                for (path, size) in stable {
                    info!(path = %path.display(), size, "File stable");
                    emitter.offer(&path).await;
                }
            }
            info!("Stability checker stopped");
        }));

        if self.settings.scan_existing {
            self.scan_existing().await;
        }

        info!("Monitor started");
        Ok(())
    }

    /// Stops watching. Idempotent. After return no callbacks will fire.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        // Dropping the watcher closes the event channel, which ends the pump.
        self.watcher = None;
        if let Some(mut pump) = self.pump_task.take() {
            if tokio::time::timeout(STOP_JOIN_TIMEOUT, &mut pump).await.is_err() {
                warn!("Event pump did not stop in time, aborting");
                pump.abort();
            }
        }
        if let Some(mut checker) = self.checker_task.take() {
            if tokio::time::timeout(STOP_JOIN_TIMEOUT, &mut checker)
                .await
                .is_err()
            {
                warn!("Stability checker did not stop in time, aborting");
                checker.abort();
            }
        }

        info!("Monitor stopped");
    }

    /// Number of files currently tracked (diagnostics and tests).
    pub async fn tracked_count(&self) -> usize {
        self.tracker.lock().await.len()
    }

    /// One-shot scan of pre-existing files within the age horizon.
    async fn scan_existing(&self) {
        let horizon = Duration::from_secs(u64::from(self.settings.scan_max_age_days) * 86_400);
        let now = SystemTime::now();
        let emitter = Emitter {
            registry: self.registry.clone(),
            handler: self.handler.clone(),
        };

        let mut candidates = Vec::new();
        for spec in &self.settings.directories {
            collect_files(&spec.path, spec.recursive, &mut candidates);
        }

        let mut offered = 0usize;
        for path in candidates {
            if !accepts(&self.settings.directories, &path) {
                continue;
            }
            let fresh_enough = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .map(|age| age <= horizon)
                .unwrap_or(false);
            if !fresh_enough {
                continue;
            }
            offered += 1;
            emitter.offer(&path).await;
        }
        info!(offered, "Startup scan complete");
    }
}

/// Shared emission path: registry gate, handler call, registry insert.
struct Emitter {
    registry: SharedRegistry,
    handler: Arc<dyn ReadyHandler>,
}

impl Emitter {
    async fn offer(&self, path: &Path) {
        let identity = match FileIdentity::of(path) {
            Ok(id) => id,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "File vanished before emission");
                return;
            }
        };

        if lock_registry(&self.registry).contains(&identity) {
            debug!(path = %path.display(), "Already processed, skipping");
            return;
        }

        let accepted = self.handler.on_file_ready(path).await;
        if accepted {
            let mut registry = lock_registry(&self.registry);
            // The handler may have registered the upload itself (continuous
            // mode); never clobber an entry that already carries a key.
            if !registry.contains(&identity) {
                registry.insert(&identity, None, chrono::Utc::now());
            }
            registry.save();
        } else {
            debug!(
                path = %path.display(),
                "Handler declined, file may be retried on next detection"
            );
        }
    }
}

/// Accepts regular, non-hidden files matching their directory's pattern.
fn accepts(directories: &[DirectorySpec], path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    if name.starts_with('.') {
        return false;
    }

    let spec = match directories.iter().find(|s| path.starts_with(&s.path)) {
        Some(s) => s,
        None => return false,
    };
    match &spec.pattern {
        None => true,
        Some(pattern) => match glob::Pattern::new(pattern) {
            Ok(p) => p.matches(name),
            Err(e) => {
                error!(pattern, error = %e, "Invalid directory pattern, rejecting file");
                false
            }
        },
    }
}

fn collect_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot scan directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, true, out);
            }
        } else if path.is_file() {
            out.push(path);
        }
    }
}
