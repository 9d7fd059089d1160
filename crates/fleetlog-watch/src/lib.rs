//! Fleetlog Watch - stable-file detection
//!
//! Watches the configured log directories and emits each regular file
//! exactly once, after its size has been unchanged for the configured
//! stability window. Producers on the vehicle append to a log file and then
//! leave it alone; size-quiescence is the signal that the file is finished.
//!
//! ## Architecture
//!
//! ```text
//! inotify
//!    │
//!    ▼
//! DirectoryWatcher ──→ mpsc::channel ──→ FileTracker (size, last change)
//!                                              │  stability tick
//!                                              ▼
//!                                   registry check ──→ ReadyHandler
//! ```

pub mod monitor;
pub mod tracker;
pub mod watcher;

pub use monitor::{FileMonitor, MonitorSettings, ReadyHandler, SharedRegistry};
