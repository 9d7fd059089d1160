//! Fleetlog State - durable bookkeeping that survives restarts
//!
//! Two small JSON-backed stores share one persistence discipline:
//! - [`queue::UploadQueue`] - the pending-work list
//! - [`registry::ProcessedRegistry`] - the at-most-once-upload record
//!
//! Both write atomically (temp file + rename), keep a best-effort `.bak`
//! sibling, and recover from corruption of the primary file by falling back
//! to the backup. See [`persist`] for the shared machinery.

pub mod persist;
pub mod queue;
pub mod registry;
