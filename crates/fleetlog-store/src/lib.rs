//! Fleetlog Store - transfer of log artifacts to the object store
//!
//! Three layers:
//! - [`key`] - deterministic object key layout
//! - [`client`] - HTTP adapter implementing the [`ObjectStore`] port
//! - [`uploader`] - retry/backoff policy and the transient/permanent error
//!   split the orchestrator acts on
//!
//! [`ObjectStore`]: fleetlog_core::ports::object_store::ObjectStore

pub mod client;
pub mod key;
pub mod uploader;

pub use client::HttpObjectStore;
pub use key::ObjectKeyBuilder;
pub use uploader::{UploadError, Uploader};
