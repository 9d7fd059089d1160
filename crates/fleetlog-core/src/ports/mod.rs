//! Port definitions (trait seams to external systems)
//!
//! Adapters implement these traits against the real object store and metrics
//! backend; tests substitute in-memory fakes.

pub mod metrics;
pub mod object_store;
