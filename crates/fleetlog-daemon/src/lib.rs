//! Fleetlog Daemon - the agent's coordination layer
//!
//! The [`orchestrator::Orchestrator`] owns every component's lifecycle and
//! enforces the upload and cleanup time policies; [`schedule`] holds the
//! background loops that drive it. The `fleetlogd` binary wires real
//! adapters (HTTP object store, HTTP metrics ingest) through
//! [`orchestrator::bootstrap`] and handles process signals.

pub mod orchestrator;
pub mod schedule;
