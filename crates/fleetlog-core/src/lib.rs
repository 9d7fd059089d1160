//! Fleetlog Core - shared domain types, configuration, and ports
//!
//! This crate contains the pieces every other Fleetlog crate builds on:
//! - **Configuration** - typed YAML schema with validation and defaults
//! - **Domain types** - `FileIdentity`, wall-clock times, byte formatting
//! - **Port definitions** - traits for adapters: `ObjectStore`, `MetricsPublisher`
//!
//! # Architecture
//!
//! The domain module contains pure types with no I/O beyond `stat`. Ports
//! define trait interfaces that adapter crates implement; the daemon wires
//! concrete adapters (or test fakes) through these seams.

pub mod config;
pub mod domain;
pub mod ports;
