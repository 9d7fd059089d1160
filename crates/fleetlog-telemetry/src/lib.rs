//! Fleetlog Telemetry - upload counters and the heartbeat
//!
//! The [`MetricsSink`] accumulates per-batch counters (bytes uploaded, file
//! count, failures) and publishes them periodically through a
//! [`MetricsPublisher`] port implementation, together with the current disk
//! usage and a one-shot startup heartbeat. A failed publish retains the
//! accumulators so no observation is lost, only delayed.
//!
//! [`MetricsPublisher`]: fleetlog_core::ports::metrics::MetricsPublisher

pub mod http;
pub mod sink;

pub use http::HttpMetricsPublisher;
pub use sink::MetricsSink;
