//! Metrics publisher port
//!
//! Fleetlog publishes a handful of counters to a fleet monitoring backend.
//! The sink aggregates locally and hands batches of [`MetricDatum`] values to
//! an implementation of [`MetricsPublisher`]; tests and disabled deployments
//! use fakes or skip publishing entirely.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace under which all Fleetlog metrics are published.
pub const METRICS_NAMESPACE: &str = "TVM/Upload";

/// Metric names.
pub const METRIC_BYTES_UPLOADED: &str = "BytesUploaded";
pub const METRIC_FILE_COUNT: &str = "FileCount";
pub const METRIC_FAILURE_COUNT: &str = "FailureCount";
pub const METRIC_DISK_USAGE: &str = "DiskUsagePercent";
pub const METRIC_SERVICE_STARTUP: &str = "ServiceStartup";

/// Unit attached to a metric datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    Bytes,
    Count,
    Percent,
}

/// One metric observation.
///
/// Every datum carries a `VehicleId` dimension added by the publisher from
/// the agent's configuration, so the backend can slice per vehicle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDatum {
    pub name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub timestamp: DateTime<Utc>,
}

impl MetricDatum {
    pub fn new(name: &str, value: f64, unit: MetricUnit, timestamp: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            value,
            unit,
            timestamp,
        }
    }
}

/// Port trait for pushing metric batches to the monitoring backend.
#[async_trait]
pub trait MetricsPublisher: Send + Sync {
    /// Publishes a batch of datums under `namespace`, dimensioned by
    /// `vehicle_id`. An error leaves the caller's accumulators untouched.
    async fn publish(
        &self,
        namespace: &str,
        vehicle_id: &str,
        data: &[MetricDatum],
    ) -> anyhow::Result<()>;
}
