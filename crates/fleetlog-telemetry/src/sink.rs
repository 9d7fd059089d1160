//! Counter aggregation and publish cycle
//!
//! Counters accumulate between publishes. A publish builds datums for every
//! non-zero counter (plus disk usage when supplied), hands them to the
//! publisher port, and subtracts the published amounts on success; on
//! failure the counters are retained for the next cycle.
//!
//! When monitoring is enabled, construction performs a startup probe by
//! publishing `ServiceStartup=1`. A failing probe is fatal: silently
//! running without the monitoring the fleet relies on is the one
//! misconfiguration this agent refuses to tolerate.

use std::sync::{Mutex, PoisonError};
use std::sync::Arc;

use chrono::Utc;
use fleetlog_core::ports::metrics::{
    MetricDatum, MetricUnit, MetricsPublisher, METRICS_NAMESPACE, METRIC_BYTES_UPLOADED,
    METRIC_DISK_USAGE, METRIC_FAILURE_COUNT, METRIC_FILE_COUNT, METRIC_SERVICE_STARTUP,
};
use tracing::{debug, error, info};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Counters {
    bytes_uploaded: u64,
    files_uploaded: u64,
    files_failed: u64,
}

/// Aggregates upload counters and publishes them as metric datums.
pub struct MetricsSink {
    vehicle_id: String,
    publisher: Option<Arc<dyn MetricsPublisher>>,
    counters: Mutex<Counters>,
}

impl MetricsSink {
    /// Creates an enabled sink and runs the startup probe.
    ///
    /// # Errors
    /// Fails when the `ServiceStartup` heartbeat cannot be published;
    /// callers must treat this as fatal at startup.
    pub async fn init(
        vehicle_id: impl Into<String>,
        publisher: Arc<dyn MetricsPublisher>,
    ) -> anyhow::Result<Self> {
        let vehicle_id = vehicle_id.into();

        let startup = [MetricDatum::new(
            METRIC_SERVICE_STARTUP,
            1.0,
            MetricUnit::Count,
            Utc::now(),
        )];
        publisher
            .publish(METRICS_NAMESPACE, &vehicle_id, &startup)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    "Metrics startup probe failed; fix the monitoring backend \
                     or disable monitoring in the configuration"
                );
                e
            })?;
        info!(vehicle_id, "Metrics startup probe published");

        Ok(Self {
            vehicle_id,
            publisher: Some(publisher),
            counters: Mutex::new(Counters::default()),
        })
    }

    /// Creates a disabled sink; every operation is a cheap no-op.
    pub fn disabled(vehicle_id: impl Into<String>) -> Self {
        info!("Metrics disabled");
        Self {
            vehicle_id: vehicle_id.into(),
            publisher: None,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    /// Records one successful upload of `bytes`.
    pub fn record_upload_success(&self, bytes: u64) {
        let mut counters = self.lock();
        counters.bytes_uploaded += bytes;
        counters.files_uploaded += 1;
    }

    /// Records one failed upload.
    pub fn record_upload_failure(&self) {
        self.lock().files_failed += 1;
    }

    /// Current accumulator values: (bytes, files, failures).
    pub fn snapshot(&self) -> (u64, u64, u64) {
        let c = *self.lock();
        (c.bytes_uploaded, c.files_uploaded, c.files_failed)
    }

    /// Publishes the accumulated counters, plus disk usage when given.
    ///
    /// Zero-valued counters are omitted. On success the published amounts
    /// are subtracted from the accumulators (increments that raced in
    /// during the publish survive to the next cycle); on failure nothing
    /// is reset.
    pub async fn publish(&self, disk_usage_percent: Option<f64>) {
        let publisher = match &self.publisher {
            Some(p) => p.clone(),
            None => {
                debug!("Metrics disabled, skipping publish");
                return;
            }
        };

        let published = *self.lock();
        let timestamp = Utc::now();
        let mut data = Vec::new();
        if published.bytes_uploaded > 0 {
            data.push(MetricDatum::new(
                METRIC_BYTES_UPLOADED,
                published.bytes_uploaded as f64,
                MetricUnit::Bytes,
                timestamp,
            ));
        }
        if published.files_uploaded > 0 {
            data.push(MetricDatum::new(
                METRIC_FILE_COUNT,
                published.files_uploaded as f64,
                MetricUnit::Count,
                timestamp,
            ));
        }
        if published.files_failed > 0 {
            data.push(MetricDatum::new(
                METRIC_FAILURE_COUNT,
                published.files_failed as f64,
                MetricUnit::Count,
                timestamp,
            ));
        }
        if let Some(percent) = disk_usage_percent {
            data.push(MetricDatum::new(
                METRIC_DISK_USAGE,
                percent,
                MetricUnit::Percent,
                timestamp,
            ));
        }
        if data.is_empty() {
            debug!("Nothing to publish");
            return;
        }

        match publisher
            .publish(METRICS_NAMESPACE, &self.vehicle_id, &data)
            .await
        {
            Ok(()) => {
                info!(datums = data.len(), "Published metrics");
                let mut counters = self.lock();
                counters.bytes_uploaded -= published.bytes_uploaded;
                counters.files_uploaded -= published.files_uploaded;
                counters.files_failed -= published.files_failed;
            }
            Err(e) => {
                error!(error = %e, "Failed to publish metrics, retaining counters");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
