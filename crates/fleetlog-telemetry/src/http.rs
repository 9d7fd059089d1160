//! HTTP metrics ingest adapter
//!
//! Posts metric batches as JSON to the fleet monitoring ingest endpoint.
//! The payload carries the namespace, the `VehicleId` dimension, and the
//! datums with their units and timestamps.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fleetlog_core::ports::metrics::{MetricDatum, MetricsPublisher};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Request timeout for metric submissions; metrics must never stall the
/// upload path for long.
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct IngestPayload<'a> {
    namespace: &'a str,
    dimensions: Vec<Dimension<'a>>,
    data: &'a [MetricDatum],
}

#[derive(Debug, Serialize)]
struct Dimension<'a> {
    name: &'a str,
    value: &'a str,
}

/// Publishes metrics to an HTTP ingest endpoint.
pub struct HttpMetricsPublisher {
    client: Client,
    endpoint: String,
}

impl HttpMetricsPublisher {
    /// Creates a publisher for `endpoint` (e.g.
    /// `https://monitoring.cn-north-1.example.net/metrics`).
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(PUBLISH_TIMEOUT)
            .build()
            .context("Failed to build metrics HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl MetricsPublisher for HttpMetricsPublisher {
    async fn publish(
        &self,
        namespace: &str,
        vehicle_id: &str,
        data: &[MetricDatum],
    ) -> Result<()> {
        let payload = IngestPayload {
            namespace,
            dimensions: vec![Dimension {
                name: "VehicleId",
                value: vehicle_id,
            }],
            data,
        };
        debug!(endpoint = %self.endpoint, datums = data.len(), "Posting metrics");

        self.client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .context("Failed to send metrics")?
            .error_for_status()
            .context("Metrics ingest returned error status")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fleetlog_core::ports::metrics::{MetricUnit, METRICS_NAMESPACE};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn datum(name: &str, value: f64) -> MetricDatum {
        MetricDatum::new(name, value, MetricUnit::Count, Utc::now())
    }

    #[tokio::test]
    async fn posts_namespace_dimension_and_datums() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/metrics"))
            .and(body_partial_json(serde_json::json!({
                "namespace": "TVM/Upload",
                "dimensions": [{"name": "VehicleId", "value": "vehicle-001"}],
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = HttpMetricsPublisher::new(format!("{}/metrics", server.uri())).unwrap();
        publisher
            .publish(
                METRICS_NAMESPACE,
                "vehicle-001",
                &[datum("FileCount", 3.0)],
            )
            .await
            .expect("publish succeeds");
    }

    #[tokio::test]
    async fn server_error_surfaces_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let publisher = HttpMetricsPublisher::new(format!("{}/metrics", server.uri())).unwrap();
        let result = publisher
            .publish(METRICS_NAMESPACE, "v", &[datum("FileCount", 1.0)])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_as_error() {
        let publisher = HttpMetricsPublisher::new("http://127.0.0.1:1/metrics").unwrap();
        let result = publisher
            .publish(METRICS_NAMESPACE, "v", &[datum("FileCount", 1.0)])
            .await;
        assert!(result.is_err());
    }
}
