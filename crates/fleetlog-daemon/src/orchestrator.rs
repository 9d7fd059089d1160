//! Orchestrator - glue between monitor, queue, uploader, custodian, metrics
//!
//! The orchestrator is the [`ReadyHandler`] behind the monitor: a stable
//! file is queued, and in continuous mode (inside operational hours) the
//! queue is drained immediately. Batches are uploaded serially; outcomes
//! fan out to the queue, the registry, the custodian, and the metrics sink.
//!
//! Ordering within one file is strict: detected → queued → uploaded →
//! dequeued → registry insert → deferred-delete marker. Across a batch,
//! files go newest-first.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveTime, Utc};
use tracing::{error, info, warn};

use fleetlog_core::config::Config;
use fleetlog_core::domain::clock::HhMm;
use fleetlog_core::domain::identity::FileIdentity;
use fleetlog_core::domain::units::format_bytes;
use fleetlog_custodian::{CustodianSettings, DiskCustodian};
use fleetlog_state::queue::UploadQueue;
use fleetlog_state::registry::ProcessedRegistry;
use fleetlog_store::client::load_credential;
use fleetlog_store::{HttpObjectStore, ObjectKeyBuilder, UploadError, Uploader};
use fleetlog_telemetry::{HttpMetricsPublisher, MetricsSink};
use fleetlog_watch::{FileMonitor, MonitorSettings, ReadyHandler, SharedRegistry};

/// Persist the registry after this many successful uploads within a batch.
const REGISTRY_CHECKPOINT_INTERVAL: usize = 10;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Shared handle to the upload queue.
pub type SharedQueue = Arc<Mutex<UploadQueue>>;

/// Lifetime counters reported at shutdown.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub files_detected: u64,
    pub files_uploaded: u64,
    pub files_failed: u64,
    pub bytes_uploaded: u64,
}

/// Owns and coordinates all agent components.
pub struct Orchestrator {
    config: RwLock<Arc<Config>>,
    queue: SharedQueue,
    registry: SharedRegistry,
    custodian: Arc<DiskCustodian>,
    uploader: Arc<Uploader>,
    metrics: Arc<MetricsSink>,
    monitor: tokio::sync::Mutex<Option<FileMonitor>>,
    tasks: tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>,
    running: AtomicBool,
    stats: Mutex<RunStats>,
}

impl Orchestrator {
    /// Wires an orchestrator from its components and registers the
    /// custodian's deletion hook so deleted files also leave the queue.
    pub fn new(
        config: Config,
        queue: SharedQueue,
        registry: SharedRegistry,
        custodian: Arc<DiskCustodian>,
        uploader: Arc<Uploader>,
        metrics: Arc<MetricsSink>,
    ) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            config: RwLock::new(Arc::new(config)),
            queue: queue.clone(),
            registry,
            custodian,
            uploader,
            metrics,
            monitor: tokio::sync::Mutex::new(None),
            tasks: tokio::sync::Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            stats: Mutex::new(RunStats::default()),
        });

        orchestrator
            .custodian
            .set_deletion_hook(Box::new(move |path: &Path| {
                queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(path);
            }));

        orchestrator
    }

    /// The active configuration snapshot. Callers hold the returned `Arc`
    /// for the duration of one operation; a concurrent reload never mutates
    /// a snapshot in place.
    pub fn snapshot(&self) -> Arc<Config> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reparses and revalidates the configuration file; on success the new
    /// snapshot atomically replaces the active one, on failure the previous
    /// snapshot is retained.
    pub fn reload_config(&self, path: &Path) {
        info!(path = %path.display(), "Reloading configuration");
        match Config::load_validated(path) {
            Ok(config) => {
                *self.config.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
                info!("Configuration reloaded");
            }
            Err(e) => {
                error!(error = %e, "Configuration reload failed, keeping previous snapshot");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn queue(&self) -> &SharedQueue {
        &self.queue
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn custodian(&self) -> &Arc<DiskCustodian> {
        &self.custodian
    }

    pub fn metrics(&self) -> &Arc<MetricsSink> {
        &self.metrics
    }

    pub fn stats(&self) -> RunStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts the agent: disk check, registry retention prune, monitor, and
    /// the background loops. Drains surviving queue entries when
    /// `upload_on_start` is set.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Orchestrator already running");
            return Ok(());
        }
        let config = self.snapshot();
        info!(vehicle_id = %config.vehicle_id, "Starting upload agent");

        if !self.custodian.check_disk_space() {
            warn!("Low disk space at startup, reclaiming before monitoring begins");
            self.custodian.cleanup_old_files(None);
        }

        self.lock_registry().prune(
            Utc::now(),
            config.upload.processed_files_registry.retention_days,
        );

        let settings = MonitorSettings {
            directories: config.directories(),
            stability: Duration::from_secs(config.upload.file_stable_seconds),
            scan_existing: config.upload.scan_existing_files.enabled,
            scan_max_age_days: config.upload.scan_existing_files.max_age_days,
        };
        let mut monitor = FileMonitor::new(
            settings,
            self.registry.clone(),
            self.clone() as Arc<dyn ReadyHandler>,
        );
        monitor.start().await?;
        *self.monitor.lock().await = Some(monitor);

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push(tokio::spawn(crate::schedule::run_upload_schedule(
                self.clone(),
            )));
            tasks.push(tokio::spawn(crate::schedule::run_custodian_cycle(
                self.clone(),
            )));
            tasks.push(tokio::spawn(crate::schedule::run_metrics_cycle(
                self.clone(),
            )));
        }

        if config.upload.upload_on_start {
            info!("Draining queue entries that survived the previous run");
            self.process_queue().await;
        }

        info!(
            directories = config.log_directories.len(),
            "Agent started"
        );
        Ok(())
    }

    /// Graceful shutdown: stop the monitor and loops, drain once, persist
    /// state, publish final metrics, log lifetime statistics.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down");

        if let Some(mut monitor) = self.monitor.lock().await.take() {
            monitor.stop().await;
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        self.process_queue().await;

        self.lock_queue().save();
        self.lock_registry().save();

        let disk_percent = self.custodian.disk_usage().ok().map(|u| u.used_percent());
        self.metrics.publish(disk_percent).await;

        let stats = self.stats();
        info!(
            files_detected = stats.files_detected,
            files_uploaded = stats.files_uploaded,
            files_failed = stats.files_failed,
            "Shutdown complete, uploaded {}",
            format_bytes(stats.bytes_uploaded)
        );
    }

    // ========================================================================
    // Upload batches
    // ========================================================================

    /// Uploads one batch from the queue (newest detections first).
    ///
    /// Success removes the entry, records the identity and object key in
    /// the registry, and hands the file to the custodian. Transient
    /// exhaustion keeps the entry with its attempt counter bumped;
    /// permanent failures drop the entry. After the batch the disk is
    /// checked and reclamation runs if needed.
    pub async fn process_queue(&self) {
        let config = self.snapshot();
        let batch = self.lock_queue().next_batch(config.upload.max_batch_files);
        if batch.is_empty() {
            return;
        }
        info!(files = batch.len(), "Processing upload batch");

        let mut successes = 0usize;
        for path in batch {
            self.upload_one(&config, &path, &mut successes).await;
        }

        {
            let mut registry = self.lock_registry();
            registry.save();
            registry.prune(
                Utc::now(),
                config.upload.processed_files_registry.retention_days,
            );
        }

        if !self.custodian.check_disk_space() {
            warn!("Low disk space after batch, reclaiming uploaded files");
            self.custodian.cleanup_old_files(None);
            if !self.custodian.check_disk_space() && config.deletion.emergency.enabled {
                self.custodian.emergency_cleanup_all(None);
            }
        }
    }

    async fn upload_one(&self, config: &Config, path: &PathBuf, successes: &mut usize) {
        let identity = match FileIdentity::of(path) {
            Ok(id) => id,
            Err(_) => {
                warn!(path = %path.display(), "File disappeared before upload");
                self.lock_queue().remove(path);
                return;
            }
        };
        let source = config.directory_for(path).and_then(|spec| spec.source);

        match self.uploader.upload(path, source.as_deref()).await {
            Ok(key) => {
                self.lock_queue().mark_uploaded(path);
                self.lock_registry()
                    .insert(&identity, Some(key), Utc::now());
                self.custodian
                    .mark_uploaded(path, config.deletion.after_upload.keep_days);
                self.metrics.record_upload_success(identity.size);
                {
                    let mut stats = self.lock_stats();
                    stats.files_uploaded += 1;
                    stats.bytes_uploaded += identity.size;
                }
                *successes += 1;
                if *successes % REGISTRY_CHECKPOINT_INTERVAL == 0 {
                    self.lock_registry().save();
                }
            }
            Err(UploadError::Permanent { reason, .. }) => {
                self.lock_queue().mark_permanent_failure(path, &reason);
                self.metrics.record_upload_failure();
                self.lock_stats().files_failed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Upload failed, will retry next cycle");
                self.lock_queue().mark_failed(path);
                self.metrics.record_upload_failure();
                self.lock_stats().files_failed += 1;
            }
        }
    }

    /// True when a newly detected file should trigger an immediate drain.
    pub fn should_upload_now(&self) -> bool {
        should_upload_at(&self.snapshot(), Local::now().time())
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, UploadQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, ProcessedRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, RunStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Continuous-mode gate: uploads run any time unless operational hours are
/// enabled, in which case `start..=end` (inclusive) bounds them.
pub fn should_upload_at(config: &Config, now: NaiveTime) -> bool {
    let hours = &config.upload.operational_hours;
    if !hours.enabled {
        return true;
    }
    HhMm::contains(hours.start, hours.end, now)
}

#[async_trait]
impl ReadyHandler for Orchestrator {
    /// Monitor callback: queue the file, drain immediately when allowed,
    /// and report whether the registry now holds the file (continuous mode
    /// uploads it synchronously, so the monitor can skip its own insert).
    async fn on_file_ready(&self, path: &Path) -> bool {
        self.lock_stats().files_detected += 1;
        info!(path = %path.display(), "File ready");

        self.lock_queue().add(path);

        if self.should_upload_now() {
            self.process_queue().await;
        } else {
            info!(
                path = %path.display(),
                "Outside operational hours, leaving queued"
            );
        }

        match FileIdentity::of(path) {
            Ok(identity) => self.lock_registry().contains(&identity),
            Err(_) => false,
        }
    }
}

// ============================================================================
// Bootstrap
// ============================================================================

/// Builds an orchestrator with the production adapters.
///
/// Fatal errors here (unreadable credential, failing metrics startup probe)
/// abort the process with exit code 1.
pub async fn bootstrap(config: Config) -> Result<Arc<Orchestrator>> {
    let metrics = if config.monitoring.cloudwatch_enabled {
        let endpoint = config.monitoring.endpoint.clone().unwrap_or_else(|| {
            format!("https://monitoring.{}.amazonaws.com/metrics", config.s3.region)
        });
        let publisher = Arc::new(HttpMetricsPublisher::new(endpoint)?);
        Arc::new(
            MetricsSink::init(&config.vehicle_id, publisher)
                .await
                .context("metrics are enabled but the startup probe failed")?,
        )
    } else {
        Arc::new(MetricsSink::disabled(&config.vehicle_id))
    };

    let queue = Arc::new(Mutex::new(UploadQueue::open(&config.upload.queue_file)));
    let registry = Arc::new(Mutex::new(ProcessedRegistry::open(
        &config.upload.processed_files_registry.registry_file,
    )));

    let custodian = Arc::new(DiskCustodian::new(CustodianSettings {
        roots: config.directories(),
        reserved_bytes: (config.disk.reserved_gb * BYTES_PER_GB) as u64,
        warning_threshold: config.disk.warning_threshold,
        critical_threshold: config.disk.critical_threshold,
    }));

    let credential = load_credential(&config.s3.credentials_path)?;
    let store = Arc::new(HttpObjectStore::new(
        config.s3.endpoint_url(),
        &config.s3.bucket,
        credential,
    )?);
    let uploader = Arc::new(Uploader::new(
        store,
        ObjectKeyBuilder::new(&config.vehicle_id),
        config.upload.max_retries,
    ));

    Ok(Orchestrator::new(
        config, queue, registry, custodian, uploader, metrics,
    ))
}

#[cfg(test)]
mod tests {
    use fleetlog_core::config::{Config, OperationalHours, Schedule};

    use super::*;

    fn base_config() -> Config {
        let yaml = r#"
vehicle_id: vehicle-001
log_directories:
  - /var/log/vehicle
s3:
  bucket: fleet-logs
  region: cn-north-1
  credentials_path: /etc/fleetlog/token
upload:
  schedule: "03:30"
  queue_file: /var/lib/fleetlog/queue.json
  processed_files_registry:
    registry_file: /var/lib/fleetlog/registry.json
"#;
        serde_yaml::from_str(yaml).expect("parse base config")
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn uploads_unrestricted_when_hours_disabled() {
        let config = base_config();
        assert!(!config.upload.operational_hours.enabled);
        assert!(should_upload_at(&config, t(0, 0)));
        assert!(should_upload_at(&config, t(12, 0)));
        assert!(should_upload_at(&config, t(23, 59)));
    }

    #[test]
    fn uploads_gated_by_enabled_hours() {
        let mut config = base_config();
        config.upload.operational_hours = OperationalHours {
            enabled: true,
            start: "09:00".parse().unwrap(),
            end: "18:00".parse().unwrap(),
        };
        assert!(!should_upload_at(&config, t(8, 59)));
        assert!(should_upload_at(&config, t(9, 0)));
        assert!(should_upload_at(&config, t(13, 30)));
        assert!(should_upload_at(&config, t(18, 0)));
        assert!(!should_upload_at(&config, t(18, 1)));
    }

    #[test]
    fn schedule_variants_parse_into_expected_modes() {
        let config = base_config();
        assert!(matches!(config.upload.schedule, Schedule::Daily(_)));
    }
}
