//! Shared harness for daemon integration tests.
//!
//! Builds an orchestrator over temp directories with an in-memory object
//! store fake whose failure mode can be switched per test.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tempfile::TempDir;

use fleetlog_core::config::{
    Config, DirectoryEntry, DiskConfig, MonitoringConfig, OperationalHours, RegistryConfig,
    ScanConfig, Schedule, StoreConfig, UploadConfig,
};
use fleetlog_core::ports::object_store::{ObjectStore, PartRange, StoreError};
use fleetlog_custodian::{CustodianSettings, DiskCustodian};
use fleetlog_daemon::orchestrator::Orchestrator;
use fleetlog_state::queue::UploadQueue;
use fleetlog_state::registry::ProcessedRegistry;
use fleetlog_store::{ObjectKeyBuilder, Uploader};
use fleetlog_telemetry::MetricsSink;

/// Failure mode of the fake store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Succeed,
    Transient,
    Permanent,
}

/// In-memory object store recording successful puts.
pub struct FakeStore {
    mode: Mutex<StoreMode>,
    keys: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(StoreMode::Succeed),
            keys: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: StoreMode) {
        *self.mode.lock().unwrap_or_else(PoisonError::into_inner) = mode;
    }

    pub fn keys(&self) -> Vec<String> {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn attempt(&self, key: &str) -> Result<(), StoreError> {
        match *self.mode.lock().unwrap_or_else(PoisonError::into_inner) {
            StoreMode::Succeed => {
                self.keys
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(key.to_string());
                Ok(())
            }
            StoreMode::Transient => Err(StoreError::Server { status: 503 }),
            StoreMode::Permanent => Err(StoreError::Auth { status: 403 }),
        }
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn put_object(&self, key: &str, _body: Vec<u8>) -> Result<(), StoreError> {
        self.attempt(key)
    }

    async fn create_session(&self, key: &str, _total_len: u64) -> Result<String, StoreError> {
        Ok(format!("session://{key}"))
    }

    async fn put_part(
        &self,
        session_url: &str,
        range: PartRange,
        _body: Vec<u8>,
    ) -> Result<(), StoreError> {
        if range.is_last() {
            let key = session_url.trim_start_matches("session://");
            self.attempt(key)
        } else {
            Ok(())
        }
    }

    async fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.keys().iter().any(|k| k == key))
    }
}

/// Test configuration over temp directories; continuous mode, 1 s
/// stability, single-attempt uploads.
pub fn test_config(logs: &Path, state: &Path) -> Config {
    Config {
        vehicle_id: "vehicle-001".into(),
        log_directories: vec![DirectoryEntry::Path(logs.to_path_buf())],
        s3: StoreConfig {
            bucket: "fleet-logs".into(),
            region: "cn-north-1".into(),
            credentials_path: state.join("token"),
            endpoint: None,
        },
        upload: UploadConfig {
            schedule: Schedule::Daily("03:30".parse().expect("valid time")),
            file_stable_seconds: 1,
            operational_hours: OperationalHours::default(),
            queue_file: state.join("queue.json"),
            processed_files_registry: RegistryConfig {
                registry_file: state.join("registry.json"),
                retention_days: 30,
            },
            upload_on_start: false,
            scan_existing_files: ScanConfig::default(),
            max_batch_files: 10,
            max_retries: 1,
        },
        deletion: Default::default(),
        disk: DiskConfig {
            reserved_gb: 1e-9,
            warning_threshold: 0.999_998,
            critical_threshold: 0.999_999,
        },
        monitoring: MonitoringConfig::default(),
    }
}

pub struct Harness {
    pub logs: TempDir,
    pub state: TempDir,
    pub store: Arc<FakeStore>,
    pub agent: Arc<Orchestrator>,
}

/// Builds a full orchestrator over the fake store, applying `customize` to
/// the configuration first.
pub fn harness_with(customize: impl FnOnce(&mut Config)) -> Harness {
    let logs = tempfile::tempdir().expect("logs tempdir");
    let state = tempfile::tempdir().expect("state tempdir");
    let mut config = test_config(logs.path(), state.path());
    customize(&mut config);

    let queue = Arc::new(Mutex::new(UploadQueue::open(&config.upload.queue_file)));
    let registry = Arc::new(Mutex::new(ProcessedRegistry::open(
        &config.upload.processed_files_registry.registry_file,
    )));
    let custodian = Arc::new(DiskCustodian::new(CustodianSettings {
        roots: config.directories(),
        reserved_bytes: 1,
        warning_threshold: config.disk.warning_threshold,
        critical_threshold: config.disk.critical_threshold,
    }));
    let store = FakeStore::new();
    let uploader = Arc::new(Uploader::new(
        store.clone(),
        ObjectKeyBuilder::new(&config.vehicle_id),
        config.upload.max_retries,
    ));
    let metrics = Arc::new(MetricsSink::disabled(&config.vehicle_id));

    let agent = Orchestrator::new(config, queue, registry, custodian, uploader, metrics);
    Harness {
        logs,
        state,
        store,
        agent,
    }
}

pub fn harness() -> Harness {
    harness_with(|_| {})
}
