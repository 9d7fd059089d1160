//! Configuration module for Fleetlog.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, defaults, and validation. Validation collects every
//! problem into a list rather than stopping at the first, so an operator can
//! fix a config file in one pass.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::clock::HhMm;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration for the Fleetlog agent.
///
/// A loaded `Config` is an immutable snapshot: hot reload parses and
/// validates a fresh instance and atomically replaces the active one, so no
/// consumer ever observes a partially updated configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Vehicle identifier; becomes the first segment of every object key and
    /// the `VehicleId` metrics dimension.
    pub vehicle_id: String,
    /// Directories to watch for finished log files.
    pub log_directories: Vec<DirectoryEntry>,
    /// Object store connection settings.
    pub s3: StoreConfig,
    /// Upload scheduling and queue settings.
    pub upload: UploadConfig,
    /// Retention and cleanup policies.
    #[serde(default)]
    pub deletion: DeletionConfig,
    /// Disk space thresholds.
    #[serde(default)]
    pub disk: DiskConfig,
    /// Fleet monitoring settings.
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// A watched directory: either a bare path string or a full spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirectoryEntry {
    Path(PathBuf),
    Spec(DirectorySpec),
}

impl DirectoryEntry {
    /// Normalizes the entry into a [`DirectorySpec`].
    pub fn spec(&self) -> DirectorySpec {
        match self {
            DirectoryEntry::Path(p) => DirectorySpec {
                path: p.clone(),
                source: None,
                pattern: None,
                recursive: false,
            },
            DirectoryEntry::Spec(s) => s.clone(),
        }
    }
}

/// Full specification of a watched directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySpec {
    pub path: PathBuf,
    /// Optional logical source name; inserted into object keys when set.
    #[serde(default)]
    pub source: Option<String>,
    /// Optional glob restricting which filenames are picked up (and which
    /// may be deleted by age-based and emergency cleanup).
    #[serde(default)]
    pub pattern: Option<String>,
    /// Watch subdirectories as well.
    #[serde(default)]
    pub recursive: bool,
}

/// Object store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub bucket: String,
    pub region: String,
    /// File holding the bearer credential for the upload gateway.
    pub credentials_path: PathBuf,
    /// Base URL override; defaults to the regional gateway endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl StoreConfig {
    /// Resolved gateway base URL.
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

/// Upload scheduling, stability, and queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Daily `HH:MM` schedule or interval mode.
    pub schedule: Schedule,
    /// Seconds a file's size must remain unchanged before it is uploaded.
    #[serde(default = "default_stable_seconds")]
    pub file_stable_seconds: u64,
    /// Wall-clock window during which continuous uploads are allowed.
    #[serde(default)]
    pub operational_hours: OperationalHours,
    /// Path of the persistent upload queue.
    pub queue_file: PathBuf,
    /// Processed-file registry settings.
    pub processed_files_registry: RegistryConfig,
    /// Drain whatever survived the previous run right after startup.
    #[serde(default = "default_true")]
    pub upload_on_start: bool,
    /// One-shot scan of pre-existing files at startup.
    #[serde(default)]
    pub scan_existing_files: ScanConfig,
    /// Maximum files handed to one upload batch.
    #[serde(default = "default_batch_files")]
    pub max_batch_files: usize,
    /// Maximum attempts per upload call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Upload schedule: a daily wall-clock time or a repeat interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schedule {
    Daily(HhMm),
    Interval(IntervalSchedule),
}

/// Interval-mode schedule: fire every `hours:minutes` after start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalSchedule {
    /// Must be the literal string `interval`.
    pub mode: String,
    #[serde(default)]
    pub interval_hours: u64,
    #[serde(default)]
    pub interval_minutes: u64,
}

impl IntervalSchedule {
    /// Total period in minutes.
    pub fn period_minutes(&self) -> u64 {
        self.interval_hours * 60 + self.interval_minutes
    }
}

/// Operational hours restricting continuous-mode uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalHours {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_day_start")]
    pub start: HhMm,
    #[serde(default = "default_day_end")]
    pub end: HhMm,
}

impl Default for OperationalHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: default_day_start(),
            end: default_day_end(),
        }
    }
}

/// Processed-file registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub registry_file: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

/// Startup scan of files that existed before the agent started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_scan_age_days")]
    pub max_age_days: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age_days: default_scan_age_days(),
        }
    }
}

/// Retention and cleanup policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    #[serde(default)]
    pub after_upload: AfterUploadConfig,
    #[serde(default)]
    pub age_based: AgeBasedConfig,
    #[serde(default)]
    pub emergency: EmergencyConfig,
    /// Minutes between deferred-deletion sweeps.
    #[serde(default = "default_deferred_interval")]
    pub deferred_interval_minutes: u64,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            after_upload: AfterUploadConfig::default(),
            age_based: AgeBasedConfig::default(),
            emergency: EmergencyConfig::default(),
            deferred_interval_minutes: default_deferred_interval(),
        }
    }
}

/// Deferred deletion of uploaded files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfterUploadConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Days to keep a file on disk after upload; 0 deletes on the next sweep.
    #[serde(default)]
    pub keep_days: u32,
}

impl Default for AfterUploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keep_days: 0,
        }
    }
}

/// Age-based cleanup of pattern-matching files, uploaded or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeBasedConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_age_days")]
    pub max_age_days: u32,
    #[serde(default = "default_cleanup_time")]
    pub schedule_time: HhMm,
}

impl Default for AgeBasedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age_days: default_age_days(),
            schedule_time: default_cleanup_time(),
        }
    }
}

/// Last-resort reclamation that may delete unreplicated data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmergencyConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Disk space thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Minimum free space to maintain, in GiB.
    #[serde(default = "default_reserved_gb")]
    pub reserved_gb: f64,
    /// Usage fraction that triggers a warning log.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    /// Usage fraction considered critical.
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            reserved_gb: default_reserved_gb(),
            warning_threshold: default_warning_threshold(),
            critical_threshold: default_critical_threshold(),
        }
    }
}

/// Fleet monitoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub cloudwatch_enabled: bool,
    /// Minutes between metric publishes.
    #[serde(default = "default_metrics_interval")]
    pub interval_minutes: u64,
    /// Ingest endpoint override.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            cloudwatch_enabled: false,
            interval_minutes: default_metrics_interval(),
            endpoint: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_stable_seconds() -> u64 {
    60
}
fn default_batch_files() -> usize {
    10
}
fn default_max_retries() -> u32 {
    10
}
fn default_retention_days() -> u32 {
    30
}
fn default_scan_age_days() -> u32 {
    7
}
fn default_age_days() -> u32 {
    14
}
fn default_deferred_interval() -> u64 {
    60
}
fn default_metrics_interval() -> u64 {
    5
}
fn default_reserved_gb() -> f64 {
    10.0
}
fn default_warning_threshold() -> f64 {
    0.90
}
fn default_critical_threshold() -> f64 {
    0.95
}
fn default_day_start() -> HhMm {
    HhMm::MIDNIGHT
}
fn default_day_end() -> HhMm {
    HhMm::LAST_MINUTE
}
fn default_cleanup_time() -> HhMm {
    HhMm::clamped(2, 0)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Loads configuration from a YAML file at `path`.
    ///
    /// Parsing errors (including malformed `HH:MM` strings) surface here;
    /// semantic constraints are checked separately by [`Config::validate`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config file {}: {e}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Loads and validates in one step, rendering validation errors into a
    /// single failure. This is what startup and hot reload call.
    pub fn load_validated(path: &Path) -> anyhow::Result<Self> {
        let config = Self::load(path)?;
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("invalid configuration: {joined}");
        }
    }

    /// Normalized directory specs for all watched directories.
    pub fn directories(&self) -> Vec<DirectorySpec> {
        self.log_directories.iter().map(DirectoryEntry::spec).collect()
    }

    /// The directory spec whose path contains `file`, if any.
    pub fn directory_for(&self, file: &Path) -> Option<DirectorySpec> {
        self.directories()
            .into_iter()
            .find(|spec| file.starts_with(&spec.path))
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"disk.critical_threshold"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

impl Config {
    /// Validates the configuration and returns all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.vehicle_id.trim().is_empty() {
            errors.push(err("vehicle_id", "must be a non-empty string"));
        }

        if self.log_directories.is_empty() {
            errors.push(err("log_directories", "must contain at least one entry"));
        }
        for (i, entry) in self.log_directories.iter().enumerate() {
            let spec = entry.spec();
            if spec.path.as_os_str().is_empty() {
                errors.push(err(
                    &format!("log_directories[{i}].path"),
                    "must be a non-empty path",
                ));
            }
            if let Some(pattern) = &spec.pattern {
                if glob::Pattern::new(pattern).is_err() {
                    errors.push(err(
                        &format!("log_directories[{i}].pattern"),
                        format!("invalid glob pattern '{pattern}'"),
                    ));
                }
            }
        }

        if self.s3.bucket.trim().is_empty() {
            errors.push(err("s3.bucket", "must be a non-empty string"));
        }
        if self.s3.region.trim().is_empty() {
            errors.push(err("s3.region", "cannot be empty"));
        }
        if self.s3.credentials_path.as_os_str().is_empty() {
            errors.push(err("s3.credentials_path", "must be a non-empty path"));
        }

        match &self.upload.schedule {
            Schedule::Daily(_) => {}
            Schedule::Interval(interval) => {
                if interval.mode != "interval" {
                    errors.push(err(
                        "upload.schedule.mode",
                        format!("expected 'interval', got '{}'", interval.mode),
                    ));
                }
                if interval.interval_minutes > 59 {
                    errors.push(err(
                        "upload.schedule.interval_minutes",
                        "must be in range 0..=59",
                    ));
                }
                if interval.period_minutes() == 0 {
                    errors.push(err(
                        "upload.schedule",
                        "interval must be longer than zero minutes",
                    ));
                }
            }
        }

        if self.upload.file_stable_seconds == 0 {
            errors.push(err("upload.file_stable_seconds", "must be at least 1"));
        }
        if self.upload.queue_file.as_os_str().is_empty() {
            errors.push(err("upload.queue_file", "must be a non-empty path"));
        }
        if self
            .upload
            .processed_files_registry
            .registry_file
            .as_os_str()
            .is_empty()
        {
            errors.push(err(
                "upload.processed_files_registry.registry_file",
                "must be a non-empty path",
            ));
        }
        if self.upload.processed_files_registry.retention_days == 0 {
            errors.push(err(
                "upload.processed_files_registry.retention_days",
                "must be at least 1",
            ));
        }
        if self.upload.max_batch_files == 0 {
            errors.push(err("upload.max_batch_files", "must be at least 1"));
        }
        if self.upload.max_retries == 0 {
            errors.push(err("upload.max_retries", "must be at least 1"));
        }
        if self.upload.operational_hours.enabled
            && self.upload.operational_hours.end < self.upload.operational_hours.start
        {
            errors.push(err(
                "upload.operational_hours",
                "end must not be earlier than start",
            ));
        }

        if self.deletion.age_based.enabled && self.deletion.age_based.max_age_days == 0 {
            errors.push(err("deletion.age_based.max_age_days", "must be at least 1"));
        }
        if self.deletion.deferred_interval_minutes == 0 {
            errors.push(err(
                "deletion.deferred_interval_minutes",
                "must be at least 1",
            ));
        }

        if self.disk.reserved_gb <= 0.0 {
            errors.push(err("disk.reserved_gb", "must be positive"));
        }
        if !(0.0 < self.disk.warning_threshold && self.disk.warning_threshold < 1.0) {
            errors.push(err(
                "disk.warning_threshold",
                "must be between 0 and 1 exclusive",
            ));
        }
        if !(0.0 < self.disk.critical_threshold && self.disk.critical_threshold < 1.0) {
            errors.push(err(
                "disk.critical_threshold",
                "must be between 0 and 1 exclusive",
            ));
        }
        if self.disk.critical_threshold <= self.disk.warning_threshold {
            errors.push(err(
                "disk.critical_threshold",
                format!(
                    "critical threshold ({}) must exceed warning threshold ({})",
                    self.disk.critical_threshold, self.disk.warning_threshold
                ),
            ));
        }

        if self.monitoring.interval_minutes == 0 {
            errors.push(err("monitoring.interval_minutes", "must be at least 1"));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const FULL_YAML: &str = r#"
vehicle_id: vehicle-001
log_directories:
  - /var/log/vehicle
  - path: /var/log/system
    source: syslog
    pattern: "syslog.[1-9]*"
    recursive: true
s3:
  bucket: fleet-logs
  region: cn-north-1
  credentials_path: /etc/fleetlog/token
upload:
  schedule: "03:30"
  file_stable_seconds: 60
  operational_hours:
    enabled: true
    start: "09:00"
    end: "18:00"
  queue_file: /var/lib/fleetlog/queue.json
  processed_files_registry:
    registry_file: /var/lib/fleetlog/registry.json
    retention_days: 30
  upload_on_start: true
  scan_existing_files:
    enabled: true
    max_age_days: 7
deletion:
  after_upload:
    enabled: true
    keep_days: 14
  age_based:
    enabled: true
    max_age_days: 30
    schedule_time: "02:00"
  emergency:
    enabled: true
disk:
  reserved_gb: 70
  warning_threshold: 0.90
  critical_threshold: 0.95
monitoring:
  cloudwatch_enabled: false
"#;

    fn load_str(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).expect("parse config")
    }

    #[test]
    fn full_config_parses() {
        let cfg = load_str(FULL_YAML);
        assert_eq!(cfg.vehicle_id, "vehicle-001");
        assert_eq!(cfg.log_directories.len(), 2);

        let dirs = cfg.directories();
        assert_eq!(dirs[0].path, PathBuf::from("/var/log/vehicle"));
        assert!(dirs[0].pattern.is_none());
        assert!(!dirs[0].recursive);
        assert_eq!(dirs[1].source.as_deref(), Some("syslog"));
        assert_eq!(dirs[1].pattern.as_deref(), Some("syslog.[1-9]*"));
        assert!(dirs[1].recursive);

        assert!(matches!(cfg.upload.schedule, Schedule::Daily(t) if t.to_string() == "03:30"));
        assert!(cfg.upload.operational_hours.enabled);
        assert_eq!(cfg.upload.file_stable_seconds, 60);
        assert_eq!(cfg.upload.max_batch_files, 10);
        assert_eq!(cfg.upload.max_retries, 10);
        assert!(cfg.deletion.after_upload.enabled);
        assert_eq!(cfg.deletion.after_upload.keep_days, 14);
        assert_eq!(cfg.disk.reserved_gb, 70.0);
        assert!(!cfg.monitoring.cloudwatch_enabled);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn interval_schedule_parses() {
        let yaml = FULL_YAML.replace(
            "schedule: \"03:30\"",
            "schedule:\n    mode: interval\n    interval_hours: 2\n    interval_minutes: 30",
        );
        let cfg = load_str(&yaml);
        match &cfg.upload.schedule {
            Schedule::Interval(iv) => {
                assert_eq!(iv.interval_hours, 2);
                assert_eq!(iv.interval_minutes, 30);
                assert_eq!(iv.period_minutes(), 150);
            }
            other => panic!("expected interval schedule, got {other:?}"),
        }
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(FULL_YAML.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.s3.bucket, "fleet-logs");
        assert!(Config::load_validated(tmp.path()).is_ok());
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(Config::load(Path::new("/nonexistent/fleetlog.yaml")).is_err());
    }

    #[test]
    fn load_invalid_yaml_fails() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"vehicle_id: [unterminated").unwrap();
        tmp.flush().unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn invalid_schedule_time_fails_at_parse() {
        let yaml = FULL_YAML.replace("\"03:30\"", "\"25:99\"");
        assert!(serde_yaml::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn validate_catches_empty_vehicle_id() {
        let mut cfg = load_str(FULL_YAML);
        cfg.vehicle_id = "  ".into();
        assert!(cfg.validate().iter().any(|e| e.field == "vehicle_id"));
    }

    #[test]
    fn validate_catches_empty_directories() {
        let mut cfg = load_str(FULL_YAML);
        cfg.log_directories.clear();
        assert!(cfg.validate().iter().any(|e| e.field == "log_directories"));
    }

    #[test]
    fn validate_catches_bad_glob_pattern() {
        let mut cfg = load_str(FULL_YAML);
        cfg.log_directories[0] = DirectoryEntry::Spec(DirectorySpec {
            path: PathBuf::from("/var/log"),
            source: None,
            pattern: Some("[".into()),
            recursive: false,
        });
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "log_directories[0].pattern"));
    }

    #[test]
    fn validate_catches_empty_region() {
        let mut cfg = load_str(FULL_YAML);
        cfg.s3.region = String::new();
        assert!(cfg.validate().iter().any(|e| e.field == "s3.region"));
    }

    #[test]
    fn validate_catches_zero_stability() {
        let mut cfg = load_str(FULL_YAML);
        cfg.upload.file_stable_seconds = 0;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "upload.file_stable_seconds"));
    }

    #[test]
    fn validate_catches_zero_retention() {
        let mut cfg = load_str(FULL_YAML);
        cfg.upload.processed_files_registry.retention_days = 0;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "upload.processed_files_registry.retention_days"));
    }

    #[test]
    fn validate_catches_threshold_ordering() {
        let mut cfg = load_str(FULL_YAML);
        cfg.disk.warning_threshold = 0.95;
        cfg.disk.critical_threshold = 0.90;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "disk.critical_threshold"));
    }

    #[test]
    fn validate_catches_threshold_range() {
        let mut cfg = load_str(FULL_YAML);
        cfg.disk.critical_threshold = 1.5;
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "disk.critical_threshold" && e.message.contains("between")));
    }

    #[test]
    fn validate_catches_negative_reserved() {
        let mut cfg = load_str(FULL_YAML);
        cfg.disk.reserved_gb = 0.0;
        assert!(cfg.validate().iter().any(|e| e.field == "disk.reserved_gb"));
    }

    #[test]
    fn validate_catches_zero_interval() {
        let mut cfg = load_str(FULL_YAML);
        cfg.upload.schedule = Schedule::Interval(IntervalSchedule {
            mode: "interval".into(),
            interval_hours: 0,
            interval_minutes: 0,
        });
        assert!(cfg.validate().iter().any(|e| e.field == "upload.schedule"));
    }

    #[test]
    fn validate_catches_wrong_interval_mode() {
        let mut cfg = load_str(FULL_YAML);
        cfg.upload.schedule = Schedule::Interval(IntervalSchedule {
            mode: "cron".into(),
            interval_hours: 1,
            interval_minutes: 0,
        });
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "upload.schedule.mode"));
    }

    #[test]
    fn validate_catches_inverted_operational_hours() {
        let mut cfg = load_str(FULL_YAML);
        cfg.upload.operational_hours.start = "18:00".parse().unwrap();
        cfg.upload.operational_hours.end = "09:00".parse().unwrap();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "upload.operational_hours"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = load_str(FULL_YAML);
        cfg.vehicle_id = String::new();
        cfg.s3.bucket = String::new();
        cfg.upload.max_batch_files = 0;
        let errors = cfg.validate();
        assert!(errors.len() >= 3, "expected several errors: {errors:?}");
    }

    #[test]
    fn directory_for_maps_file_to_spec() {
        let cfg = load_str(FULL_YAML);
        let spec = cfg
            .directory_for(Path::new("/var/log/system/syslog.1"))
            .expect("spec for syslog file");
        assert_eq!(spec.source.as_deref(), Some("syslog"));
        assert!(cfg.directory_for(Path::new("/opt/elsewhere/x.log")).is_none());
    }

    #[test]
    fn endpoint_defaults_to_regional_url() {
        let cfg = load_str(FULL_YAML);
        assert_eq!(cfg.s3.endpoint_url(), "https://s3.cn-north-1.amazonaws.com");

        let mut custom = cfg;
        custom.s3.endpoint = Some("http://127.0.0.1:9000/".into());
        assert_eq!(custom.s3.endpoint_url(), "http://127.0.0.1:9000");
    }

    #[test]
    fn validation_error_display() {
        let e = ValidationError {
            field: "disk.reserved_gb".into(),
            message: "must be positive".into(),
        };
        assert_eq!(e.to_string(), "disk.reserved_gb: must be positive");
    }
}
