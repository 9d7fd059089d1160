//! Object key layout
//!
//! Keys follow `{vehicle_id}/{YYYY-MM-DD}/{source/}{basename}`, with the
//! date rendered in UTC so a fleet spanning timezones lands in consistent
//! day buckets. The optional source segment comes from the watched
//! directory's configuration.

use std::path::Path;

use chrono::{DateTime, Utc};

/// Builds object keys for one vehicle.
#[derive(Debug, Clone)]
pub struct ObjectKeyBuilder {
    vehicle_id: String,
}

impl ObjectKeyBuilder {
    pub fn new(vehicle_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
        }
    }

    /// Key for `path`, dated `when` (UTC).
    ///
    /// Files without a usable basename (`..`, root) fall back to the full
    /// lossy path string; this should not happen for watched files.
    pub fn key_for(&self, path: &Path, source: Option<&str>, when: DateTime<Utc>) -> String {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let date = when.format("%Y-%m-%d");
        match source {
            Some(source) => format!("{}/{}/{}/{}", self.vehicle_id, date, source, basename),
            None => format!("{}/{}/{}", self.vehicle_id, date, basename),
        }
    }
}
