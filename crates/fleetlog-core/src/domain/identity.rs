//! Content identity for uploaded files
//!
//! A [`FileIdentity`] captures `(path, size, mtime)` at the moment a file is
//! detected. The processed-file registry is keyed by this triple, so a file
//! recreated under the same name with different contents is treated as new
//! and uploaded again, while a restart never re-uploads an unchanged file.

use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// Identity of a file as observed at detection time.
///
/// Equality over all three fields is what gives the registry its
/// at-most-once-upload semantics across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Size in bytes at detection.
    pub size: u64,
    /// Modification time at detection, as whole seconds since the epoch.
    pub mtime_secs: i64,
}

impl FileIdentity {
    /// Builds the identity of an existing file by statting it.
    ///
    /// # Errors
    /// Returns the underlying I/O error if the file cannot be statted
    /// (typically because it vanished between detection and this call).
    pub fn of(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime_secs = match meta.modified()?.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            // Pre-epoch mtimes show up on badly set producer clocks.
            Err(e) => -(e.duration().as_secs() as i64),
        };
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            mtime_secs,
        })
    }

    /// Encodes the identity as a registry key string.
    ///
    /// Format: `<path>|<size>|<mtime_secs>`. Paths containing `|` are not
    /// expected on the vehicles this agent targets; the last two fields are
    /// parsed from the right so such paths still round-trip.
    pub fn encode(&self) -> String {
        format!("{}|{}|{}", self.path.display(), self.size, self.mtime_secs)
    }

    /// Decodes a registry key string back into an identity.
    ///
    /// Returns `None` for malformed keys (wrong field count, non-numeric
    /// size or mtime).
    pub fn decode(key: &str) -> Option<Self> {
        let (rest, mtime) = key.rsplit_once('|')?;
        let (path, size) = rest.rsplit_once('|')?;
        if path.is_empty() {
            return None;
        }
        Some(Self {
            path: PathBuf::from(path),
            size: size.parse().ok()?,
            mtime_secs: mtime.parse().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn identity_of_existing_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"hello fleetlog").unwrap();
        tmp.flush().unwrap();

        let id = FileIdentity::of(tmp.path()).unwrap();
        assert_eq!(id.path, tmp.path());
        assert_eq!(id.size, 14);
        assert!(id.mtime_secs > 0);
    }

    #[test]
    fn identity_of_missing_file_fails() {
        let result = FileIdentity::of(Path::new("/nonexistent/fleetlog.log"));
        assert!(result.is_err());
    }

    #[test]
    fn encode_decode_round_trip() {
        let id = FileIdentity {
            path: PathBuf::from("/var/log/vehicle/run_001.mcap"),
            size: 104_857_600,
            mtime_secs: 1_760_000_000,
        };
        let encoded = id.encode();
        assert_eq!(
            encoded,
            "/var/log/vehicle/run_001.mcap|104857600|1760000000"
        );
        assert_eq!(FileIdentity::decode(&encoded), Some(id));
    }

    #[test]
    fn decode_rejects_malformed_keys() {
        assert!(FileIdentity::decode("").is_none());
        assert!(FileIdentity::decode("/only/path").is_none());
        assert!(FileIdentity::decode("/p|12").is_none());
        assert!(FileIdentity::decode("/p|notanumber|5").is_none());
        assert!(FileIdentity::decode("/p|12|notanumber").is_none());
        assert!(FileIdentity::decode("|12|5").is_none());
    }

    #[test]
    fn same_name_different_contents_is_different_identity() {
        let a = FileIdentity {
            path: PathBuf::from("/var/log/syslog.1"),
            size: 100,
            mtime_secs: 1_000,
        };
        let b = FileIdentity {
            path: PathBuf::from("/var/log/syslog.1"),
            size: 250,
            mtime_secs: 2_000,
        };
        assert_ne!(a, b);
        assert_ne!(a.encode(), b.encode());
    }
}
