//! Upload execution with retry and backoff
//!
//! [`Uploader::upload`] transfers one file and returns the object key it was
//! stored under. Transient store errors are retried with exponential backoff
//! capped at [`MAX_BACKOFF_SECS`]; permanent errors abort immediately and
//! surface as [`UploadError::Permanent`], which the orchestrator translates
//! into removal from the queue.
//!
//! Files above [`MULTIPART_THRESHOLD`] are sent through a chunked session
//! with [`PART_SIZE`] parts; smaller files are a single put.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleetlog_core::domain::units::bytes_to_mb;
use fleetlog_core::ports::object_store::{ObjectStore, PartRange, StoreError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::key::ObjectKeyBuilder;

/// Files above this size are transferred in parts.
pub const MULTIPART_THRESHOLD: u64 = 5 * 1024 * 1024;

/// Size of each part in a chunked transfer.
pub const PART_SIZE: u64 = 5 * 1024 * 1024;

/// Backoff ceiling between attempts, in seconds.
pub const MAX_BACKOFF_SECS: u64 = 512;

/// Wall cap on a single attempt; an overrunning transfer is treated as a
/// transient failure and retried.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Terminal upload outcomes.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload can never succeed; the caller must stop retrying this
    /// file and remove it from the queue.
    #[error("permanent upload failure for {path}: {reason}")]
    Permanent { path: PathBuf, reason: String },

    /// Every attempt failed with a transient error; the file stays queued
    /// for the next cycle.
    #[error("upload failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: StoreError },

    /// Something outside the store taxonomy failed (local I/O, poisoned
    /// state). The file stays queued.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

/// Transfers single files to the object store.
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    keys: ObjectKeyBuilder,
    max_retries: u32,
    attempt_timeout: Duration,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, keys: ObjectKeyBuilder, max_retries: u32) -> Self {
        Self {
            store,
            keys,
            max_retries: max_retries.max(1),
            attempt_timeout: ATTEMPT_TIMEOUT,
        }
    }

    /// Overrides the per-attempt wall cap (tests).
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Uploads `path`, returning the object key on success.
    pub async fn upload(&self, path: &Path, source: Option<&str>) -> Result<String, UploadError> {
        let total = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                return Err(UploadError::Permanent {
                    path: path.to_path_buf(),
                    reason: format!("file not readable: {e}"),
                })
            }
        };
        let key = self.keys.key_for(path, source, Utc::now());

        let mut last_transient: Option<StoreError> = None;
        for attempt in 1..=self.max_retries {
            info!(
                path = %path.display(),
                key,
                attempt,
                max = self.max_retries,
                "Uploading ({:.1} MB)",
                bytes_to_mb(total)
            );

            let result =
                tokio::time::timeout(self.attempt_timeout, self.transfer(path, &key, total)).await;
            let error = match result {
                Ok(Ok(())) => {
                    info!(path = %path.display(), key, "Upload complete");
                    return Ok(key);
                }
                Ok(Err(e)) => e,
                Err(_) => StoreError::Timeout {
                    seconds: self.attempt_timeout.as_secs(),
                },
            };

            if !error.is_transient() {
                return Err(UploadError::Permanent {
                    path: path.to_path_buf(),
                    reason: error.to_string(),
                });
            }

            warn!(
                path = %path.display(),
                attempt,
                error = %error,
                "Transient upload failure"
            );
            last_transient = Some(error);
            if attempt < self.max_retries {
                let delay = backoff_delay(attempt);
                debug!(delay_secs = delay.as_secs(), "Backing off before retry");
                tokio::time::sleep(delay).await;
            }
        }

        Err(UploadError::RetriesExhausted {
            attempts: self.max_retries,
            last: last_transient.unwrap_or(StoreError::Transport("no attempts made".into())),
        })
    }

    /// Checks that the object for `path` exists in the store.
    pub async fn verify(&self, path: &Path, source: Option<&str>) -> bool {
        let key = self.keys.key_for(path, source, Utc::now());
        match self.store.object_exists(&key).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!(key, error = %e, "Verification probe failed");
                false
            }
        }
    }

    /// One transfer attempt: single put or chunked session by size.
    /// Uploads run serially per batch; file reads happen inline between
    /// network calls.
    async fn transfer(&self, path: &Path, key: &str, total: u64) -> Result<(), StoreError> {
        use std::io::Read;

        if total <= MULTIPART_THRESHOLD {
            let body = std::fs::read(path)
                .map_err(|e| StoreError::Transport(format!("local read failed: {e}")))?;
            return self.store.put_object(key, body).await;
        }

        let session_url = self.store.create_session(key, total).await?;
        let mut file = std::fs::File::open(path)
            .map_err(|e| StoreError::Transport(format!("local open failed: {e}")))?;

        let mut offset = 0u64;
        while offset < total {
            let part_len = PART_SIZE.min(total - offset);
            let mut body = vec![0u8; part_len as usize];
            file.read_exact(&mut body)
                .map_err(|e| StoreError::Transport(format!("local read failed: {e}")))?;

            let range = PartRange {
                start: offset,
                end: offset + part_len - 1,
                total,
            };
            self.store.put_part(&session_url, range, body).await?;
            offset += part_len;
        }
        Ok(())
    }
}

/// Delay before retrying after attempt `attempt` (1-based):
/// `min(2^(attempt-1), 512)` seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(63);
    let secs = 2u64.saturating_pow(exp).min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[test]
    fn backoff_schedule_doubles_and_caps() {
        let secs: Vec<u64> = (1..=11).map(|a| backoff_delay(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 512]);
    }

    /// Store fake that fails the first `fail_times` calls.
    struct FlakyStore {
        fail_times: u32,
        error_for: fn() -> StoreError,
        calls: AtomicU32,
        stored: Mutex<Vec<String>>,
    }

    impl FlakyStore {
        fn new(fail_times: u32, error_for: fn() -> StoreError) -> Arc<Self> {
            Arc::new(Self {
                fail_times,
                error_for,
                calls: AtomicU32::new(0),
                stored: Mutex::new(Vec::new()),
            })
        }

        fn fail_or_store(&self, key: &str) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err((self.error_for)())
            } else {
                self.stored
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(key.to_string());
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ObjectStore for FlakyStore {
        async fn put_object(&self, key: &str, _body: Vec<u8>) -> Result<(), StoreError> {
            self.fail_or_store(key)
        }

        async fn create_session(&self, key: &str, _total: u64) -> Result<String, StoreError> {
            Ok(format!("session://{key}"))
        }

        async fn put_part(
            &self,
            session_url: &str,
            range: PartRange,
            _body: Vec<u8>,
        ) -> Result<(), StoreError> {
            if range.is_last() {
                self.fail_or_store(session_url)
            } else {
                Ok(())
            }
        }

        async fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
            Ok(self
                .stored
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .any(|k| k.contains(key)))
        }
    }

    fn uploader(store: Arc<FlakyStore>, max_retries: u32) -> Uploader {
        Uploader::new(store, ObjectKeyBuilder::new("vehicle-001"), max_retries)
    }

    fn small_file(dir: &tempfile::TempDir) -> PathBuf {
        let p = dir.path().join("small.log");
        std::fs::write(&p, vec![b'x'; 128]).unwrap();
        p
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_try() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlakyStore::new(0, || StoreError::Server { status: 500 });
        let up = uploader(store.clone(), 10);

        let key = up.upload(&small_file(&dir), None).await.unwrap();
        assert!(key.starts_with("vehicle-001/"));
        assert!(key.ends_with("/small.log"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlakyStore::new(3, || StoreError::Server { status: 503 });
        let up = uploader(store.clone(), 10);

        let key = up.upload(&small_file(&dir), None).await;
        assert!(key.is_ok());
        assert_eq!(store.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_on_persistent_transient_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlakyStore::new(u32::MAX, || StoreError::Transport("reset".into()));
        let up = uploader(store.clone(), 3);

        let err = up.upload(&small_file(&dir), None).await.unwrap_err();
        match err {
            UploadError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RetriesExhausted, got {other}"),
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_aborts_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlakyStore::new(u32::MAX, || StoreError::Auth { status: 403 });
        let up = uploader(store.clone(), 10);

        let err = up.upload(&small_file(&dir), None).await.unwrap_err();
        assert!(matches!(err, UploadError::Permanent { .. }));
        assert_eq!(
            store.calls.load(Ordering::SeqCst),
            1,
            "permanent errors must not be retried"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_file_is_permanent() {
        let store = FlakyStore::new(0, || StoreError::Server { status: 500 });
        let up = uploader(store, 10);

        let err = up
            .upload(Path::new("/nonexistent/gone.log"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Permanent { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn large_file_goes_through_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.mcap");
        // Two full parts plus a 1 KiB tail.
        let total = 2 * PART_SIZE + 1024;
        std::fs::write(&path, vec![b'y'; total as usize]).unwrap();

        let store = FlakyStore::new(0, || StoreError::Server { status: 500 });
        let up = uploader(store.clone(), 10);

        let key = up.upload(&path, Some("bag")).await.unwrap();
        assert!(key.contains("/bag/"));
        let stored = store.stored.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].starts_with("session://"));
    }

    #[tokio::test(start_paused = true)]
    async fn verify_probes_object_presence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FlakyStore::new(0, || StoreError::Server { status: 500 });
        let up = uploader(store.clone(), 10);
        let path = small_file(&dir);

        assert!(!up.verify(&path, None).await);
        up.upload(&path, None).await.unwrap();
        assert!(up.verify(&path, None).await);
    }
}
