//! Object store port (driven/secondary port)
//!
//! Interface to the remote store that receives log artifacts. The primary
//! implementation is an HTTP gateway adapter, but the trait is deliberately
//! narrow so tests can substitute in-memory fakes and so a different backend
//! can be slotted in without touching upload logic.
//!
//! Transfers above the multipart threshold go through a session: the caller
//! opens one with [`ObjectStore::create_session`], then streams fixed-size
//! parts with [`ObjectStore::put_part`]. The session completes when the final
//! byte range is accepted.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by an object store adapter.
///
/// The split between transient and permanent classes drives the uploader's
/// retry loop: transient errors are retried with backoff, permanent errors
/// abort the upload and remove the work item from the queue.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection-level failure: reset, refused, DNS, broken pipe.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request exceeded the per-attempt wall cap.
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The store asked us to slow down (408/429).
    #[error("throttled by store (status {status})")]
    Throttled { status: u16 },

    /// Server-side failure (5xx).
    #[error("server error (status {status})")]
    Server { status: u16 },

    /// Credentials were rejected (401/403). Retrying cannot help.
    #[error("authorization rejected (status {status})")]
    Auth { status: u16 },

    /// The object key was rejected as malformed.
    #[error("invalid object key: {key}")]
    InvalidKey { key: String },

    /// Any other definitive rejection (remaining 4xx).
    #[error("store rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl StoreError {
    /// True for error classes worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Transport(_)
                | StoreError::Timeout { .. }
                | StoreError::Throttled { .. }
                | StoreError::Server { .. }
        )
    }
}

/// Byte range of one part within a session transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartRange {
    /// Offset of the first byte of this part.
    pub start: u64,
    /// Offset of the last byte of this part (inclusive).
    pub end: u64,
    /// Total object length in bytes.
    pub total: u64,
}

impl PartRange {
    /// Renders the range as an HTTP `Content-Range` value.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }

    /// True when this part carries the final byte of the object.
    pub fn is_last(&self) -> bool {
        self.end + 1 == self.total
    }
}

/// Port trait for object store operations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores a small object in a single request.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Opens a session for a chunked transfer; returns the session URL.
    async fn create_session(&self, key: &str, total_len: u64) -> Result<String, StoreError>;

    /// Uploads one part of a session transfer.
    ///
    /// The session completes implicitly when the part covering the final
    /// byte range is accepted.
    async fn put_part(
        &self,
        session_url: &str,
        range: PartRange,
        body: Vec<u8>,
    ) -> Result<(), StoreError>;

    /// Probes whether an object exists under `key`.
    async fn object_exists(&self, key: &str) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Transport("connection reset".into()).is_transient());
        assert!(StoreError::Timeout { seconds: 300 }.is_transient());
        assert!(StoreError::Throttled { status: 429 }.is_transient());
        assert!(StoreError::Server { status: 503 }.is_transient());

        assert!(!StoreError::Auth { status: 403 }.is_transient());
        assert!(!StoreError::InvalidKey { key: "a//b".into() }.is_transient());
        assert!(!StoreError::Rejected {
            status: 404,
            message: "no such bucket".into()
        }
        .is_transient());
    }

    #[test]
    fn part_range_content_range_header() {
        let range = PartRange {
            start: 0,
            end: 5_242_879,
            total: 10_485_760,
        };
        assert_eq!(range.content_range(), "bytes 0-5242879/10485760");
        assert!(!range.is_last());

        let last = PartRange {
            start: 5_242_880,
            end: 10_485_759,
            total: 10_485_760,
        };
        assert!(last.is_last());
    }
}
