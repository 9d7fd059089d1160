//! HTTP object-store adapter
//!
//! Implements the [`ObjectStore`] port against the upload gateway's REST
//! API. Small objects are stored with a single `PUT`; large objects go
//! through a session: `POST {key}?session` returns a session URL, parts are
//! `PUT` against it with `Content-Range` headers, and the session completes
//! when the final byte range is accepted.
//!
//! Authentication is a bearer credential read from the path configured as
//! `s3.credentials_path`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fleetlog_core::ports::object_store::{ObjectStore, PartRange, StoreError};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

/// Connect timeout for gateway requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response from opening an upload session.
#[derive(Debug, Deserialize)]
struct SessionResponse {
    /// URL that subsequent part uploads target.
    session_url: String,
}

/// Reads the bearer credential from the configured credentials file.
pub fn load_credential(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read credentials file {}", path.display()))?;
    let token = raw.trim();
    if token.is_empty() {
        anyhow::bail!("credentials file {} is empty", path.display());
    }
    Ok(token.to_string())
}

/// HTTP client for the object-store gateway.
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    credential: String,
}

impl HttpObjectStore {
    /// Creates a client for `bucket` behind `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            credential: credential.into(),
        })
    }

    /// Authenticated request builder for an object path.
    fn request(&self, method: Method, key: &str) -> RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.bucket, key);
        self.client
            .request(method, url)
            .bearer_auth(&self.credential)
    }

    /// Maps a response status to the port's error taxonomy.
    async fn check(response: Response, key: &str) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let err = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Auth { status: code },
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                StoreError::Throttled { status: code }
            }
            s if s.is_server_error() => StoreError::Server { status: code },
            StatusCode::BAD_REQUEST => StoreError::InvalidKey {
                key: key.to_string(),
            },
            _ => {
                let message = response.text().await.unwrap_or_default();
                StoreError::Rejected {
                    status: code,
                    message,
                }
            }
        };
        warn!(key, status = code, error = %err, "Gateway rejected request");
        Err(err)
    }

    fn transport(e: reqwest::Error) -> StoreError {
        if e.is_timeout() {
            StoreError::Timeout {
                seconds: CONNECT_TIMEOUT.as_secs(),
            }
        } else {
            StoreError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<(), StoreError> {
        debug!(key, bytes = body.len(), "Putting object");
        let response = self
            .request(Method::PUT, key)
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response, key).await?;
        Ok(())
    }

    async fn create_session(&self, key: &str, total_len: u64) -> Result<String, StoreError> {
        debug!(key, total_len, "Opening upload session");
        let response = self
            .request(Method::POST, &format!("{key}?session"))
            .json(&serde_json::json!({ "content_length": total_len }))
            .send()
            .await
            .map_err(Self::transport)?;
        let response = Self::check(response, key).await?;
        let session: SessionResponse = response.json().await.map_err(Self::transport)?;
        Ok(session.session_url)
    }

    async fn put_part(
        &self,
        session_url: &str,
        range: PartRange,
        body: Vec<u8>,
    ) -> Result<(), StoreError> {
        debug!(
            session_url,
            range = %range.content_range(),
            "Uploading part"
        );
        let response = self
            .client
            .put(session_url)
            .bearer_auth(&self.credential)
            .header("Content-Range", range.content_range())
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response, session_url).await?;
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
        let response = self
            .request(Method::HEAD, key)
            .send()
            .await
            .map_err(Self::transport)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::check(response, key).await?;
        Ok(true)
    }
}
