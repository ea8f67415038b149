//! Peer transport: how an encoded invalidation reaches another node

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use super::types::PeerNode;

/// Why a single delivery attempt failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("peer did not answer within {0:?}")]
    Timeout(Duration),
    #[error("peer unreachable: {0}")]
    Unreachable(String),
    #[error("peer rejected message with status {status}: {reason}")]
    Rejected { status: u16, reason: String },
    #[error("peer failed with status {0}")]
    ServerError(u16),
}

impl DeliveryError {
    /// Transient failures are retried; a 4xx rejection never is, since
    /// resending the same bytes cannot change the verdict.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::Rejected { .. })
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Send one encoded message to a peer's receiver route
    async fn deliver(&self, peer: &PeerNode, body: Bytes) -> Result<(), DeliveryError>;

    /// Cheap liveness check used for DOWN peers
    async fn probe(&self, peer: &PeerNode) -> Result<(), DeliveryError>;
}

/// HTTP transport posting raw message bytes to `{base_url}{endpoint_path}`
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint_path: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint_path: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint_path: endpoint_path.into(),
            timeout,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            DeliveryError::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn deliver(&self, peer: &PeerNode, body: Bytes) -> Result<(), DeliveryError> {
        let url = format!("{}{}", peer.base_url, self.endpoint_path);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status.is_client_error() {
            let reason = response.text().await.unwrap_or_default();
            Err(DeliveryError::Rejected {
                status: status.as_u16(),
                reason: reason.trim().to_string(),
            })
        } else {
            Err(DeliveryError::ServerError(status.as_u16()))
        }
    }

    async fn probe(&self, peer: &PeerNode) -> Result<(), DeliveryError> {
        let url = format!("{}/health", peer.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(DeliveryError::ServerError(response.status().as_u16()))
        }
    }
}
