//! Client side of `POST /api/chat`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::relay::{ChatReply, ChatRequest, ErrorBody};

/// Where the bundled front-end expects the relay.
pub const DEFAULT_RELAY_ENDPOINT: &str = "http://localhost:3001/api/chat";

/// Longer than the relay's own upstream timeout, so a slow provider surfaces
/// as the relay's 500 rather than a client-side timeout.
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Error)]
pub enum RelayClientError {
    #[error("could not reach the relay: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("relay answered {status}: {}", .error.as_deref().unwrap_or("no error message"))]
    Status { status: u16, error: Option<String> },

    #[error("relay response rejected: {0}")]
    Rejected(String),
}

/// Sends one user message to the relay and yields the reply text.
#[async_trait]
pub trait RelayClient: Send + Sync {
    async fn send(&self, message: &str) -> Result<String, RelayClientError>;
}

/// [`RelayClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRelayClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpRelayClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: DEFAULT_RELAY_TIMEOUT,
        }
    }

    /// Caps how long one `send` may wait for the relay.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for HttpRelayClient {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_ENDPOINT)
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn send(&self, message: &str) -> Result<String, RelayClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&ChatRequest {
                message: Some(message.to_owned()),
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let error = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .map(|e| e.error);
            return Err(RelayClientError::Status {
                status: status.as_u16(),
                error,
            });
        }

        match serde_json::from_slice::<ChatReply>(&body) {
            Ok(ChatReply { reply }) if !reply.is_empty() => Ok(reply),
            _ => Err(RelayClientError::Rejected(
                serde_json::from_slice::<ErrorBody>(&body)
                    .map(|e| e.error)
                    .unwrap_or_else(|_| "unexpected response shape".to_owned()),
            )),
        }
    }
}
