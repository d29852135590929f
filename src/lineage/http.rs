//! HTTP client for an external lineage service.
//!
//! Events are POSTed as JSON to a single endpoint. The service replies with
//! `{ "node_id": "..." }` for every accepted event.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::event::{LineageAck, LineageEvent};
use super::recorder::LineageRecorder;
use crate::error::LineageError;

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Lineage recorder backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpLineageRecorder {
    client: Client,
    endpoint: String,
}

impl HttpLineageRecorder {
    /// Creates a recorder for `endpoint` with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns `LineageError::Request` if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, LineageError> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a recorder for `endpoint` with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns `LineageError::Request` if the HTTP client cannot be built.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LineageError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LineageError::Request(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// The endpoint events are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LineageRecorder for HttpLineageRecorder {
    async fn record(&self, event: &LineageEvent) -> Result<LineageAck, LineageError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await
            .map_err(|e| LineageError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LineageError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let ack: LineageAck = response
            .json()
            .await
            .map_err(|e| LineageError::InvalidResponse(e.to_string()))?;

        if ack.node_id.is_empty() {
            return Err(LineageError::InvalidResponse(
                "empty node_id in acknowledgement".to_string(),
            ));
        }

        Ok(ack)
    }
}
