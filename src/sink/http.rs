//! HTTP sink for the osark server.
//!
//! Batches are posted as a JSON array to `{server_url}/api/events`. Every
//! request carries an `Identifier` header derived from host facts, so the
//! server can group events per device without the agent holding credentials.

use crate::event::LogEvent;
use crate::sink::{DeliverySink, SinkError};
use crate::source::SystemInfo;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL of the server, e.g. `http://127.0.0.1:3000`
    pub url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Get the event ingest endpoint URL.
    pub fn events_url(&self) -> String {
        format!("{}/api/events", self.base_url())
    }
}

/// Stable device identifier: hex SHA-256 of OS name, architecture and MAC.
pub fn device_id(info: &SystemInfo) -> String {
    let material = format!("{}-{}-{}", info.os_name, info.os_arch, info.mac_address);
    hex::encode(Sha256::digest(material.as_bytes()))
}

/// Sink that posts batches to the osark server.
pub struct HttpSink {
    config: ServerConfig,
    client: reqwest::Client,
    device_id: String,
}

impl HttpSink {
    /// Create a new sink identified by the given host.
    pub fn new(config: ServerConfig, system_info: &SystemInfo) -> Result<Self, SinkError> {
        let parsed = reqwest::Url::parse(&config.url)
            .map_err(|e| SinkError::Config(format!("invalid server url '{}': {e}", config.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SinkError::Config(format!(
                "unsupported url scheme '{}'",
                parsed.scheme()
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("osark-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SinkError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            device_id: device_id(system_info),
        })
    }

    /// Get the device ID.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    async fn post(&self, events: &[LogEvent]) -> Result<(), SinkError> {
        let body =
            serde_json::to_vec(events).map_err(|e| SinkError::Serialization(e.to_string()))?;

        let response = self
            .client
            .post(self.config.events_url())
            .header("Content-Type", "application/json")
            .header("Identifier", &self.device_id)
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SinkError::Server {
                status: status.as_u16(),
                message,
            });
        }

        debug!(events = events.len(), "batch accepted");
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for HttpSink {
    async fn deliver(&self, batch: &[LogEvent]) -> Result<(), SinkError> {
        self.post(batch).await
    }

    async fn report_error(&self, message: &str) -> Result<(), SinkError> {
        self.post(&[LogEvent::error(message)]).await
    }
}
