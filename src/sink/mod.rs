//! Delivery sinks for completed batches.

pub mod http;

use crate::event::LogEvent;
use async_trait::async_trait;

pub use http::{device_id, HttpSink, ServerConfig};

/// Sink error types.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Configuration error
    #[error("sink config error: {0}")]
    Config(String),
    /// Network/HTTP error
    #[error("sink network error: {0}")]
    Network(String),
    /// Server returned an error response
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    /// JSON serialization error
    #[error("sink serialization error: {0}")]
    Serialization(String),
}

/// Destination for batches of events.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Deliver one batch. Called with non-empty batches only.
    async fn deliver(&self, batch: &[LogEvent]) -> Result<(), SinkError>;

    /// Report a failure that has no batch of its own, such as a failed delivery.
    async fn report_error(&self, message: &str) -> Result<(), SinkError>;
}
