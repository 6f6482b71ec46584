//! Event aggregation and delivery pipeline.
//!
//! ```text
//!  ┌──────────┐  unbounded mpsc   ┌────────────┐  Vec<LogEvent>  ┌──────┐
//!  │ Sampler  │ ────────────────▶ │ Dispatcher │ ──────────────▶ │ Sink │
//!  │ (tick Δs)│                   │ (tick Δf)  │                 └──────┘
//!  └────▲─────┘                   └─────▲──────┘
//!       │ cancel                        │ channel closed
//!  ┌────┴───────────────────────────────┴──────┐
//!  │                 Pipeline                  │
//!  └───────────────────────────────────────────┘
//! ```
//!
//! The sampler owns the only sender. Stopping cancels the sampler, and its
//! exit closes the channel, which is the dispatcher's cue to drain its batch
//! one last time and return.

mod batch;
mod controller;
mod dispatcher;
mod sampler;
mod tracking;

use std::time::Duration;

pub use batch::BatchAccumulator;
pub use controller::Pipeline;
pub use tracking::TrackingPolicy;

/// Tuning for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How often the sampler queries the host
    pub sample_interval: Duration,
    /// How often the dispatcher flushes a partial batch
    pub flush_interval: Duration,
    /// Events per batch before an immediate flush
    pub batch_size: usize,
    /// Which apps' processes are sampled
    pub tracking: TrackingPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            flush_interval: Duration::from_secs(1),
            batch_size: 100,
            tracking: TrackingPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidBatchSize);
        }
        if self.sample_interval.is_zero() {
            return Err(PipelineError::InvalidInterval("sample"));
        }
        if self.flush_interval.is_zero() {
            return Err(PipelineError::InvalidInterval("flush"));
        }
        Ok(())
    }
}

/// Lifecycle of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Created => "created",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Pipeline lifecycle and configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
    #[error("{0} interval must be greater than zero")]
    InvalidInterval(&'static str),
    #[error("pipeline already started")]
    AlreadyStarted,
    #[error("pipeline is not running")]
    NotRunning,
    /// The dispatcher did not confirm its final flush in time. It may still
    /// be running in the background.
    #[error("pipeline did not drain within {0:?}")]
    ShutdownTimeout(Duration),
}
