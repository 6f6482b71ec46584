//! Lifecycle of the sampler and dispatcher tasks.

use crate::pipeline::dispatcher::Dispatcher;
use crate::pipeline::sampler::Sampler;
use crate::pipeline::{BatchAccumulator, PipelineConfig, PipelineError, PipelineState};
use crate::sink::DeliverySink;
use crate::source::HostInfoSource;
use crate::stats::{PipelineStats, SharedStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Owns the sampler and dispatcher tasks.
///
/// `Created → Running → Stopping → Stopped`. A stop that times out leaves the
/// pipeline in `Stopping`; calling [`Pipeline::stop`] again keeps waiting.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn HostInfoSource>,
    sink: Arc<dyn DeliverySink>,
    state: PipelineState,
    shutdown: CancellationToken,
    sampler: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
    stats: SharedStats,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn HostInfoSource>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            sink,
            state: PipelineState::Created,
            shutdown: CancellationToken::new(),
            sampler: None,
            dispatcher: None,
            stats: Arc::new(PipelineStats::new()),
        })
    }

    /// Spawn both tasks and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.state != PipelineState::Created {
            return Err(PipelineError::AlreadyStarted);
        }

        let batch = BatchAccumulator::new(self.config.batch_size)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let sampler = Sampler::new(
            self.source.clone(),
            self.config.tracking.clone(),
            self.config.sample_interval,
            tx,
            self.shutdown.clone(),
            self.stats.clone(),
        );
        let dispatcher = Dispatcher::new(
            self.sink.clone(),
            rx,
            batch,
            self.config.flush_interval,
            self.stats.clone(),
        );

        self.dispatcher = Some(tokio::spawn(dispatcher.run()));
        self.sampler = Some(tokio::spawn(sampler.run()));
        self.state = PipelineState::Running;

        info!(
            sample_interval = ?self.config.sample_interval,
            flush_interval = ?self.config.flush_interval,
            batch_size = self.config.batch_size,
            "pipeline started"
        );
        Ok(())
    }

    /// Stop sampling and wait, up to `timeout`, for the final flush.
    ///
    /// On `Ok`, every event sampled before the call has been delivered or
    /// reported as a delivery failure. On [`PipelineError::ShutdownTimeout`]
    /// no new events are accepted, but the dispatcher may still be delivering.
    pub async fn stop(&mut self, timeout: Duration) -> Result<(), PipelineError> {
        match self.state {
            PipelineState::Created => return Err(PipelineError::NotRunning),
            PipelineState::Stopped => return Ok(()),
            PipelineState::Running | PipelineState::Stopping => {}
        }

        info!("stopping pipeline");
        self.state = PipelineState::Stopping;
        self.shutdown.cancel();

        // The sampler must be gone before the dispatcher can see the channel close.
        let sampler = &mut self.sampler;
        let dispatcher = &mut self.dispatcher;
        let drained = tokio::time::timeout(timeout, async move {
            join_task(sampler, "sampler").await;
            join_task(dispatcher, "dispatcher").await;
        })
        .await;

        match drained {
            Ok(()) => {
                self.state = PipelineState::Stopped;
                info!("pipeline stopped");
                Ok(())
            }
            Err(_) => {
                warn!(?timeout, "pipeline did not drain in time");
                Err(PipelineError::ShutdownTimeout(timeout))
            }
        }
    }

    /// Wait until both tasks have exited, whether or not `stop` was called.
    ///
    /// Returns immediately if the pipeline never started. Cancel-safe.
    pub async fn wait(&mut self) {
        join_task(&mut self.sampler, "sampler").await;
        join_task(&mut self.dispatcher, "dispatcher").await;
        if self.state != PipelineState::Created {
            self.state = PipelineState::Stopped;
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> SharedStats {
        self.stats.clone()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // Detached tasks still drain and flush on their own.
        self.shutdown.cancel();
    }
}

async fn join_task(slot: &mut Option<JoinHandle<()>>, name: &'static str) {
    if let Some(handle) = slot.as_mut() {
        if let Err(e) = handle.await {
            if e.is_panic() {
                error!(task = name, "pipeline task panicked");
            } else {
                warn!(task = name, "pipeline task was cancelled");
            }
        }
        *slot = None;
    }
}
