//! Consumer that batches events and hands them to the sink.

use crate::event::LogEvent;
use crate::pipeline::BatchAccumulator;
use crate::sink::DeliverySink;
use crate::stats::SharedStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Why a batch left the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushReason {
    /// The batch reached capacity
    Capacity,
    /// The flush timer elapsed
    Timer,
    /// The hand-off channel closed
    Shutdown,
}

impl FlushReason {
    fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Capacity => "capacity",
            FlushReason::Timer => "timer",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

pub(crate) struct Dispatcher {
    sink: Arc<dyn DeliverySink>,
    events: mpsc::UnboundedReceiver<LogEvent>,
    batch: BatchAccumulator,
    interval: Duration,
    stats: SharedStats,
}

impl Dispatcher {
    pub(crate) fn new(
        sink: Arc<dyn DeliverySink>,
        events: mpsc::UnboundedReceiver<LogEvent>,
        batch: BatchAccumulator,
        interval: Duration,
        stats: SharedStats,
    ) -> Self {
        Self {
            sink,
            events,
            batch,
            interval,
            stats,
        }
    }

    /// Batch and deliver until the channel closes, then flush what is left.
    pub(crate) async fn run(mut self) {
        info!(
            interval = ?self.interval,
            batch_size = self.batch.capacity(),
            "dispatcher started"
        );
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = self.events.recv() => match received {
                    Some(event) => {
                        if let Some(batch) = self.batch.push(event) {
                            self.deliver(batch, FlushReason::Capacity).await;
                        }
                    }
                    None => {
                        let batch = self.batch.drain();
                        if !batch.is_empty() {
                            self.deliver(batch, FlushReason::Shutdown).await;
                        }
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let batch = self.batch.drain();
                    if !batch.is_empty() {
                        self.deliver(batch, FlushReason::Timer).await;
                    }
                }
            }
        }

        info!("dispatcher stopped");
    }

    /// One delivery attempt. Failures are reported, never retried.
    async fn deliver(&self, batch: Vec<LogEvent>, reason: FlushReason) {
        let count = batch.len();
        match self.sink.deliver(&batch).await {
            Ok(()) => {
                self.stats.record_batch_delivered(count);
                debug!(events = count, reason = reason.as_str(), "batch delivered");
            }
            Err(e) => {
                self.stats.record_delivery_failure();
                warn!(error = %e, events = count, reason = reason.as_str(), "batch delivery failed");

                let message = format!("failed to deliver batch of {count} events: {e}");
                if let Err(report_err) = self.sink.report_error(&message).await {
                    self.stats.record_report_failed();
                    error!(
                        error = %report_err,
                        delivery_error = %e,
                        "failed to report delivery failure"
                    );
                }
            }
        }
    }
}
