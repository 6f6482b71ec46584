//! Timer-driven producer of host events.

use crate::event::LogEvent;
use crate::pipeline::TrackingPolicy;
use crate::source::{HostInfoSource, SourceError};
use crate::stats::SharedStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) struct Sampler {
    source: Arc<dyn HostInfoSource>,
    policy: TrackingPolicy,
    /// Tracked bundle ids. `None` until initialization succeeds; never
    /// changed afterwards.
    tracked: Option<Vec<String>>,
    interval: Duration,
    events: mpsc::UnboundedSender<LogEvent>,
    shutdown: CancellationToken,
    stats: SharedStats,
}

impl Sampler {
    pub(crate) fn new(
        source: Arc<dyn HostInfoSource>,
        policy: TrackingPolicy,
        interval: Duration,
        events: mpsc::UnboundedSender<LogEvent>,
        shutdown: CancellationToken,
        stats: SharedStats,
    ) -> Self {
        Self {
            source,
            policy,
            tracked: None,
            interval,
            events,
            shutdown,
            stats,
        }
    }

    /// Sample until cancelled. Dropping `self` on return closes the channel.
    pub(crate) async fn run(mut self) {
        info!(interval = ?self.interval, "sampler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let event = self.sample().await;

                    // Stop was issued while the query was in flight.
                    if self.shutdown.is_cancelled() {
                        debug!(intent = event.intent(), "discarding sample finished after stop");
                        break;
                    }

                    if event.is_error() {
                        self.stats.record_sample_error();
                    }
                    if self.events.send(event).is_err() {
                        warn!("dispatcher is gone, stopping sampler");
                        break;
                    }
                    self.stats.record_event_sampled();
                }
            }
        }

        info!("sampler stopped");
    }

    /// Produce exactly one event for this tick.
    async fn sample(&mut self) -> LogEvent {
        let result = if let Some(ids) = &self.tracked {
            self.source
                .running_processes(ids)
                .await
                .map(LogEvent::running_processes)
        } else {
            self.initialize().await
        };

        result.unwrap_or_else(|e| {
            warn!(error = %e, "sample failed");
            LogEvent::error(e)
        })
    }

    async fn initialize(&mut self) -> Result<LogEvent, SourceError> {
        let apps = self.source.app_inventory().await?;
        let system_info = self.source.system_info().await?;
        let tracked = self.policy.select(&apps);

        info!(
            apps = apps.len(),
            tracked = tracked.len(),
            "sampler initialized"
        );
        debug!(?tracked, "tracked bundle ids");

        self.tracked = Some(tracked);
        Ok(LogEvent::init(apps, system_info))
    }
}
