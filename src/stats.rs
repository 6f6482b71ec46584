//! Pipeline counters.
//!
//! Each counter has exactly one writer (the sampler or the dispatcher), so
//! relaxed atomics are enough; readers only ever see a best-effort snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running totals for one pipeline instance.
#[derive(Debug)]
pub struct PipelineStats {
    /// Events handed to the dispatcher, including error events
    events_sampled: AtomicU64,
    /// Samples that failed and were turned into error events
    sample_errors: AtomicU64,
    /// Batches the sink accepted
    batches_delivered: AtomicU64,
    /// Events inside accepted batches
    events_delivered: AtomicU64,
    /// Batches the sink rejected
    delivery_failures: AtomicU64,
    /// Delivery failures that could not be reported either
    reports_failed: AtomicU64,
    started_at: DateTime<Utc>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            events_sampled: AtomicU64::new(0),
            sample_errors: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            events_delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            reports_failed: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_event_sampled(&self) {
        self.events_sampled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_error(&self) {
        self.sample_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted batch of `events` events.
    pub fn record_batch_delivered(&self, events: usize) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.events_delivered
            .fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_report_failed(&self) {
        self.reports_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_sampled: self.events_sampled.load(Ordering::Relaxed),
            sample_errors: self.sample_errors.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Events sampled: {}\n\
             - Sample errors: {}\n\
             - Batches delivered: {} ({} events)\n\
             - Delivery failures: {}\n\
             - Unreported failures: {}\n\
             - Running for: {} seconds",
            stats.events_sampled,
            stats.sample_errors,
            stats.batches_delivered,
            stats.events_delivered,
            stats.delivery_failures,
            stats.reports_failed,
            stats.uptime_secs
        )
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of pipeline statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub events_sampled: u64,
    pub sample_errors: u64,
    pub batches_delivered: u64,
    pub events_delivered: u64,
    pub delivery_failures: u64,
    pub reports_failed: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// Stats shared between the pipeline tasks and the controller.
pub type SharedStats = Arc<PipelineStats>;
