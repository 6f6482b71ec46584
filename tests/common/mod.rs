//! In-memory source and sink doubles for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use osark_agent::{
    AppInfo, DeliverySink, EventKind, HostInfoSource, LogEvent, ProcessInfo, SinkError,
    SourceError, SystemInfo,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn app(bundle_id: &str) -> AppInfo {
    AppInfo {
        name: bundle_id.to_string(),
        bundle_name: bundle_id.to_string(),
        bundle_id: bundle_id.to_string(),
        bundle_version: "1.0".to_string(),
        path: format!("/Applications/{bundle_id}.app"),
        last_opened_time: None,
    }
}

pub fn system_info() -> SystemInfo {
    SystemInfo {
        os_name: "macOS".to_string(),
        os_version: "14.4".to_string(),
        os_arch: "arm64".to_string(),
        uptime_seconds: 3600,
        mac_address: "aa:bb:cc:dd:ee:ff".to_string(),
        osquery_version: "5.12.1".to_string(),
    }
}

/// Source whose process samples carry an increasing sequence number as pid.
pub struct FakeSource {
    apps: Vec<AppInfo>,
    /// Number of app inventory calls that fail before succeeding
    failing_inits: AtomicUsize,
    sequence: AtomicU64,
    /// Zero-based process query calls that fail
    failing_process_calls: HashSet<u64>,
    /// Time each process query takes
    process_delay: Option<Duration>,
    pub queried_ids: Mutex<Vec<Vec<String>>>,
    panic_on_processes: bool,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            apps: vec![app("com.apple.Safari"), app("com.apple.Notes"), app("")],
            failing_inits: AtomicUsize::new(0),
            sequence: AtomicU64::new(0),
            failing_process_calls: HashSet::new(),
            process_delay: None,
            queried_ids: Mutex::new(Vec::new()),
            panic_on_processes: false,
        }
    }

    pub fn failing_inits(self, count: usize) -> Self {
        self.failing_inits.store(count, Ordering::SeqCst);
        self
    }

    pub fn failing_process_calls(mut self, calls: &[u64]) -> Self {
        self.failing_process_calls = calls.iter().copied().collect();
        self
    }

    pub fn slow_processes(mut self, delay: Duration) -> Self {
        self.process_delay = Some(delay);
        self
    }

    /// Number of process queries started so far.
    pub fn process_calls(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn panicking(mut self) -> Self {
        self.panic_on_processes = true;
        self
    }
}

#[async_trait]
impl HostInfoSource for FakeSource {
    async fn app_inventory(&self) -> Result<Vec<AppInfo>, SourceError> {
        let remaining = self.failing_inits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_inits.store(remaining - 1, Ordering::SeqCst);
            return Err(SourceError::Empty("failed to get apps"));
        }
        Ok(self.apps.clone())
    }

    async fn system_info(&self) -> Result<SystemInfo, SourceError> {
        Ok(system_info())
    }

    async fn running_processes(
        &self,
        bundle_ids: &[String],
    ) -> Result<Vec<ProcessInfo>, SourceError> {
        if self.panic_on_processes {
            panic!("source exploded");
        }
        self.queried_ids.lock().unwrap().push(bundle_ids.to_vec());
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.process_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_process_calls.contains(&seq) {
            return Err(SourceError::Empty("failed to get current running processes"));
        }
        Ok(vec![ProcessInfo {
            pid: seq.to_string(),
            name: "Safari".to_string(),
            bundle_id: "com.apple.Safari".to_string(),
            bundle_version: "1.0".to_string(),
            path: "/Applications/com.apple.Safari.app/Contents/MacOS/Safari".to_string(),
        }])
    }
}

/// Sink that records every call.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<Vec<LogEvent>>>,
    pub reports: Mutex<Vec<String>>,
    fail_deliveries: bool,
    fail_reports: bool,
    /// When set, each delivery waits for a permit before completing
    gate: Option<Arc<Notify>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_deliveries: true,
            ..Self::default()
        }
    }

    pub fn failing_everything() -> Self {
        Self {
            fail_deliveries: true,
            fail_reports: true,
            ..Self::default()
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<LogEvent>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.batches().into_iter().flatten().collect()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, batch: &[LogEvent]) -> Result<(), SinkError> {
        assert!(!batch.is_empty(), "sink must never see an empty batch");
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        if self.fail_deliveries {
            return Err(SinkError::Server {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn report_error(&self, message: &str) -> Result<(), SinkError> {
        self.reports.lock().unwrap().push(message.to_string());
        if self.fail_reports {
            return Err(SinkError::Network("connection refused".to_string()));
        }
        Ok(())
    }
}

/// Sequence number carried by a running-processes event.
pub fn sequence(event: &LogEvent) -> Option<u64> {
    match &event.kind {
        EventKind::RunningProcesses { processes } => processes.first()?.pid.parse().ok(),
        _ => None,
    }
}
