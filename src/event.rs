//! Events produced by the sampler and shipped to the server.

use crate::source::{AppInfo, ProcessInfo, SystemInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an event observed. Serialized with an `intent` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum EventKind {
    /// Inventory and host facts, sent once the sampler initializes
    Init {
        app_info: Vec<AppInfo>,
        system_info: SystemInfo,
    },
    /// Processes of tracked apps running at sample time
    RunningProcesses { processes: Vec<ProcessInfo> },
    /// A failure, either while sampling or while delivering
    Error { error: String },
}

/// A single observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl LogEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            kind,
        }
    }

    pub fn init(app_info: Vec<AppInfo>, system_info: SystemInfo) -> Self {
        Self::new(EventKind::Init {
            app_info,
            system_info,
        })
    }

    pub fn running_processes(processes: Vec<ProcessInfo>) -> Self {
        Self::new(EventKind::RunningProcesses { processes })
    }

    pub fn error(error: impl std::fmt::Display) -> Self {
        Self::new(EventKind::Error {
            error: error.to_string(),
        })
    }

    /// Wire name of the event's intent.
    pub fn intent(&self) -> &'static str {
        match self.kind {
            EventKind::Init { .. } => "init",
            EventKind::RunningProcesses { .. } => "running_processes",
            EventKind::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, EventKind::Error { .. })
    }
}
