//! osark agent - host telemetry for the osark server.
//!
//! The agent periodically asks osquery about the host (installed apps,
//! running processes of tracked apps, system facts) and ships the answers to
//! the osark server in size- or time-bounded batches.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         osark agent                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Source    │──▶│   Sampler   │──▶│ Dispatcher  │         │
//! │  │  (osquery)  │   │  (1s tick)  │   │ (batch/1s)  │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │                                             │                │
//! │                                             ▼                │
//! │                    ┌─────────────┐   ┌─────────────┐         │
//! │                    │   Stats     │◀──│    Sink     │         │
//! │                    │             │   │   (HTTP)    │         │
//! │                    └─────────────┘   └─────────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use osark_agent::{AgentConfig, HttpSink, HostInfoSource, OsqueryClient, Pipeline};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = AgentConfig::load()?;
//! let source = Arc::new(OsqueryClient::new(config.osquery_config())?);
//! let sink = Arc::new(HttpSink::new(config.server(), &source.system_info().await?)?);
//!
//! let mut pipeline = Pipeline::new(config.pipeline(), source, sink)?;
//! pipeline.start()?;
//! // ... later
//! pipeline.stop(config.shutdown_timeout()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod event;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{AgentConfig, ConfigError};
pub use event::{EventKind, LogEvent};
pub use pipeline::{
    BatchAccumulator, Pipeline, PipelineConfig, PipelineError, PipelineState, TrackingPolicy,
};
pub use sink::{DeliverySink, HttpSink, ServerConfig, SinkError};
pub use source::{
    AppInfo, HostInfoSource, OsqueryClient, ProcessInfo, SourceError, SystemInfo,
};
pub use stats::{PipelineStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What the agent sends, shown by `osark disclosure`.
pub const DATA_DISCLOSURE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║                OSARK AGENT - DATA DISCLOSURE                     ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent reports host telemetry to your osark server.         ║
║                                                                  ║
║  ✓ WHAT WE SEND:                                                 ║
║    • Installed applications (name, bundle id, version, path)     ║
║    • Running processes of tracked applications                   ║
║    • OS name, version, architecture and uptime                   ║
║    • Errors encountered while sampling or delivering             ║
║                                                                  ║
║  ✗ WHAT WE NEVER SEND:                                           ║
║    • File contents or documents                                  ║
║    • Processes of untracked applications                         ║
║    • Keystrokes, screen content or network traffic               ║
║                                                                  ║
║  Your device is identified by a SHA-256 hash of the OS name,     ║
║  architecture and MAC address. The raw MAC is only sent as part  ║
║  of the one-time system info.                                    ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
