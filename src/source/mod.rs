//! Host information sources.
//!
//! The pipeline only needs three read-only questions answered: which apps are
//! installed, what the host looks like, and which processes of a given set of
//! apps are running. [`HostInfoSource`] is that seam; [`OsqueryClient`] is the
//! production implementation.

pub mod osquery;
mod queries;
pub mod types;

use async_trait::async_trait;

pub use osquery::{find_osqueryi, OsqueryClient, OsqueryConfig};
pub use types::{AppInfo, OsPlatform, ProcessInfo, SystemInfo, UnsupportedPlatform};

/// Errors returned by an information source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// No usable osquery install was found
    #[error("osquery not found: {0}")]
    NotFound(String),
    /// The query process could not be started
    #[error("failed to run osquery: {0}")]
    Spawn(#[from] std::io::Error),
    /// osquery ran but reported a failure
    #[error("{context}: osquery exited with {status}: {stderr}")]
    QueryFailed {
        context: &'static str,
        status: String,
        stderr: String,
    },
    /// The query did not finish in time
    #[error("{context}: query timed out after {secs}s")]
    Timeout { context: &'static str, secs: u64 },
    /// osquery output could not be decoded
    #[error("{context}: malformed osquery output: {message}")]
    Malformed {
        context: &'static str,
        message: String,
    },
    /// A query that must return a row returned none
    #[error("{0}: no rows returned")]
    Empty(&'static str),
    #[error(transparent)]
    Platform(#[from] UnsupportedPlatform),
}

/// Read-only access to host state.
#[async_trait]
pub trait HostInfoSource: Send + Sync {
    /// All installed applications.
    async fn app_inventory(&self) -> Result<Vec<AppInfo>, SourceError>;

    /// Operating system, uptime and network identity of the host.
    async fn system_info(&self) -> Result<SystemInfo, SourceError>;

    /// Running processes belonging to any of `bundle_ids`.
    async fn running_processes(&self, bundle_ids: &[String])
        -> Result<Vec<ProcessInfo>, SourceError>;
}
