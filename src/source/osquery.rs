//! osquery-backed information source.
//!
//! Each query runs a short-lived `osqueryi --json` process. This avoids
//! holding an extension socket open for the lifetime of the agent and keeps
//! the agent usable on hosts where only the interactive shell is installed.

use crate::source::queries;
use crate::source::types::{AppInfo, OsPlatform, ProcessInfo, SystemInfo};
use crate::source::{HostInfoSource, SourceError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Configuration for the osquery client.
#[derive(Debug, Clone)]
pub struct OsqueryConfig {
    /// Explicit path to `osqueryi`; discovered when unset
    pub binary: Option<PathBuf>,
    /// Upper bound for a single query
    pub query_timeout: Duration,
}

impl Default for OsqueryConfig {
    fn default() -> Self {
        Self {
            binary: None,
            query_timeout: Duration::from_secs(10),
        }
    }
}

/// Well-known install locations of `osqueryi`, per platform.
fn install_locations(platform: OsPlatform) -> Vec<PathBuf> {
    let paths: &[&str] = match platform {
        OsPlatform::Darwin => &[
            "/usr/local/bin/osqueryi",
            "/opt/homebrew/bin/osqueryi",
            "/opt/osquery/bin/osqueryi",
        ],
        OsPlatform::Linux => &[
            "/usr/bin/osqueryi",
            "/usr/local/bin/osqueryi",
            "/opt/osquery/bin/osqueryi",
        ],
        OsPlatform::Windows => &[r"C:\Program Files\osquery\osqueryi.exe"],
    };
    paths.iter().map(PathBuf::from).collect()
}

/// Locate the `osqueryi` binary for the current platform.
///
/// Checks the well-known install locations first, then `PATH`.
pub fn find_osqueryi() -> Result<PathBuf, SourceError> {
    let platform = OsPlatform::current()?;
    find_osqueryi_in(&install_locations(platform), std::env::var_os("PATH"))
}

fn find_osqueryi_in(
    candidates: &[PathBuf],
    path_var: Option<OsString>,
) -> Result<PathBuf, SourceError> {
    if let Some(found) = candidates.iter().find(|p| p.is_file()) {
        return Ok(found.clone());
    }

    let exe = if cfg!(windows) { "osqueryi.exe" } else { "osqueryi" };
    if let Some(path_var) = path_var {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(exe);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }

    Err(SourceError::NotFound(format!(
        "looked in {} well-known locations and PATH",
        candidates.len()
    )))
}

/// One result row. osquery reports every column as a string.
struct Row(Map<String, Value>);

impl Row {
    fn get(&self, column: &str) -> String {
        match self.0.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

fn parse_rows(context: &'static str, stdout: &[u8]) -> Result<Vec<Row>, SourceError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let rows: Vec<Map<String, Value>> =
        serde_json::from_slice(stdout).map_err(|e| SourceError::Malformed {
            context,
            message: e.to_string(),
        })?;
    Ok(rows.into_iter().map(Row).collect())
}

/// Information source that shells out to `osqueryi`.
#[derive(Debug, Clone)]
pub struct OsqueryClient {
    binary: PathBuf,
    query_timeout: Duration,
}

impl OsqueryClient {
    /// Create a client, discovering `osqueryi` unless a path is configured.
    pub fn new(config: OsqueryConfig) -> Result<Self, SourceError> {
        let binary = match config.binary {
            Some(path) if path.is_file() => path,
            Some(path) => {
                return Err(SourceError::NotFound(format!(
                    "{} does not exist",
                    path.display()
                )))
            }
            None => find_osqueryi()?,
        };
        Ok(Self {
            binary,
            query_timeout: config.query_timeout,
        })
    }

    /// Path of the binary used for queries.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn query(&self, context: &'static str, sql: &str) -> Result<Vec<Row>, SourceError> {
        debug!(context, "running osquery");
        let mut command = Command::new(&self.binary);
        command
            .arg("--json")
            .arg(sql)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.query_timeout, command.output())
            .await
            .map_err(|_| SourceError::Timeout {
                context,
                secs: self.query_timeout.as_secs(),
            })??;

        if !output.status.success() {
            return Err(SourceError::QueryFailed {
                context,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_rows(context, &output.stdout)
    }

    async fn first_row(&self, context: &'static str, sql: &str) -> Result<Row, SourceError> {
        self.query(context, sql)
            .await?
            .into_iter()
            .next()
            .ok_or(SourceError::Empty(context))
    }
}

fn app_from_row(row: &Row) -> AppInfo {
    AppInfo {
        name: row.get("display_name"),
        bundle_name: row.get("bundle_name"),
        bundle_id: row.get("bundle_identifier"),
        bundle_version: row.get("bundle_version"),
        path: row.get("path"),
        last_opened_time: AppInfo::parse_last_opened(&row.get("last_opened_time")),
    }
}

fn process_from_row(row: &Row) -> ProcessInfo {
    ProcessInfo {
        pid: row.get("pid"),
        name: row.get("name"),
        bundle_id: row.get("bundle_identifier"),
        bundle_version: row.get("bundle_version"),
        path: row.get("path"),
    }
}

#[async_trait]
impl HostInfoSource for OsqueryClient {
    async fn app_inventory(&self) -> Result<Vec<AppInfo>, SourceError> {
        let rows = self.query("failed to get apps", queries::APPS).await?;
        Ok(rows.iter().map(app_from_row).collect())
    }

    async fn system_info(&self) -> Result<SystemInfo, SourceError> {
        let (os, uptime, mac, version) = tokio::try_join!(
            self.first_row("failed to get system info", queries::OS_VERSION),
            self.first_row("failed to get uptime", queries::UPTIME),
            self.first_row("failed to get mac address", queries::MAC_ADDRESS),
            self.first_row("failed to get osquery version", queries::OSQUERY_VERSION),
        )?;

        let raw_uptime = uptime.get("total_seconds");
        let uptime_seconds = raw_uptime
            .trim()
            .parse::<u64>()
            .map_err(|e| SourceError::Malformed {
                context: "failed to parse uptime seconds",
                message: format!("{raw_uptime:?}: {e}"),
            })?;

        Ok(SystemInfo {
            os_name: os.get("name"),
            os_version: os.get("version"),
            os_arch: os.get("arch"),
            uptime_seconds,
            mac_address: mac.get("mac"),
            osquery_version: version.get("version"),
        })
    }

    async fn running_processes(
        &self,
        bundle_ids: &[String],
    ) -> Result<Vec<ProcessInfo>, SourceError> {
        if bundle_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = queries::running_processes(bundle_ids);
        let rows = self
            .query("failed to get current running processes", &sql)
            .await?;
        Ok(rows.iter().map(process_from_row).collect())
    }
}
