//! Configuration for the osark agent.

use crate::pipeline::{PipelineConfig, TrackingPolicy};
use crate::sink::ServerConfig;
use crate::source::OsqueryConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base URL of the osark server
    pub server_url: String,

    /// Directory for log files
    pub log_dir: PathBuf,

    /// Seconds between host samples
    pub sample_interval_secs: u64,

    /// Seconds between flushes of a partial batch
    pub flush_interval_secs: u64,

    /// Events per batch before an immediate flush
    pub batch_size: usize,

    /// How long shutdown waits for the final flush. Must cover one
    /// in-flight query plus one delivery request.
    pub shutdown_timeout_secs: u64,

    /// Timeout for a single delivery request
    pub request_timeout_secs: u64,

    /// Which apps' processes are sampled
    pub tracking: TrackingPolicy,

    pub osquery: OsquerySettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("osark-agent");

        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            log_dir: data_dir.join("logs"),
            sample_interval_secs: 1,
            flush_interval_secs: 1,
            batch_size: 100,
            shutdown_timeout_secs: 30,
            request_timeout_secs: 10,
            tracking: TrackingPolicy::default(),
            osquery: OsquerySettings::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AgentConfig = serde_json::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("osark-agent")
            .join("config.json")
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("server_url is not set".to_string()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "server_url must be an http(s) URL, got '{url}'"
            )));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
        }
        for (name, value) in [
            ("sample_interval_secs", self.sample_interval_secs),
            ("flush_interval_secs", self.flush_interval_secs),
            ("request_timeout_secs", self.request_timeout_secs),
            ("osquery.query_timeout_secs", self.osquery.query_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }

        // Stop waits for the sampler's query before the final delivery can start.
        let drain_budget = self
            .osquery
            .query_timeout_secs
            .saturating_add(self.request_timeout_secs);
        if self.shutdown_timeout_secs <= drain_budget {
            return Err(ConfigError::Invalid(format!(
                "shutdown_timeout_secs must exceed osquery.query_timeout_secs + \
                 request_timeout_secs ({drain_budget}), got {}",
                self.shutdown_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            sample_interval: Duration::from_secs(self.sample_interval_secs),
            flush_interval: Duration::from_secs(self.flush_interval_secs),
            batch_size: self.batch_size,
            tracking: self.tracking.clone(),
        }
    }

    pub fn server(&self) -> ServerConfig {
        ServerConfig::new(
            self.server_url.trim(),
            Duration::from_secs(self.request_timeout_secs),
        )
    }

    pub fn osquery_config(&self) -> OsqueryConfig {
        OsqueryConfig {
            binary: self.osquery.binary.clone(),
            query_timeout: Duration::from_secs(self.osquery.query_timeout_secs),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Where to find osquery and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsquerySettings {
    /// Path to `osqueryi`; discovered when unset
    pub binary: Option<PathBuf>,
    pub query_timeout_secs: u64,
}

impl Default for OsquerySettings {
    fn default() -> Self {
        Self {
            binary: None,
            query_timeout_secs: 10,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
