//! Host records returned by an information source.
//!
//! These are plain snapshots: the source builds them, the sampler wraps them
//! into events, and nothing mutates them afterwards.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// An installed application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    /// Display name of the app
    pub name: String,
    /// Bundle name (CFBundleName on macOS)
    pub bundle_name: String,
    /// Bundle identifier, e.g. `com.apple.Safari`
    pub bundle_id: String,
    /// Bundle version string
    pub bundle_version: String,
    /// Install path of the app bundle
    pub path: String,
    /// When the app was last opened, if the platform records it
    pub last_opened_time: Option<DateTime<Utc>>,
}

impl AppInfo {
    /// Parse a last-opened value as reported by osquery (fractional unix seconds).
    ///
    /// Returns `None` for empty, unparsable or non-positive values; osquery
    /// reports `-1` for apps that were never opened.
    pub fn parse_last_opened(raw: &str) -> Option<DateTime<Utc>> {
        let secs: f64 = raw.trim().parse().ok()?;
        if !secs.is_finite() || secs <= 0.0 {
            return None;
        }
        let whole = secs.trunc() as i64;
        let nanos = ((secs - secs.trunc()) * 1e9) as u32;
        Utc.timestamp_opt(whole, nanos).single()
    }
}

/// A running process that belongs to a tracked application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: String,
    pub name: String,
    pub bundle_id: String,
    pub bundle_version: String,
    pub path: String,
}

/// Static facts about the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system name, e.g. `macOS`
    pub os_name: String,
    /// Operating system version
    pub os_version: String,
    /// CPU architecture, e.g. `arm64`
    pub os_arch: String,
    /// Whole seconds since boot at the time of the query
    pub uptime_seconds: u64,
    /// MAC address of the first interface that reports one
    pub mac_address: String,
    /// Version of the osquery install answering the queries
    pub osquery_version: String,
}

/// Operating system family the agent runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsPlatform {
    Darwin,
    Linux,
    Windows,
}

impl OsPlatform {
    /// Platform of the running binary.
    pub fn current() -> Result<Self, UnsupportedPlatform> {
        Self::parse(std::env::consts::OS)
    }

    /// Parse a platform name. Accepts both Rust (`macos`) and osquery/Go
    /// (`darwin`) spellings for Apple hosts.
    pub fn parse(name: &str) -> Result<Self, UnsupportedPlatform> {
        match name {
            "darwin" | "macos" => Ok(OsPlatform::Darwin),
            "linux" => Ok(OsPlatform::Linux),
            "windows" => Ok(OsPlatform::Windows),
            other => Err(UnsupportedPlatform(other.to_string())),
        }
    }
}

impl std::fmt::Display for OsPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OsPlatform::Darwin => "darwin",
            OsPlatform::Linux => "linux",
            OsPlatform::Windows => "windows",
        };
        f.write_str(name)
    }
}

/// The host operating system is not one the agent knows how to query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid/unsupported operating system: {0}")]
pub struct UnsupportedPlatform(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_last_opened() {
        let parsed = AppInfo::parse_last_opened("1700000000.5").unwrap();
        assert_eq!(parsed.timestamp(), 1_700_000_000);
        assert_eq!(parsed.timestamp_subsec_millis(), 500);

        assert!(AppInfo::parse_last_opened("-1.0").is_none());
        assert!(AppInfo::parse_last_opened("").is_none());
        assert!(AppInfo::parse_last_opened("yesterday").is_none());
    }

    #[test]
    fn test_uptime_serialized_as_seconds() {
        let info = SystemInfo {
            os_name: "macOS".to_string(),
            os_version: "14.4".to_string(),
            os_arch: "arm64".to_string(),
            uptime_seconds: 3600,
            mac_address: "aa:bb:cc:dd:ee:ff".to_string(),
            osquery_version: "5.12.1".to_string(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["uptime_seconds"], 3600);
    }

    #[test]
    fn test_platform_parsing() {
        assert_eq!(OsPlatform::parse("darwin"), Ok(OsPlatform::Darwin));
        assert_eq!(OsPlatform::parse("macos"), Ok(OsPlatform::Darwin));
        assert_eq!(OsPlatform::parse("linux"), Ok(OsPlatform::Linux));
        assert_eq!(OsPlatform::parse("windows"), Ok(OsPlatform::Windows));
        assert!(OsPlatform::parse("plan9").is_err());
        assert_eq!(OsPlatform::Darwin.to_string(), "darwin");
    }
}
