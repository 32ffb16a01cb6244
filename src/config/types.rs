//! Configuration type definitions.

use super::error::{ConfigError, ConfigResult};
use crate::modules::access_control::RuleSet;
use crate::modules::entry_store::{Entry, EntryTarget};
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for dropgate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DropgateConfig {
    /// HTTP listener configuration.
    pub server: ServerConfig,

    /// External lookup sources.
    pub lookup: LookupConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Entries loaded into the store at startup.
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
}

/// Server section configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_address: IpAddr,

    /// Listen port.
    pub port: u16,

    /// Directory holding uploaded files.
    pub upload_dir: PathBuf,

    /// Honor X-Forwarded-For and X-Real-IP.
    pub trust_proxy_headers: bool,

    /// Peers allowed to set proxy headers (CIDR). Empty trusts every peer.
    pub trusted_proxies: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 8080,
            upload_dir: PathBuf::from("uploads"),
            trust_proxy_headers: false,
            trusted_proxies: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Listen address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Parsed trusted proxy networks.
    pub fn trusted_proxy_networks(&self) -> ConfigResult<Vec<IpNet>> {
        self.trusted_proxies
            .iter()
            .map(|proxy| {
                proxy.parse::<IpNet>().map_err(|e| ConfigError::InvalidValue {
                    field: "server.trusted_proxies".to_string(),
                    message: format!("{proxy}: {e}"),
                })
            })
            .collect()
    }
}

/// Lookup source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// MaxMind City database for geofence rules.
    pub geo_database: Option<PathBuf>,

    /// ipcat CSV file for category rules.
    pub ipcat_csv: Option<PathBuf>,

    /// Use the system DNS resolver for hostname and pattern rules.
    pub dns: bool,

    /// Per-lookup timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            geo_database: None,
            ipcat_csv: None,
            dns: true,
            timeout_ms: 2000,
        }
    }
}

impl LookupConfig {
    /// Per-lookup timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: LogLevel,

    /// Log format (json, pretty, compact).
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level (default).
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level (least verbose).
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable).
    Json,
    /// Pretty format with colors (default).
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
}

/// An entry seeded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Entry name.
    pub name: String,

    /// What the entry serves.
    #[serde(flatten)]
    pub target: EntryTarget,

    /// Rule text, one rule per line.
    #[serde(default)]
    pub rules: String,

    /// Start in training mode.
    #[serde(default)]
    pub training: bool,

    /// Expire after this many granted requests.
    #[serde(default)]
    pub access_limit: Option<u64>,

    /// Expire at this instant (RFC 3339 string).
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl EntryConfig {
    /// Build the store entry.
    #[must_use]
    pub fn to_entry(&self) -> Entry {
        let mut entry = Entry::new(self.name.clone(), self.target.clone())
            .with_rules(RuleSet::parse(&self.rules))
            .with_training(self.training);
        entry.access_limit = self.access_limit;
        entry.expires_at = self.expires_at;
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DropgateConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.lookup.timeout(), Duration::from_secs(2));
        assert!(config.lookup.dns);
        assert!(config.entries.is_empty());
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_str = r#"
            [server]
            port = 9090
        "#;

        let config: DropgateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(
            config.server.socket_addr(),
            "127.0.0.1:9090".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_bad_proxy_network() {
        let mut config = DropgateConfig::default();
        config.server.trusted_proxies = vec!["10.0.0.0/33".to_string()];
        assert!(matches!(
            config.server.trusted_proxy_networks(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [server]
            bind_address = "0.0.0.0"
            port = 8000
            upload_dir = "/srv/uploads"
            trust_proxy_headers = true
            trusted_proxies = ["10.0.0.0/8"]

            [lookup]
            geo_database = "/usr/share/GeoIP/GeoLite2-City.mmdb"
            ipcat_csv = "/usr/share/ipcat/datacenters.csv"
            timeout_ms = 500

            [logging]
            level = "debug"
            format = "json"

            [[entries]]
            name = "report"
            type = "file"
            filename = "a1b2c3"
            content_type = "application/pdf"
            rules = """
            !*
            10.0.0.0/8 # office
            """

            [[entries]]
            name = "docs"
            type = "redirect"
            url = "https://example.com/docs"
            access_limit = 3
            expires_at = "2030-01-01T00:00:00Z"

            [[entries]]
            name = "status"
            type = "proxy"
            url = "http://127.0.0.1:3000/status"
            training = true
        "#;

        let config: DropgateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.trusted_proxies, vec!["10.0.0.0/8"]);
        assert_eq!(config.server.trusted_proxy_networks().unwrap().len(), 1);
        assert_eq!(config.lookup.timeout(), Duration::from_millis(500));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.entries.len(), 3);

        let report = config.entries[0].to_entry();
        assert_eq!(report.rules.len(), 2);
        assert_eq!(report.target.content_type(), "application/pdf");

        let docs = config.entries[1].to_entry();
        assert_eq!(docs.access_limit, Some(3));
        assert!(docs.expires_at.is_some());
        assert!(matches!(docs.target, EntryTarget::Redirect { .. }));

        let status = config.entries[2].to_entry();
        assert!(status.training);
        assert!(matches!(status.target, EntryTarget::Proxy { .. }));
    }
}
