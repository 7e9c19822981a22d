//! Configuration loading for rendezvous-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`). Every
//! section and field has a default, so an empty file is a valid config.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for rendezvous-relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerConfig,
    /// Certificate and key material.
    pub tls: TlsConfig,
    /// Timeouts and capacity limits.
    pub limits: LimitsConfig,
    /// Periodic status reporter.
    pub status: StatusConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind (empty = all interfaces).
    pub ip: String,
    /// Port to bind (default: 9000).
    pub port: u16,
    /// Verbose logging (default: false).
    pub debug: bool,
}

/// Certificate and key material, as PEM files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// CA that issued the relay certificate (default: certs/relay-ca.pem).
    pub ca_path: PathBuf,
    /// Relay certificate chain (default: certs/relay/cert.pem).
    pub cert_path: PathBuf,
    /// Relay private key (default: certs/relay/key.pem).
    pub key_path: PathBuf,
    /// CA that party certificates must chain to. Falls back to `ca_path`.
    pub peer_ca_path: Option<PathBuf>,
}

/// Timeouts and capacity limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Seconds allowed for the TLS handshake, and again for reading the
    /// authorization request (default: 10).
    pub handshake_timeout_secs: u64,
    /// Seconds allowed for each side of the ready exchange (default: 10).
    pub ready_timeout_secs: u64,
    /// Seconds a connection may wait for its peer before it is evicted
    /// (default: 300, 0 = wait forever).
    pub pending_timeout_secs: u64,
    /// Maximum number of connections waiting for a peer (default: 10000).
    pub max_pending: usize,
}

/// Periodic status reporter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Report interval in seconds (default: 5).
    pub interval_secs: u64,
    /// Enable the reporter (default: true).
    pub enabled: bool,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address for the HTTP server (default: 0.0.0.0:9080).
    pub bind_address: String,
    /// Serve /health and /metrics (default: false).
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: 9000,
            debug: false,
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_path: PathBuf::from("certs/relay-ca.pem"),
            cert_path: PathBuf::from("certs/relay/cert.pem"),
            key_path: PathBuf::from("certs/relay/key.pem"),
            peer_ca_path: None,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 10,
            ready_timeout_secs: 10,
            pending_timeout_secs: 300,
            max_pending: 10_000,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            enabled: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9080".to_string(),
            enabled: false,
        }
    }
}

impl ServerConfig {
    /// `ip:port` string handed to the listener.
    pub fn bind_address(&self) -> String {
        let ip = if self.ip.is_empty() { "0.0.0.0" } else { &self.ip };
        format!("{}:{}", ip, self.port)
    }
}

impl TlsConfig {
    /// CA used to verify party certificates.
    pub fn peer_ca(&self) -> &Path {
        self.peer_ca_path.as_deref().unwrap_or(&self.ca_path)
    }
}

impl LimitsConfig {
    /// Deadline for the TLS handshake and for the authorization request.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Per-side ready exchange deadline.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// How long a parked connection may wait, `None` if forever.
    pub fn pending_timeout(&self) -> Option<Duration> {
        (self.pending_timeout_secs > 0).then(|| Duration::from_secs(self.pending_timeout_secs))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load configuration from a TOML file, or use defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!("Config file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address(), "0.0.0.0:9000");
        assert_eq!(config.limits.handshake_timeout(), Duration::from_secs(10));
        assert!(config.status.enabled);
        assert!(!config.http.enabled);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[server]
ip = "127.0.0.1"
port = 9443
debug = true

[tls]
ca_path = "/etc/relay/ca.pem"
cert_path = "/etc/relay/cert.pem"
key_path = "/etc/relay/key.pem"
peer_ca_path = "/etc/relay/parties-ca.pem"

[limits]
pending_timeout_secs = 0
max_pending = 64

[status]
interval_secs = 30
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_address(), "127.0.0.1:9443");
        assert!(config.server.debug);
        assert_eq!(config.tls.peer_ca(), Path::new("/etc/relay/parties-ca.pem"));
        assert_eq!(config.limits.pending_timeout(), None);
        assert_eq!(config.limits.max_pending, 64);
        assert_eq!(config.limits.ready_timeout_secs, 10);
        assert_eq!(config.status.interval_secs, 30);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.limits.pending_timeout(),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn peer_ca_falls_back_to_relay_ca() {
        let config = Config::default();
        assert_eq!(config.tls.peer_ca(), Path::new("certs/relay-ca.pem"));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
