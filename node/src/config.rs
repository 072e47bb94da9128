//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use burst_network::NetworkTunables;
use burst_types::NetworkId;

use crate::NodeError;

/// Configuration for a peer-transport node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to connect to.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Local address to bind the TCP listener on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port to listen on for peer connections.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to a file holding this node's persistent Ed25519 identity key.
    /// If the file does not exist, a fresh key pair is generated and saved
    /// there. If unset, an ephemeral key pair is used for the process's
    /// lifetime.
    #[serde(default)]
    pub identity_key_path: Option<PathBuf>,

    /// Peer addresses to dial on startup, as `"ip:port"` strings.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    /// Registry caps and housekeeping cadence.
    #[serde(default)]
    pub tunables: NetworkTunables,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to enable the Prometheus metrics registry.
    #[serde(default)]
    pub enable_metrics: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    NetworkId::Dev.default_port()
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            identity_key_path: None,
            bootstrap_peers: Vec::new(),
            tunables: NetworkTunables::default(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.port, config.port);
        assert_eq!(parsed.tunables.max_per_ip, config.tunables.max_per_ip);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.port, 27076);
        assert_eq!(config.log_format, "human");
        assert_eq!(config.tunables.max_per_ip, 8);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            port = 9999
            bootstrap_peers = ["203.0.113.5:7076"]

            [tunables]
            max_per_ip = 16
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.port, 9999);
        assert_eq!(config.bootstrap_peers, vec!["203.0.113.5:7076".to_string()]);
        assert_eq!(config.tunables.max_per_ip, 16);
        assert_eq!(config.log_format, "human"); // default
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/burst.toml");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
