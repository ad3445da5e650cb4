//! Node configuration file.
//!
//! ```toml
//! [cluster]
//! node_id = 1
//! listen_addr = "127.0.0.1:7001"
//! data_dir = "data/node-1"
//!
//! [cluster.peers]
//! 2 = "127.0.0.1:7002"
//! 3 = "127.0.0.1:7003"
//!
//! [logging]
//! format = "json"
//! level = "info,openraft=warn"
//! ```

use crate::observability::LogFormat;
use anyhow::{Context, Result};
use notary_cluster::ClusterConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything `notary serve` reads from its config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Replica settings.
    pub cluster: ClusterConfig,
    /// Log settings. Environment variables take precedence.
    pub logging: LoggingConfig,
}

/// The `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format.
    pub format: Option<LogFormat>,
    /// Filter directives.
    pub level: Option<String>,
}

impl NodeConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Parse and validate TOML config text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: NodeConfig = toml::from_str(text)?;
        config
            .cluster
            .validate()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = NodeConfig::parse(
            r#"
            [cluster]
            node_id = 2
            listen_addr = "127.0.0.1:7002"
            data_dir = "/var/lib/notary"
            commit_timeout_ms = 2000

            [cluster.peers]
            1 = "127.0.0.1:7001"

            [cluster.snapshot]
            snapshot_threshold = 500

            [logging]
            format = "json"
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.cluster.node_id, 2);
        assert_eq!(config.cluster.peers.get(&1).map(String::as_str), Some("127.0.0.1:7001"));
        assert_eq!(config.cluster.commit_timeout_ms, 2000);
        assert_eq!(config.cluster.snapshot.snapshot_threshold, 500);
        assert_eq!(config.logging.format, Some(LogFormat::Json));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = NodeConfig::parse("[cluster]\nnode_id = 1\n").unwrap();
        assert_eq!(config.cluster.raft.heartbeat_interval_ms, 50);
        assert!(config.logging.format.is_none());
    }

    #[test]
    fn test_invalid_cluster_is_rejected() {
        assert!(NodeConfig::parse("[cluster]\nnode_id = 0\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "[cluster]\nnode_id = 3\nlisten_addr = \"127.0.0.1:9000\"\n").unwrap();
        let config = NodeConfig::load(&path).unwrap();
        assert_eq!(config.cluster.listen_addr, "127.0.0.1:9000");
    }
}
