//! Cluster configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a cluster node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// This node's unique ID in the cluster (1-based).
    pub node_id: u64,

    /// Address this node listens on for Raft and client RPC
    /// (e.g., "0.0.0.0:5000").
    pub listen_addr: String,

    /// Address advertised to other nodes (e.g., "192.168.1.10:5000").
    /// If not set, uses listen_addr.
    pub advertise_addr: Option<String>,

    /// Peer nodes in the cluster: node_id -> address.
    #[serde(with = "peer_map")]
    pub peers: HashMap<u64, String>,

    /// Directory holding the Raft log, the uniqueness store and snapshots.
    pub data_dir: PathBuf,

    /// Raft timing configuration.
    pub raft: RaftConfig,

    /// Snapshot configuration.
    pub snapshot: SnapshotConfig,

    /// How long `execute` waits for a command to be committed and
    /// applied, in milliseconds.
    pub commit_timeout_ms: u64,
}

/// Raft timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Election timeout range (min, max) in milliseconds.
    pub election_timeout_ms: (u64, u64),

    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Maximum entries per AppendEntries RPC.
    pub max_entries_per_append: u64,
}

/// Snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Build a snapshot after this many log entries since the last one.
    pub snapshot_threshold: u64,

    /// Log entries kept behind the snapshot for lagging followers.
    pub max_in_snapshot_log_to_keep: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: 1,
            listen_addr: "127.0.0.1:5000".to_string(),
            advertise_addr: None,
            peers: HashMap::new(),
            data_dir: PathBuf::from("./notary-data"),
            raft: RaftConfig::default(),
            snapshot: SnapshotConfig::default(),
            commit_timeout_ms: 5_000,
        }
    }
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_ms: (150, 300),
            heartbeat_interval_ms: 50,
            max_entries_per_append: 100,
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            snapshot_threshold: 10_000,
            max_in_snapshot_log_to_keep: 1_000,
        }
    }
}

impl ClusterConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClusterConfigBuilder {
        ClusterConfigBuilder::default()
    }

    /// Get the advertised address (falls back to listen_addr).
    pub fn advertise_addr(&self) -> &str {
        self.advertise_addr.as_deref().unwrap_or(&self.listen_addr)
    }

    /// Get the heartbeat interval as a Duration.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.raft.heartbeat_interval_ms)
    }

    /// Get the commit deadline as a Duration.
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    /// Path of the Raft log database.
    pub fn raft_log_path(&self) -> PathBuf {
        self.data_dir.join("raft").join("log.redb")
    }

    /// Path of the uniqueness store database.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("notary.redb")
    }

    /// Directory holding snapshot files.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.node_id == 0 {
            return Err("node_id must be > 0".to_string());
        }

        if self.listen_addr.is_empty() {
            return Err("listen_addr is required".to_string());
        }

        if self.peers.contains_key(&self.node_id) {
            return Err(format!("peers must not include this node ({})", self.node_id));
        }

        let (min_election, max_election) = self.raft.election_timeout_ms;
        if min_election >= max_election {
            return Err(format!(
                "election_timeout_ms min ({min_election}) must be below max ({max_election})"
            ));
        }

        // Heartbeat should be much less than election timeout
        if self.raft.heartbeat_interval_ms >= min_election / 2 {
            return Err(format!(
                "heartbeat_interval_ms ({}) should be << election_timeout_ms ({})",
                self.raft.heartbeat_interval_ms, min_election
            ));
        }

        if self.commit_timeout_ms == 0 {
            return Err("commit_timeout_ms must be > 0".to_string());
        }

        if self.snapshot.snapshot_threshold == 0 {
            return Err("snapshot_threshold must be > 0".to_string());
        }

        Ok(())
    }
}

/// Peer maps keyed by node ID. Map keys are strings in TOML and JSON, so
/// node IDs are written as decimal strings.
mod peer_map {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::{BTreeMap, HashMap};

    pub fn serialize<S: Serializer>(peers: &HashMap<u64, String>, s: S) -> Result<S::Ok, S::Error> {
        let sorted: BTreeMap<String, &String> =
            peers.iter().map(|(id, addr)| (id.to_string(), addr)).collect();
        s.collect_map(sorted)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<HashMap<u64, String>, D::Error> {
        HashMap::<String, String>::deserialize(d)?
            .into_iter()
            .map(|(id, addr)| {
                id.parse::<u64>()
                    .map(|id| (id, addr))
                    .map_err(|_| D::Error::custom(format!("invalid peer node id '{id}'")))
            })
            .collect()
    }
}

/// Builder for ClusterConfig.
#[derive(Debug, Default)]
pub struct ClusterConfigBuilder {
    config: ClusterConfig,
}

impl ClusterConfigBuilder {
    /// Set the node ID.
    pub fn node_id(mut self, id: u64) -> Self {
        self.config.node_id = id;
        self
    }

    /// Set the listen address.
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the advertise address.
    pub fn advertise_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.advertise_addr = Some(addr.into());
        self
    }

    /// Add a peer node.
    pub fn peer(mut self, node_id: u64, addr: impl Into<String>) -> Self {
        self.config.peers.insert(node_id, addr.into());
        self
    }

    /// Set all peers at once.
    pub fn peers(mut self, peers: impl IntoIterator<Item = (u64, String)>) -> Self {
        self.config.peers = peers.into_iter().collect();
        self
    }

    /// Set the data directory.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set election timeout range in milliseconds.
    pub fn election_timeout_ms(mut self, min: u64, max: u64) -> Self {
        self.config.raft.election_timeout_ms = (min, max);
        self
    }

    /// Set heartbeat interval in milliseconds.
    pub fn heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.config.raft.heartbeat_interval_ms = ms;
        self
    }

    /// Set snapshot threshold.
    pub fn snapshot_threshold(mut self, entries: u64) -> Self {
        self.config.snapshot.snapshot_threshold = entries;
        self
    }

    /// Set how many log entries to keep behind a snapshot.
    pub fn max_in_snapshot_log_to_keep(mut self, entries: u64) -> Self {
        self.config.snapshot.max_in_snapshot_log_to_keep = entries;
        self
    }

    /// Set the commit deadline in milliseconds.
    pub fn commit_timeout_ms(mut self, ms: u64) -> Self {
        self.config.commit_timeout_ms = ms;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ClusterConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}
