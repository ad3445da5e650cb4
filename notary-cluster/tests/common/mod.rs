//! Common test utilities for notary-cluster tests.

use notary_cluster::{ClusterConfig, ClusterNode};
use notary_core::{Party, SecureHash, StateRef};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Atomic counter for allocating unique ports.
static PORT_COUNTER: AtomicU16 = AtomicU16::new(25000);

/// Get a unique port for testing.
pub fn get_test_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// A state output of a transaction named `tx`.
#[allow(dead_code)]
pub fn state(tx: &str, index: u32) -> StateRef {
    StateRef::new(SecureHash::sha256(tx), index)
}

/// The hash of a transaction named `tx`.
#[allow(dead_code)]
pub fn tx(name: &str) -> SecureHash {
    SecureHash::sha256(name)
}

/// A party named `name`.
#[allow(dead_code)]
pub fn party(name: &str) -> Party {
    Party::from_name(name)
}

/// Config for a node with a low snapshot threshold.
pub fn node_config(
    node_id: u64,
    listen_addr: &str,
    data_dir: PathBuf,
    peers: &[(u64, String)],
) -> ClusterConfig {
    ClusterConfig::builder()
        .node_id(node_id)
        .listen_addr(listen_addr)
        .data_dir(data_dir)
        .peers(peers.iter().filter(|(id, _)| *id != node_id).cloned())
        .snapshot_threshold(50)
        .max_in_snapshot_log_to_keep(0)
        .build()
        .expect("Invalid config")
}

/// Test context that holds temp directories and nodes.
#[allow(dead_code)]
pub struct TestCluster {
    /// Temp directories for each node (kept alive for the test duration).
    temp_dirs: Vec<TempDir>,
    /// Cluster nodes.
    pub nodes: Vec<Arc<ClusterNode>>,
    /// Node addresses.
    pub addresses: Vec<String>,
}

#[allow(dead_code)]
impl TestCluster {
    /// Create a new test cluster with the specified number of nodes.
    pub async fn new(node_count: usize) -> Self {
        let mut temp_dirs = Vec::with_capacity(node_count);
        let mut peers = Vec::with_capacity(node_count);

        for i in 0..node_count {
            let addr = format!("127.0.0.1:{}", get_test_port());
            peers.push((i as u64 + 1, addr));
            temp_dirs.push(TempDir::new().expect("Failed to create temp dir"));
        }

        let mut nodes = Vec::with_capacity(node_count);
        for ((node_id, addr), temp_dir) in peers.iter().zip(&temp_dirs) {
            let config = node_config(*node_id, addr, temp_dir.path().to_path_buf(), &peers);
            let node = ClusterNode::start(config)
                .await
                .expect("Failed to start node");
            nodes.push(Arc::new(node));
        }

        Self {
            temp_dirs,
            nodes,
            addresses: peers.into_iter().map(|(_, addr)| addr).collect(),
        }
    }

    /// Data directory of node `index`.
    pub fn data_dir(&self, index: usize) -> PathBuf {
        self.temp_dirs[index].path().to_path_buf()
    }

    /// Initialize the cluster (call on first node).
    pub async fn initialize(&self) {
        self.nodes[0]
            .initialize()
            .await
            .expect("Failed to initialize cluster");
        self.wait_for_leader(3000)
            .await
            .expect("First node should become leader");
    }

    /// Add remaining nodes to the cluster.
    pub async fn add_all_nodes(&self) {
        for i in 1..self.nodes.len() {
            self.nodes[0]
                .add_learner(i as u64 + 1, self.addresses[i].clone())
                .await
                .expect("Failed to add learner");
        }

        let all_ids: Vec<u64> = (1..=self.nodes.len() as u64).collect();
        self.nodes[0]
            .change_membership(all_ids)
            .await
            .expect("Failed to change membership");
    }

    /// Wait for a leader to be elected.
    pub async fn wait_for_leader(&self, timeout_ms: u64) -> Option<u64> {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        while start.elapsed() < timeout {
            for node in &self.nodes {
                if let Some(leader) = node.leader().await {
                    return Some(leader);
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        None
    }

    /// Wait until every node has applied the leader's last log entry.
    pub async fn wait_for_convergence(&self) {
        let index = self.nodes[0]
            .metrics()
            .last_log_index
            .expect("Leader should have a log");
        for node in &self.nodes {
            node.wait_for_applied(index, Duration::from_secs(5))
                .await
                .expect("Node should catch up");
        }
    }

    /// Shutdown all nodes.
    pub async fn shutdown(&self) {
        for node in &self.nodes {
            let _ = node.shutdown().await;
        }
    }
}
