//! ClusterNode - the main entry point for cluster operations.

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::network::{NetworkClient, RaftServer};
use crate::proto::ExecuteRequest;
use crate::proto::notary_service_client::NotaryServiceClient;
use crate::proto::notary_service_server::NotaryServiceServer;
use crate::proto::raft_service_server::RaftServiceServer;
use crate::raft::log_store::LogStore;
use crate::service::NotaryServiceImpl;
use crate::state::NotaryStateMachine;
use crate::types::{ClusterMetrics, ClusterNodeId, ClusterRaft, extract_forward_to_leader};
use notary_core::{NotaryCommand, NotaryResponse};
use openraft::{BasicNode, Config, Raft, SnapshotPolicy};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tonic::transport::{Channel, Server};

/// A replica of the notary cluster.
///
/// Owns the Raft instance, the replicated state machine and the gRPC
/// server that carries both Raft traffic and client requests.
pub struct ClusterNode {
    node_id: ClusterNodeId,
    advertise_addr: String,
    commit_timeout: Duration,
    raft: Arc<ClusterRaft>,
    state_machine: Arc<NotaryStateMachine>,
    /// Cached connections to peers for leader forwarding.
    peer_connections: RwLock<HashMap<ClusterNodeId, Channel>>,
    peer_addresses: HashMap<ClusterNodeId, String>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ClusterNode {
    /// Start a replica: open its storage, start Raft and serve gRPC on
    /// `listen_addr`.
    pub async fn start(config: ClusterConfig) -> ClusterResult<Self> {
        config.validate().map_err(ClusterError::Config)?;

        let node_id = config.node_id;
        let addr: std::net::SocketAddr = config
            .listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ClusterError::Config(e.to_string()))?;

        let log_store = LogStore::open(config.raft_log_path())?;
        let state_machine = Arc::new(NotaryStateMachine::open(
            config.store_path(),
            config.snapshot_dir(),
        )?);
        let network = NetworkClient::new();

        let raft_config = Config {
            cluster_name: "notary-cluster".to_string(),
            election_timeout_min: config.raft.election_timeout_ms.0,
            election_timeout_max: config.raft.election_timeout_ms.1,
            heartbeat_interval: config.raft.heartbeat_interval_ms,
            max_payload_entries: config.raft.max_entries_per_append,
            snapshot_policy: SnapshotPolicy::LogsSinceLast(config.snapshot.snapshot_threshold),
            max_in_snapshot_log_to_keep: config.snapshot.max_in_snapshot_log_to_keep,
            ..Default::default()
        };
        let raft_config = Arc::new(
            raft_config
                .validate()
                .map_err(|e| ClusterError::Config(e.to_string()))?,
        );

        let raft = Raft::new(
            node_id,
            raft_config,
            network,
            log_store,
            Arc::clone(&state_machine),
        )
        .await
        .map_err(|e| ClusterError::Consensus(format!("failed to create Raft: {e}")))?;
        let raft = Arc::new(raft);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let raft_server = RaftServer::new(Arc::clone(&raft));
        let notary_server = NotaryServiceImpl::new(
            node_id,
            Arc::clone(&raft),
            Arc::clone(&state_machine),
        );

        tokio::spawn(async move {
            let result = Server::builder()
                .add_service(RaftServiceServer::new(raft_server))
                .add_service(NotaryServiceServer::new(notary_server))
                .serve_with_shutdown(addr, async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(node_id, %addr, error = %e, "gRPC server stopped");
            }
        });

        tracing::info!(node_id, addr = %config.listen_addr, "Notary node started");

        Ok(Self {
            node_id,
            advertise_addr: config.advertise_addr().to_string(),
            commit_timeout: config.commit_timeout(),
            raft,
            state_machine,
            peer_connections: RwLock::new(HashMap::new()),
            peer_addresses: config.peers.clone(),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        })
    }

    /// Bootstrap a new cluster with this node as its only voter.
    ///
    /// Call once, on one node. Other replicas join through
    /// [`add_learner`](Self::add_learner) and
    /// [`change_membership`](Self::change_membership).
    pub async fn initialize(&self) -> ClusterResult<()> {
        let mut members = BTreeMap::new();
        members.insert(
            self.node_id,
            BasicNode {
                addr: self.advertise_addr.clone(),
            },
        );

        self.raft
            .initialize(members)
            .await
            .map_err(ClusterError::consensus)?;

        tracing::info!(node_id = self.node_id, "Cluster initialized");
        Ok(())
    }

    /// Add a non-voting replica and wait until it has caught up.
    ///
    /// Must be called on the leader. A fresh replica is brought up to date
    /// with a snapshot when the leader's log has been compacted.
    pub async fn add_learner(&self, node_id: ClusterNodeId, addr: String) -> ClusterResult<()> {
        self.raft
            .add_learner(node_id, BasicNode { addr }, true)
            .await
            .map_err(ClusterError::consensus)?;

        tracing::info!(node_id, "Added learner to cluster");
        Ok(())
    }

    /// Replace the voter set. Must be called on the leader.
    pub async fn change_membership(
        &self,
        members: impl IntoIterator<Item = ClusterNodeId>,
    ) -> ClusterResult<()> {
        let voters: BTreeSet<_> = members.into_iter().collect();
        self.raft
            .change_membership(voters.clone(), false)
            .await
            .map_err(ClusterError::consensus)?;

        tracing::info!(?voters, "Membership changed");
        Ok(())
    }

    /// Replicate a command and return its response once applied.
    ///
    /// On a follower the command is forwarded to the leader. Fails with
    /// [`ClusterError::Timeout`] if the command is not applied within the
    /// configured commit timeout; the command may still be applied later.
    pub async fn execute(&self, cmd: NotaryCommand) -> ClusterResult<NotaryResponse> {
        let timeout_ms = self.commit_timeout.as_millis() as u64;
        tokio::time::timeout(self.commit_timeout, self.execute_inner(cmd))
            .await
            .map_err(|_| ClusterError::Timeout { timeout_ms })?
    }

    async fn execute_inner(&self, cmd: NotaryCommand) -> ClusterResult<NotaryResponse> {
        match self.raft.client_write(cmd.clone()).await {
            Ok(resp) => Ok(resp.data),
            Err(e) => {
                if let Some(leader) = extract_forward_to_leader(&e) {
                    if leader.leader_id != self.node_id {
                        let addr = if leader.leader_addr.is_empty() {
                            self.leader_address(leader.leader_id)?
                        } else {
                            leader.leader_addr
                        };
                        return self.forward_to_leader(leader.leader_id, &addr, cmd).await;
                    }
                }
                Err(ClusterError::from_write_error(e))
            }
        }
    }

    /// Execute a command via the NotaryService of the leader.
    async fn forward_to_leader(
        &self,
        leader_id: ClusterNodeId,
        leader_addr: &str,
        cmd: NotaryCommand,
    ) -> ClusterResult<NotaryResponse> {
        tracing::debug!(leader_id, %leader_addr, command = cmd.name(), "forwarding command to leader");

        let channel = self.connection(leader_id, leader_addr).await?;
        let mut client = NotaryServiceClient::new(channel);

        let request = tonic::Request::new(ExecuteRequest {
            command: serde_json::to_vec(&cmd)?,
        });
        let resp = match client.execute(request).await {
            Ok(resp) => resp.into_inner(),
            Err(status) => {
                self.peer_connections.write().remove(&leader_id);
                return Err(status.into());
            }
        };

        if resp.success {
            Ok(serde_json::from_slice(&resp.result)?)
        } else if resp.leader_id != 0 && resp.leader_id != leader_id {
            Err(ClusterError::NotLeader {
                leader: Some(resp.leader_id),
            })
        } else {
            Err(ClusterError::Remote(resp.error))
        }
    }

    /// Answer a read-only command from this replica's applied state.
    ///
    /// Reflects every entry applied locally, which may trail the leader.
    /// Route reads through [`execute`](Self::execute) when they must
    /// observe every committed claim.
    pub fn query(&self, cmd: &NotaryCommand) -> ClusterResult<NotaryResponse> {
        Ok(self.state_machine.machine().apply_query(cmd)?)
    }

    fn leader_address(&self, leader_id: ClusterNodeId) -> ClusterResult<String> {
        let metrics = self.raft.metrics().borrow().clone();
        let from_membership = metrics
            .membership_config
            .nodes()
            .find(|(id, node)| **id == leader_id && !node.addr.is_empty())
            .map(|(_, node)| node.addr.clone());

        from_membership
            .or_else(|| self.peer_addresses.get(&leader_id).cloned())
            .ok_or(ClusterError::NodeNotFound(leader_id))
    }

    async fn connection(&self, node_id: ClusterNodeId, addr: &str) -> ClusterResult<Channel> {
        if let Some(channel) = self.peer_connections.read().get(&node_id) {
            return Ok(channel.clone());
        }

        let channel = Channel::from_shared(format!("http://{addr}"))
            .map_err(|e| ClusterError::Config(e.to_string()))?
            .connect()
            .await?;

        self.peer_connections.write().insert(node_id, channel.clone());
        Ok(channel)
    }

    /// Get the current leader's node ID.
    pub async fn leader(&self) -> Option<ClusterNodeId> {
        self.raft.current_leader().await
    }

    /// Check if this node is the leader.
    pub async fn is_leader(&self) -> bool {
        self.raft.current_leader().await == Some(self.node_id)
    }

    /// Get this node's ID.
    pub fn node_id(&self) -> ClusterNodeId {
        self.node_id
    }

    /// The replicated state machine.
    pub fn state_machine(&self) -> &Arc<NotaryStateMachine> {
        &self.state_machine
    }

    /// The underlying Raft instance.
    pub fn raft(&self) -> &Arc<ClusterRaft> {
        &self.raft
    }

    /// Get cluster metrics.
    pub fn metrics(&self) -> ClusterMetrics {
        self.raft.metrics().borrow().clone()
    }

    /// Build a snapshot now and compact the log behind it.
    pub async fn trigger_snapshot(&self) -> ClusterResult<()> {
        self.raft
            .trigger()
            .snapshot()
            .await
            .map_err(|e| ClusterError::Consensus(format!("{e:?}")))?;
        Ok(())
    }

    /// Wait until the applied log index reaches `index`.
    pub async fn wait_for_applied(&self, index: u64, timeout: Duration) -> ClusterResult<()> {
        self.raft
            .wait(Some(timeout))
            .applied_index_at_least(Some(index), "wait for applied index")
            .await
            .map_err(|_| ClusterError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })?;
        Ok(())
    }

    /// Stop serving and shut Raft down.
    pub async fn shutdown(&self) -> ClusterResult<()> {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }

        self.raft
            .shutdown()
            .await
            .map_err(|e| ClusterError::Consensus(format!("shutdown error: {e}")))?;

        tracing::info!(node_id = self.node_id, "Notary node shutdown");
        Ok(())
    }
}

impl Drop for ClusterNode {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.get_mut().take() {
            let _ = tx.send(());
        }
    }
}
