//! Network client implementing OpenRaft's RaftNetwork trait.

use crate::error::{ClusterError, RPCError};
use crate::proto::raft_service_client::RaftServiceClient;
use crate::proto::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};
use crate::types::{ClusterNodeId, TypeConfig};
use openraft::BasicNode;
use openraft::error::{InstallSnapshotError, NetworkError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest as RaftAppendRequest, AppendEntriesResponse as RaftAppendResponse,
    InstallSnapshotRequest as RaftSnapshotRequest, InstallSnapshotResponse as RaftSnapshotResponse,
    VoteRequest as RaftVoteRequest, VoteResponse as RaftVoteResponse,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Channel;

/// Factory for connections to other replicas.
///
/// Channels are cached per target and dropped when the target becomes
/// unreachable, so the next RPC reconnects.
#[derive(Clone, Default)]
pub struct NetworkClient {
    connections: Arc<RwLock<HashMap<ClusterNodeId, Channel>>>,
}

impl NetworkClient {
    /// Create a new network client.
    pub fn new() -> Self {
        Self::default()
    }

    async fn connect(&self, target: ClusterNodeId, addr: &str) -> Result<Channel, ClusterError> {
        if let Some(channel) = self.connections.read().get(&target) {
            return Ok(channel.clone());
        }

        let channel = Channel::from_shared(format!("http://{addr}"))
            .map_err(|e| ClusterError::Config(e.to_string()))?
            .connect()
            .await?;

        self.connections.write().insert(target, channel.clone());
        tracing::debug!(target, addr, "connected to peer");
        Ok(channel)
    }

    fn evict(&self, target: ClusterNodeId) {
        self.connections.write().remove(&target);
    }
}

impl RaftNetworkFactory<TypeConfig> for NetworkClient {
    type Network = NetworkConnection;

    async fn new_client(&mut self, target: ClusterNodeId, node: &BasicNode) -> Self::Network {
        NetworkConnection {
            target,
            addr: node.addr.clone(),
            client: self.clone(),
        }
    }
}

/// Failure of a single Raft RPC, before it is shaped into OpenRaft's error.
enum CallError {
    /// The peer could not be reached. OpenRaft backs off.
    Unreachable(ClusterError),
    /// The peer answered with something unusable.
    Network(ClusterError),
}

impl CallError {
    fn into_rpc<E: std::error::Error>(self) -> openraft::error::RPCError<
        ClusterNodeId,
        BasicNode,
        openraft::error::RaftError<ClusterNodeId, E>,
    > {
        match self {
            CallError::Unreachable(e) => openraft::error::RPCError::Unreachable(Unreachable::new(&e)),
            CallError::Network(e) => openraft::error::RPCError::Network(NetworkError::new(&e)),
        }
    }
}

/// A connection to one replica.
pub struct NetworkConnection {
    target: ClusterNodeId,
    addr: String,
    client: NetworkClient,
}

impl NetworkConnection {
    async fn raft_client(&self) -> Result<RaftServiceClient<Channel>, CallError> {
        self.client
            .connect(self.target, &self.addr)
            .await
            .map(RaftServiceClient::new)
            .map_err(CallError::Unreachable)
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CallError> {
        serde_json::to_vec(value).map_err(|e| CallError::Network(e.into()))
    }

    fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, CallError> {
        serde_json::from_slice(data).map_err(|e| CallError::Network(e.into()))
    }

    fn request<T>(message: T, ttl: Duration) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request.set_timeout(ttl);
        request
    }

    fn status_error(&self, status: tonic::Status) -> CallError {
        match status.code() {
            tonic::Code::Unavailable | tonic::Code::DeadlineExceeded | tonic::Code::Cancelled => {
                self.client.evict(self.target);
                CallError::Unreachable(status.into())
            }
            _ => CallError::Network(status.into()),
        }
    }

    async fn call_append(
        &self,
        req: &RaftAppendRequest<TypeConfig>,
        ttl: Duration,
    ) -> Result<RaftAppendResponse<ClusterNodeId>, CallError> {
        let data = Self::encode(req)?;
        let response = self
            .raft_client()
            .await?
            .append_entries(Self::request(AppendEntriesRequest { data }, ttl))
            .await
            .map_err(|s| self.status_error(s))?;
        Self::decode(&response.into_inner().data)
    }

    async fn call_snapshot(
        &self,
        req: &RaftSnapshotRequest<TypeConfig>,
        ttl: Duration,
    ) -> Result<RaftSnapshotResponse<ClusterNodeId>, CallError> {
        let data = Self::encode(req)?;
        let response = self
            .raft_client()
            .await?
            .install_snapshot(Self::request(InstallSnapshotRequest { data }, ttl))
            .await
            .map_err(|s| self.status_error(s))?;
        Self::decode(&response.into_inner().data)
    }

    async fn call_vote(
        &self,
        req: &RaftVoteRequest<ClusterNodeId>,
        ttl: Duration,
    ) -> Result<RaftVoteResponse<ClusterNodeId>, CallError> {
        let data = Self::encode(req)?;
        let response = self
            .raft_client()
            .await?
            .request_vote(Self::request(VoteRequest { data }, ttl))
            .await
            .map_err(|s| self.status_error(s))?;
        Self::decode(&response.into_inner().data)
    }
}

impl RaftNetwork<TypeConfig> for NetworkConnection {
    async fn append_entries(
        &mut self,
        req: RaftAppendRequest<TypeConfig>,
        option: RPCOption,
    ) -> Result<RaftAppendResponse<ClusterNodeId>, RPCError> {
        self.call_append(&req, option.hard_ttl())
            .await
            .map_err(CallError::into_rpc)
    }

    async fn install_snapshot(
        &mut self,
        req: RaftSnapshotRequest<TypeConfig>,
        option: RPCOption,
    ) -> Result<RaftSnapshotResponse<ClusterNodeId>, RPCError<InstallSnapshotError>> {
        self.call_snapshot(&req, option.hard_ttl())
            .await
            .map_err(CallError::into_rpc)
    }

    async fn vote(
        &mut self,
        req: RaftVoteRequest<ClusterNodeId>,
        option: RPCOption,
    ) -> Result<RaftVoteResponse<ClusterNodeId>, RPCError> {
        self.call_vote(&req, option.hard_ttl())
            .await
            .map_err(CallError::into_rpc)
    }
}
