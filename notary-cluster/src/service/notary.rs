//! NotaryService gRPC implementation.

use crate::proto::notary_service_server::NotaryService;
use crate::proto::{
    AddNodeRequest, AddNodeResponse, ExecuteRequest, ExecuteResponse, NodeInfo, QueryRequest,
    QueryResponse, RemoveNodeRequest, RemoveNodeResponse, StatusRequest, StatusResponse,
};
use crate::state::NotaryStateMachine;
use crate::types::{ClusterNodeId, ClusterRaft, extract_forward_to_leader};
use notary_core::NotaryCommand;
use openraft::{BasicNode, ServerState};
use std::collections::BTreeSet;
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// gRPC service for notary clients.
///
/// Execute runs on the local Raft instance only. A follower answers with
/// the leader it knows of instead of forwarding, so clients can redirect.
pub struct NotaryServiceImpl {
    node_id: ClusterNodeId,
    raft: Arc<ClusterRaft>,
    state_machine: Arc<NotaryStateMachine>,
}

impl NotaryServiceImpl {
    /// Create a new notary service.
    pub fn new(
        node_id: ClusterNodeId,
        raft: Arc<ClusterRaft>,
        state_machine: Arc<NotaryStateMachine>,
    ) -> Self {
        Self {
            node_id,
            raft,
            state_machine,
        }
    }

    /// The current leader's node ID and address if known.
    fn leader_info(&self) -> Option<(ClusterNodeId, String)> {
        let metrics = self.raft.metrics().borrow().clone();
        let leader_id = metrics.current_leader?;
        let addr = metrics
            .membership_config
            .nodes()
            .find(|(id, _)| **id == leader_id)
            .map(|(_, node)| node.addr.clone())
            .unwrap_or_default();
        Some((leader_id, addr))
    }

    fn decode_command(data: &[u8]) -> Result<NotaryCommand, Status> {
        serde_json::from_slice(data)
            .map_err(|e| Status::invalid_argument(format!("Invalid command: {e}")))
    }
}

fn execute_failure(error: String, leader: Option<(ClusterNodeId, String)>) -> ExecuteResponse {
    let (leader_id, leader_addr) = leader.unwrap_or_default();
    ExecuteResponse {
        success: false,
        error,
        result: Vec::new(),
        leader_id,
        leader_addr,
    }
}

#[tonic::async_trait]
impl NotaryService for NotaryServiceImpl {
    async fn execute(
        &self,
        request: Request<ExecuteRequest>,
    ) -> Result<Response<ExecuteResponse>, Status> {
        let cmd = Self::decode_command(&request.into_inner().command)?;

        tracing::debug!(command = cmd.name(), "executing notary command");

        match self.raft.client_write(cmd).await {
            Ok(resp) => {
                let result = serde_json::to_vec(&resp.data)
                    .map_err(|e| Status::internal(format!("Serialization error: {e}")))?;

                Ok(Response::new(ExecuteResponse {
                    success: true,
                    error: String::new(),
                    result,
                    leader_id: self.node_id,
                    leader_addr: String::new(),
                }))
            }
            Err(e) => {
                if let Some(leader) = extract_forward_to_leader(&e) {
                    let addr = if leader.leader_addr.is_empty() {
                        self.leader_info().map(|(_, a)| a).unwrap_or_default()
                    } else {
                        leader.leader_addr
                    };
                    let error = format!(
                        "Not the leader. Leader is node {} at {}",
                        leader.leader_id, addr
                    );
                    return Ok(Response::new(execute_failure(
                        error,
                        Some((leader.leader_id, addr)),
                    )));
                }

                tracing::warn!(error = %e, "command failed");
                Ok(Response::new(execute_failure(
                    format!("Raft error: {e}"),
                    self.leader_info(),
                )))
            }
        }
    }

    async fn query(
        &self,
        request: Request<QueryRequest>,
    ) -> Result<Response<QueryResponse>, Status> {
        let cmd = Self::decode_command(&request.into_inner().command)?;

        match self.state_machine.machine().apply_query(&cmd) {
            Ok(response) => {
                let result = serde_json::to_vec(&response)
                    .map_err(|e| Status::internal(format!("Serialization error: {e}")))?;
                Ok(Response::new(QueryResponse {
                    success: true,
                    error: String::new(),
                    result,
                }))
            }
            Err(e) => Ok(Response::new(QueryResponse {
                success: false,
                error: e.to_string(),
                result: Vec::new(),
            })),
        }
    }

    async fn get_status(
        &self,
        _request: Request<StatusRequest>,
    ) -> Result<Response<StatusResponse>, Status> {
        let metrics = self.raft.metrics().borrow().clone();

        let state = match metrics.state {
            ServerState::Leader => "leader",
            ServerState::Follower => "follower",
            ServerState::Candidate => "candidate",
            ServerState::Learner => "learner",
            ServerState::Shutdown => "shutdown",
        };

        let leader_id = metrics.current_leader.unwrap_or(0);
        let voters: BTreeSet<ClusterNodeId> = metrics.membership_config.voter_ids().collect();
        let members = metrics
            .membership_config
            .nodes()
            .map(|(node_id, node)| NodeInfo {
                node_id: *node_id,
                address: node.addr.clone(),
                is_leader: *node_id == leader_id,
                is_voter: voters.contains(node_id),
            })
            .collect();

        Ok(Response::new(StatusResponse {
            node_id: self.node_id,
            state: state.to_string(),
            leader_id,
            term: metrics.current_term,
            last_log_index: metrics.last_log_index.unwrap_or(0),
            last_applied: metrics.last_applied.map(|id| id.index).unwrap_or(0),
            snapshot_index: metrics.snapshot.map(|id| id.index).unwrap_or(0),
            members,
        }))
    }

    async fn add_node(
        &self,
        request: Request<AddNodeRequest>,
    ) -> Result<Response<AddNodeResponse>, Status> {
        let req = request.into_inner();

        tracing::info!(node_id = req.node_id, addr = %req.address, "adding node to cluster");

        let node = BasicNode {
            addr: req.address.clone(),
        };
        if let Err(e) = self.raft.add_learner(req.node_id, node, true).await {
            return Ok(Response::new(AddNodeResponse {
                success: false,
                error: format!("Failed to add learner: {e}"),
            }));
        }

        let metrics = self.raft.metrics().borrow().clone();
        let mut voters: BTreeSet<ClusterNodeId> = metrics.membership_config.voter_ids().collect();
        voters.insert(req.node_id);

        if let Err(e) = self.raft.change_membership(voters, false).await {
            return Ok(Response::new(AddNodeResponse {
                success: false,
                error: format!("Failed to change membership: {e}"),
            }));
        }

        tracing::info!(node_id = req.node_id, "node added");

        Ok(Response::new(AddNodeResponse {
            success: true,
            error: String::new(),
        }))
    }

    async fn remove_node(
        &self,
        request: Request<RemoveNodeRequest>,
    ) -> Result<Response<RemoveNodeResponse>, Status> {
        let req = request.into_inner();

        tracing::info!(node_id = req.node_id, "removing node from cluster");

        let metrics = self.raft.metrics().borrow().clone();
        let voters: BTreeSet<ClusterNodeId> = metrics
            .membership_config
            .voter_ids()
            .filter(|id| *id != req.node_id)
            .collect();

        if voters.is_empty() {
            return Ok(Response::new(RemoveNodeResponse {
                success: false,
                error: "Cannot remove last node from cluster".to_string(),
            }));
        }

        if let Err(e) = self.raft.change_membership(voters, false).await {
            return Ok(Response::new(RemoveNodeResponse {
                success: false,
                error: format!("Failed to change membership: {e}"),
            }));
        }

        tracing::info!(node_id = req.node_id, "node removed");

        Ok(Response::new(RemoveNodeResponse {
            success: true,
            error: String::new(),
        }))
    }
}
