//! gRPC endpoint receiving Raft RPCs from other replicas.

use crate::proto::raft_service_server::RaftService;
use crate::proto::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use crate::types::{ClusterNodeId, ClusterRaft, TypeConfig};
use openraft::raft::{
    AppendEntriesRequest as RaftAppendRequest, InstallSnapshotRequest as RaftSnapshotRequest,
    VoteRequest as RaftVoteRequest,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Hands incoming Raft RPCs to the local Raft instance.
pub struct RaftServer {
    raft: Arc<ClusterRaft>,
}

impl RaftServer {
    /// Create a new Raft server.
    pub fn new(raft: Arc<ClusterRaft>) -> Self {
        Self { raft }
    }
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, Status> {
    serde_json::from_slice(data).map_err(|e| Status::invalid_argument(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, Status> {
    serde_json::to_vec(value).map_err(|e| Status::internal(e.to_string()))
}

#[tonic::async_trait]
impl RaftService for RaftServer {
    async fn append_entries(
        &self,
        request: Request<AppendEntriesRequest>,
    ) -> Result<Response<AppendEntriesResponse>, Status> {
        let req: RaftAppendRequest<TypeConfig> = decode(&request.into_inner().data)?;

        let resp = self
            .raft
            .append_entries(req)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(AppendEntriesResponse {
            data: encode(&resp)?,
        }))
    }

    async fn request_vote(
        &self,
        request: Request<VoteRequest>,
    ) -> Result<Response<VoteResponse>, Status> {
        let req: RaftVoteRequest<ClusterNodeId> = decode(&request.into_inner().data)?;
        tracing::debug!(vote = %req.vote, "vote requested");

        let resp = self
            .raft
            .vote(req)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(VoteResponse {
            data: encode(&resp)?,
        }))
    }

    async fn install_snapshot(
        &self,
        request: Request<InstallSnapshotRequest>,
    ) -> Result<Response<InstallSnapshotResponse>, Status> {
        let req: RaftSnapshotRequest<TypeConfig> = decode(&request.into_inner().data)?;
        tracing::debug!(
            snapshot_id = %req.meta.snapshot_id,
            offset = req.offset,
            done = req.done,
            "receiving snapshot chunk"
        );

        let resp = self
            .raft
            .install_snapshot(req)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(InstallSnapshotResponse {
            data: encode(&resp)?,
        }))
    }
}
