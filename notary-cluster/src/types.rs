//! Type definitions for OpenRaft integration.
//!
//! OpenRaft requires a type configuration that names every concrete type
//! the Raft implementation uses. This module defines the notary's.

use notary_core::{NotaryCommand, NotaryResponse};
use openraft::BasicNode;

/// Node ID type for the cluster.
pub type ClusterNodeId = u64;

openraft::declare_raft_types!(
    /// OpenRaft type configuration for the notary.
    ///
    /// Snapshots are streamed through files so a replica never holds a
    /// whole snapshot in memory.
    pub TypeConfig:
        D = NotaryCommand,
        R = NotaryResponse,
        SnapshotData = tokio::fs::File,
);

/// Type alias for Raft instance.
pub type ClusterRaft = openraft::Raft<TypeConfig>;

/// Type alias for log entry.
pub type ClusterEntry = openraft::Entry<TypeConfig>;

/// Type alias for vote.
pub type ClusterVote = openraft::Vote<ClusterNodeId>;

/// Type alias for log ID.
pub type ClusterLogId = openraft::LogId<ClusterNodeId>;

/// Type alias for stored membership.
pub type ClusterStoredMembership = openraft::StoredMembership<ClusterNodeId, BasicNode>;

/// Type alias for snapshot metadata.
pub type ClusterSnapshotMeta = openraft::SnapshotMeta<ClusterNodeId, BasicNode>;

/// Type alias for snapshot.
pub type ClusterSnapshot = openraft::storage::Snapshot<TypeConfig>;

/// Type alias for log state.
pub type ClusterLogState = openraft::LogState<TypeConfig>;

/// Type alias for storage error.
pub type ClusterStorageError = openraft::StorageError<ClusterNodeId>;

/// Type alias for Raft metrics.
pub type ClusterMetrics = openraft::RaftMetrics<ClusterNodeId, BasicNode>;

/// Type alias for client write error.
pub type ClusterClientWriteError = openraft::error::ClientWriteError<ClusterNodeId, BasicNode>;

/// Type alias for raft error with client write error.
pub type ClusterRaftWriteError = openraft::error::RaftError<ClusterNodeId, ClusterClientWriteError>;

/// Where to send a request this node cannot serve.
#[derive(Debug, Clone)]
pub struct LeaderInfo {
    /// The leader's node ID.
    pub leader_id: ClusterNodeId,
    /// The leader's address (may be empty if unknown).
    pub leader_addr: String,
}

/// Extract forward-to-leader info from a client write error.
///
/// Returns `None` unless the error is a ForwardToLeader with a known
/// leader ID.
pub fn extract_forward_to_leader(error: &ClusterRaftWriteError) -> Option<LeaderInfo> {
    use openraft::error::RaftError;

    match error {
        RaftError::APIError(ClusterClientWriteError::ForwardToLeader(forward)) => {
            forward.leader_id.map(|leader_id| LeaderInfo {
                leader_id,
                leader_addr: forward
                    .leader_node
                    .as_ref()
                    .map(|n| n.addr.clone())
                    .unwrap_or_default(),
            })
        }
        _ => None,
    }
}
