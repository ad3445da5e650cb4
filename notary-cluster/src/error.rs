//! Error types for cluster operations.

use crate::types::{ClusterNodeId, ClusterRaftWriteError};
use notary_core::{MachineError, NotaryError, StoreError};
use openraft::error::{ClientWriteError, RaftError};
use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Type alias for OpenRaft RPC errors.
pub type RPCError<E = openraft::error::Infallible> = openraft::error::RPCError<
    ClusterNodeId,
    openraft::BasicNode,
    RaftError<ClusterNodeId, E>,
>;

/// Errors that can occur in cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Raft consensus rejected or failed the operation.
    #[error("Consensus error: {0}")]
    Consensus(String),

    /// Network/RPC error.
    #[error("Network error: {0}")]
    Network(#[from] tonic::Status),

    /// Transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Durable store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// State machine refused a query.
    #[error("State machine error: {0}")]
    Machine(#[from] MachineError),

    /// A response did not match its command.
    #[error(transparent)]
    Response(#[from] NotaryError),

    /// Node not found in cluster.
    #[error("Node {0} not found in cluster")]
    NodeNotFound(ClusterNodeId),

    /// Not the leader - includes leader hint if known.
    #[error("Not the leader, leader is node {leader:?}")]
    NotLeader {
        /// The current leader if known.
        leader: Option<ClusterNodeId>,
    },

    /// A remote replica reported a failure.
    #[error("Remote error: {0}")]
    Remote(String),

    /// The command was not applied within the commit deadline.
    #[error("Command not applied within {timeout_ms}ms")]
    Timeout {
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClusterError {
    /// Convert any Raft error into a consensus error.
    pub fn consensus<E: std::fmt::Debug>(e: RaftError<ClusterNodeId, E>) -> Self {
        ClusterError::Consensus(format!("{e:?}"))
    }

    /// Convert a client write error, keeping the leader hint.
    pub fn from_write_error(e: ClusterRaftWriteError) -> Self {
        match e {
            RaftError::APIError(ClientWriteError::ForwardToLeader(forward)) => {
                ClusterError::NotLeader {
                    leader: forward.leader_id,
                }
            }
            other => Self::consensus(other),
        }
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        ClusterError::Serialization(e.to_string())
    }
}

impl From<ClusterError> for NotaryError {
    fn from(e: ClusterError) -> Self {
        match e {
            ClusterError::Timeout { timeout_ms } => NotaryError::Timeout { timeout_ms },
            ClusterError::Store(e) => NotaryError::Storage(e),
            ClusterError::Machine(e) => e.into(),
            ClusterError::Response(e) => e,
            ClusterError::Config(reason) | ClusterError::Serialization(reason) => {
                NotaryError::rejected(reason)
            }
            other => NotaryError::unavailable(other.to_string()),
        }
    }
}
