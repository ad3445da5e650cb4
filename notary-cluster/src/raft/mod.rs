//! Raft integration.
//!
//! [`ClusterNode`] ties together the redb log store, the replicated
//! [`NotaryStateMachine`](crate::state::NotaryStateMachine), the gRPC
//! network and the OpenRaft instance.

mod log_store;
mod node;

pub use log_store::LogStore;
pub use node::ClusterNode;
