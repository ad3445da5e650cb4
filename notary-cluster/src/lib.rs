//! Raft-replicated notary cluster.
//!
//! Every replica runs the same [`UniquenessStateMachine`] from
//! `notary-core`. Claims are appended to a Raft log (OpenRaft) and applied
//! in log order on every replica, so all replicas agree on which
//! transaction consumed each state.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        Notary Cluster                         │
//! │                                                               │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐     │
//! │  │   Node 1     │    │   Node 2     │    │   Node 3     │     │
//! │  │  (Leader)    │    │ (Follower)   │    │ (Follower)   │     │
//! │  │ ┌──────────┐ │    │ ┌──────────┐ │    │ ┌──────────┐ │     │
//! │  │ │ Raft log │◄┼────┼─┤ Raft log │◄┼────┼─┤ Raft log │ │     │
//! │  │ │  (redb)  │ │    │ │  (redb)  │ │    │ │  (redb)  │ │     │
//! │  │ └────┬─────┘ │    │ └────┬─────┘ │    │ └────┬─────┘ │     │
//! │  │ ┌────▼─────┐ │    │ ┌────▼─────┐ │    │ ┌────▼─────┐ │     │
//! │  │ │Uniqueness│ │    │ │Uniqueness│ │    │ │Uniqueness│ │     │
//! │  │ │  store   │ │    │ │  store   │ │    │ │  store   │ │     │
//! │  │ └──────────┘ │    │ └──────────┘ │    │ └──────────┘ │     │
//! │  └──────────────┘    └──────────────┘    └──────────────┘     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use notary_cluster::{ClusterConfig, ClusterNode, RaftUniquenessProvider};
//!
//! let config = ClusterConfig::builder()
//!     .node_id(1)
//!     .listen_addr("127.0.0.1:5000")
//!     .peer(2, "127.0.0.1:5001")
//!     .peer(3, "127.0.0.1:5002")
//!     .data_dir("data/node-1")
//!     .build()?;
//!
//! let node = Arc::new(ClusterNode::start(config).await?);
//! node.initialize().await?;
//!
//! let provider = RaftUniquenessProvider::new(Arc::clone(&node));
//! provider.commit(inputs, tx_id, party).await?;
//! ```
//!
//! [`UniquenessStateMachine`]: notary_core::UniquenessStateMachine

pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod provider;
pub mod raft;
pub mod service;
pub mod state;
pub mod types;

pub use client::{NotaryClient, RetryPolicy};
pub use config::ClusterConfig;
pub use error::{ClusterError, ClusterResult};
pub use provider::{RaftUniquenessProvider, ReadMode};
pub use raft::{ClusterNode, LogStore};
pub use service::NotaryServiceImpl;
pub use state::NotaryStateMachine;
pub use types::{ClusterNodeId, TypeConfig};

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("notary.raft");
}
