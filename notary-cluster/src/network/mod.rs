//! Raft RPC transport between replicas.
//!
//! OpenRaft messages travel as JSON payloads inside tonic gRPC calls.

mod client;
mod server;

pub use client::{NetworkClient, NetworkConnection};
pub use server::RaftServer;
