//! Client-facing gRPC service.
//!
//! [`NotaryServiceImpl`] is what clients and forwarding followers talk to:
//! command execution, local queries, status and membership changes.

mod notary;

pub use notary::NotaryServiceImpl;
