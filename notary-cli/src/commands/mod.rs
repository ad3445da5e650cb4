//! CLI command implementations.

pub mod bench;
pub mod commit;
pub mod get;
pub mod membership;
pub mod serve;
pub mod status;
pub mod version;

use anyhow::{Context, Result};
use notary_cluster::NotaryClient;

/// Client for the given `host:port` endpoints.
pub(crate) fn client(addrs: &[String]) -> Result<NotaryClient> {
    NotaryClient::new(addrs.iter().cloned()).context("Invalid notary address")
}
