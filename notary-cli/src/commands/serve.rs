//! Serve command - run a notary replica.

use crate::config::NodeConfig;
use anyhow::{Context, Result};
use notary_cluster::ClusterNode;

/// Run the serve command.
pub async fn run(config: NodeConfig, init: bool) -> Result<()> {
    let cluster = config.cluster;
    tracing::info!(
        node_id = cluster.node_id,
        listen_addr = %cluster.listen_addr,
        data_dir = %cluster.data_dir.display(),
        peers = cluster.peers.len(),
        "Starting notary node"
    );

    let node = ClusterNode::start(cluster.clone())
        .await
        .context("Failed to start notary node")?;

    if init {
        node.initialize()
            .await
            .context("Failed to initialize cluster")?;
    }

    println!("Notary node {} listening on {}", cluster.node_id, cluster.listen_addr);
    println!("Data directory: {}", cluster.data_dir.display());
    if init {
        println!("Initialized a new cluster with this node as the only voter.");
    }
    println!();
    println!("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown signal received");
    println!();
    println!("Shutting down...");

    node.shutdown().await.context("Failed to shut down node")?;
    Ok(())
}
