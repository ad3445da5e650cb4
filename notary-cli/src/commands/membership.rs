//! Membership commands - add and remove replicas.

use anyhow::Result;

/// Add a replica as a voter.
pub async fn add(addrs: &[String], node_id: u64, node_addr: &str) -> Result<()> {
    let client = super::client(addrs)?;
    client.add_node(node_id, node_addr).await?;
    println!("Node {node_id} ({node_addr}) added");
    Ok(())
}

/// Remove a voter.
pub async fn remove(addrs: &[String], node_id: u64) -> Result<()> {
    let client = super::client(addrs)?;
    client.remove_node(node_id).await?;
    println!("Node {node_id} removed");
    Ok(())
}
