//! Status command - show a replica's view of the cluster.

use anyhow::Result;

/// Run the status command.
pub async fn run(addrs: &[String]) -> Result<()> {
    let client = super::client(addrs)?;
    let status = client.status(addrs.first().map(String::as_str)).await?;

    println!("Node:            {}", status.node_id);
    println!("State:           {}", status.state);
    println!(
        "Leader:          {}",
        if status.leader_id == 0 {
            "unknown".to_string()
        } else {
            status.leader_id.to_string()
        }
    );
    println!("Term:            {}", status.term);
    println!("Last log index:  {}", status.last_log_index);
    println!("Last applied:    {}", status.last_applied);
    println!("Snapshot index:  {}", status.snapshot_index);
    println!();
    println!("Members:");
    for member in &status.members {
        let role = match (member.is_leader, member.is_voter) {
            (true, _) => "leader",
            (false, true) => "voter",
            (false, false) => "learner",
        };
        println!("  {:>4}  {:<24} {role}", member.node_id, member.address);
    }
    Ok(())
}
