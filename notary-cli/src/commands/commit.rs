//! Commit command - notarise a transaction's inputs.

use anyhow::Result;
use notary_core::{CommitResult, Party, SecureHash, StateRef};

/// Run the commit command.
pub async fn run(addrs: &[String], tx: SecureHash, inputs: Vec<StateRef>, party: &str) -> Result<()> {
    let client = super::client(addrs)?;
    let result = client.commit(inputs, tx, Party::from_name(party)).await?;

    match result {
        CommitResult::Success => {
            println!("Committed transaction {tx}");
        }
        CommitResult::Conflict(conflict) => {
            println!("Conflict: transaction {tx} was refused");
            println!();
            for (state_ref, consumer) in &conflict.state_history {
                println!(
                    "  {state_ref} already consumed by {} (input {}) for {}",
                    consumer.id, consumer.input_index, consumer.requesting_party
                );
            }
            anyhow::bail!("{} input(s) already consumed", conflict.state_history.len());
        }
    }
    Ok(())
}
