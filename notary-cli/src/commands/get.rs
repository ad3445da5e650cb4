//! Get command - find which transaction consumed a state.

use anyhow::Result;
use notary_core::StateRef;

/// Run the get command.
///
/// Reads through the leader unless `local` is set, in which case the first
/// address is asked for its own applied state.
pub async fn run(addrs: &[String], state_ref: StateRef, local: bool) -> Result<()> {
    let client = super::client(addrs)?;
    let consumer = if local {
        client.get_local(&addrs[0], state_ref).await?
    } else {
        client.get(state_ref).await?
    };

    match consumer {
        Some(tx) => {
            println!("{state_ref}");
            println!("  consumed by: {}", tx.id);
            println!("  input index: {}", tx.input_index);
            println!("  requested by: {}", tx.requesting_party);
        }
        None => println!("{state_ref} is unconsumed"),
    }
    Ok(())
}
