//! Version command - show version information.

use anyhow::Result;

/// Version information.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the version command.
pub fn run() -> Result<()> {
    println!("notary - replicated uniqueness service");
    println!();
    println!("Version:     {}", VERSION);
    println!(
        "Platform:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!();
    println!("Components:");
    println!("  notary-core     Uniqueness store, state machine, snapshots");
    println!("  notary-cluster  Raft replication, gRPC services, client");
    println!("  notary-cli      Command-line interface");

    Ok(())
}
