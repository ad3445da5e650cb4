//! notary - command-line interface for the replicated uniqueness service.

mod commands;
mod config;
mod observability;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::NodeConfig;
use notary_core::{SecureHash, StateRef};
use observability::{TracingConfig, init_tracing};
use std::path::PathBuf;

/// notary - decides whether a transaction's inputs were already spent.
#[derive(Parser)]
#[command(name = "notary")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a notary replica
    Serve {
        /// Path to the node's TOML config file
        #[arg(short, long)]
        config: PathBuf,

        /// Bootstrap a new cluster with this node as its first voter
        #[arg(long)]
        init: bool,
    },

    /// Notarise a transaction
    Commit {
        /// Notary addresses (host:port), comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        addr: Vec<String>,

        /// Transaction hash (hex)
        #[arg(short, long)]
        tx: SecureHash,

        /// Input state as <txhash>:<index>, repeatable
        #[arg(short, long = "input", required = true)]
        inputs: Vec<StateRef>,

        /// Name of the requesting party
        #[arg(short, long, default_value = "cli")]
        party: String,
    },

    /// Show which transaction consumed a state
    Get {
        /// Notary addresses (host:port), comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        addr: Vec<String>,

        /// State as <txhash>:<index>
        #[arg(short, long)]
        input: StateRef,

        /// Read the first replica's applied state instead of the leader's log
        #[arg(long)]
        local: bool,
    },

    /// Show a replica's view of the cluster
    Status {
        /// Replica address (host:port)
        #[arg(short, long, value_delimiter = ',', required = true)]
        addr: Vec<String>,
    },

    /// Add a replica as a voter
    AddNode {
        /// Notary addresses (host:port), comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        addr: Vec<String>,

        /// ID of the new replica
        #[arg(long)]
        node_id: u64,

        /// Address of the new replica
        #[arg(long)]
        node_addr: String,
    },

    /// Remove a voter
    RemoveNode {
        /// Notary addresses (host:port), comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        addr: Vec<String>,

        /// ID of the replica to remove
        #[arg(long)]
        node_id: u64,
    },

    /// Notarise dummy transactions and report latency
    Bench {
        /// Notary addresses (host:port), comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        addr: Vec<String>,

        /// Number of transactions
        #[arg(short, long, default_value = "100")]
        count: usize,

        /// Name of the requesting party
        #[arg(short, long, default_value = "bench")]
        party: String,
    },

    /// Show version information
    Version,
}

fn setup_logging(verbosity: u8, config: Option<&NodeConfig>) -> Result<()> {
    let default_filter = match verbosity {
        0 => match config {
            Some(config) => config
                .logging
                .level
                .clone()
                .unwrap_or_else(|| "info".to_string()),
            None => "warn".to_string(),
        },
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };

    let mut tracing_config = TracingConfig::from_env(&default_filter);

    // The config file's format applies unless the environment overrides it.
    if std::env::var_os("NOTARY_LOG_FORMAT").is_none() {
        if let Some(format) = config.and_then(|c| c.logging.format) {
            tracing_config = TracingConfig::builder()
                .log_format(format)
                .log_filter(tracing_config.log_filter())
                .include_location(tracing_config.include_location())
                .build();
        }
    }

    init_tracing(&tracing_config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let node_config = match &cli.command {
        Commands::Serve { config, .. } => Some(NodeConfig::load(config)?),
        _ => None,
    };
    setup_logging(cli.verbose, node_config.as_ref())?;

    match cli.command {
        Commands::Serve { init, .. } => {
            commands::serve::run(node_config.unwrap_or_default(), init).await
        }
        Commands::Commit {
            addr,
            tx,
            inputs,
            party,
        } => commands::commit::run(&addr, tx, inputs, &party).await,
        Commands::Get { addr, input, local } => commands::get::run(&addr, input, local).await,
        Commands::Status { addr } => commands::status::run(&addr).await,
        Commands::AddNode {
            addr,
            node_id,
            node_addr,
        } => commands::membership::add(&addr, node_id, &node_addr).await,
        Commands::RemoveNode { addr, node_id } => {
            commands::membership::remove(&addr, node_id).await
        }
        Commands::Bench { addr, count, party } => commands::bench::run(&addr, count, &party).await,
        Commands::Version => commands::version::run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commit() {
        let tx = SecureHash::sha256("tx");
        let tx_hex = tx.to_hex();
        let input = format!("{}:3", SecureHash::sha256("issue"));
        let cli = Cli::try_parse_from([
            "notary",
            "commit",
            "--addr",
            "127.0.0.1:7001,127.0.0.1:7002",
            "--tx",
            tx_hex.as_str(),
            "--input",
            input.as_str(),
            "--party",
            "alice",
        ])
        .unwrap();

        match cli.command {
            Commands::Commit {
                addr,
                tx: parsed,
                inputs,
                party,
            } => {
                assert_eq!(addr.len(), 2);
                assert_eq!(parsed, tx);
                assert_eq!(inputs, vec![StateRef::new(SecureHash::sha256("issue"), 3)]);
                assert_eq!(party, "alice");
            }
            _ => panic!("expected commit"),
        }
    }

    #[test]
    fn test_rejects_malformed_input() {
        let result = Cli::try_parse_from([
            "notary", "get", "--addr", "127.0.0.1:7001", "--input", "not-a-state",
        ]);
        assert!(result.is_err());
    }
}
