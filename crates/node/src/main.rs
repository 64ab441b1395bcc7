#![forbid(unsafe_code)]

//! # attestord
//!
//! The Attestor oracle node daemon.

use anyhow::Result;
use attestor_node::NodeBuilder;
use attestor_types::config::NodeConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "attestord",
    version,
    about = "The Attestor oracle network node",
    long_about = "Runs one node of the Attestor oracle network: the peer \
                  protocol server, the external API, the metrics endpoint, \
                  and, on the primary, the source-chain listeners."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the node until interrupted.
    Run {
        /// Path to the YAML (or JSON) configuration file.
        #[clap(long, short)]
        config: PathBuf,
    },
    /// Parse and validate a configuration file, then exit.
    CheckConfig {
        /// Path to the YAML (or JSON) configuration file.
        #[clap(long, short)]
        config: PathBuf,
    },
    /// Generate a fresh secp256k1 key pair for a new node.
    Keygen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config } => {
            attestor_telemetry::init_tracing()?;
            let node = NodeBuilder::from_config_path(&config)?;
            tracing::info!(
                target: "node",
                id = %node.config().id,
                primary = node.config().primary,
                peers = node.config().peers.len(),
                "configuration loaded"
            );
            node.run().await
        }
        Commands::CheckConfig { config } => {
            let parsed = NodeConfig::load(&config)?;
            println!(
                "ok: node '{}' ({}), {} peer(s), quorum {}",
                parsed.id,
                if parsed.primary { "primary" } else { "secondary" },
                parsed.peers.len(),
                parsed.min_signatures_required
            );
            Ok(())
        }
        Commands::Keygen => {
            let keys = attestor_crypto::NodeKeys::generate();
            println!("privateKey: \"{}\"", keys.secret_key_hex());
            println!("publicKey: \"{}\"", keys.public_key_hex());
            Ok(())
        }
    }
}
