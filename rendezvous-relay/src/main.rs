//! rendezvous-relay binary entry point.
//!
//! Usage:
//! ```bash
//! rendezvous-relay start --config relay.toml
//! rendezvous-relay start --ip 0.0.0.0 --port 9000 --debug
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rendezvous_relay::{Config, Relay};
use std::path::PathBuf;
use std::sync::Arc;

/// mTLS rendezvous relay.
#[derive(Parser, Debug)]
#[command(name = "rendezvous-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay
    Start {
        /// Configuration file
        #[arg(long, short, default_value = "relay.toml")]
        config: PathBuf,

        /// IP address to listen on (overrides the config file)
        #[arg(long)]
        ip: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(long, short)]
        port: Option<u16>,

        /// Verbose logging
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            config,
            ip,
            port,
            debug,
        } => start(config, ip, port, debug).await,
    }
}

async fn start(path: PathBuf, ip: Option<String>, port: Option<u16>, debug: bool) -> Result<()> {
    let mut config = Config::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(ip) = ip {
        config.server.ip = ip;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.server.debug |= debug;

    let bind_address = config.server.bind_address();
    let debug = config.server.debug;
    let relay = Arc::new(
        Relay::init(config, bind_address, debug).context("Failed to initialize relay")?,
    );

    tokio::select! {
        result = relay.start() => result.context("Relay stopped")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
