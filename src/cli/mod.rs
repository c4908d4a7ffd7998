// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Sensor Envelope CLI
#[derive(Parser, Debug)]
#[command(name = "sensor-envelope")]
#[command(version)]
#[command(about = "Seal and open encrypted sensor readings", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the public key derived for a device
    Keygen(commands::KeygenArgs),

    /// Generate a collector keypair
    ServerKeygen,

    /// Seal a temperature/humidity reading
    Seal(commands::SealArgs),

    /// Open an envelope on the device side
    Open(commands::OpenArgs),

    /// Open an envelope as the collector
    Collect(commands::CollectArgs),

    /// Print version and cipher suite information
    Version,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Keygen(args) => commands::keygen(args).await,
        Commands::ServerKeygen => commands::server_keygen().await,
        Commands::Seal(args) => commands::seal(args).await,
        Commands::Open(args) => commands::open(args).await,
        Commands::Collect(args) => commands::collect(args).await,
        Commands::Version => {
            println!("{}", serde_json::to_string_pretty(&crate::version::get_version_info())?);
            Ok(())
        }
    }
}
