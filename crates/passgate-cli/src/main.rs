//! Passgate - terminal host for the passcode session gate

mod biometric;
mod commands;
mod host;
mod prompt;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passgate_core::GateConfig;

use crate::host::{Backend, Host};

/// Passgate - passcode and biometric lock for a signed-in session
#[derive(Parser)]
#[command(name = "passgate")]
#[command(about = "Passcode and biometric session gate")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (defaults to $PASSGATE_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Never offer biometric unlock, whatever the config says
    #[arg(long, global = true)]
    no_biometry: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show session flags and gate settings
    Status,

    /// Sign in and set a new passcode
    Register,

    /// Unlock the session (biometry first, then the keypad)
    Unlock,

    /// Replace the current passcode
    Change,

    /// Sign out and delete stored credentials
    Logout,

    /// Drive the gate interactively with simulated lifecycle events (in-memory stores)
    Simulate {
        /// Register this passcode before starting
        #[arg(long)]
        seed: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "passgate_core=warn,passgate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(GateConfig::default_path);
    let mut config = GateConfig::load_or_init(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    if cli.no_biometry {
        config.biometry_enabled = false;
    }
    info!("Using config {:?}", config_path);

    match cli.command {
        Commands::Status => {
            let host = Host::open(config, Backend::Keychain)?;
            commands::status(&host).await?;
        }
        Commands::Register => {
            let host = Host::open(config, Backend::Keychain)?;
            commands::register(&host).await?;
        }
        Commands::Unlock => {
            let host = Host::open(config, Backend::Keychain)?;
            commands::unlock(&host).await?;
        }
        Commands::Change => {
            let host = Host::open(config, Backend::Keychain)?;
            commands::change(&host).await?;
        }
        Commands::Logout => {
            let host = Host::open(config, Backend::Keychain)?;
            commands::logout(&host).await?;
        }
        Commands::Simulate { seed } => {
            let host = Host::open(config, Backend::Memory)?;
            commands::simulate(&host, seed).await?;
        }
    }

    Ok(())
}
