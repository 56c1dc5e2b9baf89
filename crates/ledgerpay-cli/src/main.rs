//! Ledgerpay CLI: settle payment requests from the command line.
//!
//! Subcommands: init, pay, observe.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::LedgerpayConfig;

/// Ledgerpay: pay off-chain requests with on-chain tokens.
#[derive(Parser, Debug)]
#[command(name = "ledgerpay", version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, global = true, default_value = "ledgerpay.toml")]
    config: PathBuf,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file.
    Init(commands::init::InitArgs),
    /// Create a request and pay it end to end on the simulated ledger.
    Pay(commands::pay::PayArgs),
    /// Create a request, have a third party pay it, and watch it settle.
    Observe(commands::observe::ObserveArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Init(args) = &cli.command {
        return commands::init::run(args, &cli.config);
    }

    let mut config = LedgerpayConfig::load(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    init_tracing(&config);

    match &cli.command {
        Commands::Init(_) => Ok(()),
        Commands::Pay(args) => commands::pay::run(args, &config).await,
        Commands::Observe(args) => commands::observe::run(args, &config).await,
    }
}

fn init_tracing(config: &LedgerpayConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
