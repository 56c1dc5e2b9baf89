//! `ledgerpay init`: write a default configuration file.

use clap::Args;
use std::path::Path;

use crate::config::LedgerpayConfig;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: &InitArgs, path: &Path) -> anyhow::Result<()> {
    if path.exists() && !args.force {
        anyhow::bail!("configuration file already exists at {}", path.display());
    }

    LedgerpayConfig::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    println!("Edit it to set the token, settlement contract and poll timing.");
    Ok(())
}
