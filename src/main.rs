use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use lissabon_bridge_lib::config::{DEFAULT_CONFIG_FILE_NAME, LissabonConfig};
use lissabon_bridge_lib::logging;
use lissabon_bridge_lib::state::BridgeState;

/// Bridge for Lissabon dimmers and LED strips
#[derive(Debug, Parser)]
#[command(name = "lissabon-bridge", version)]
struct Args {
    /// Path of the JSON config file
    #[arg(default_value = DEFAULT_CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Write a default config to CONFIG and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init_config {
        logging::init("info");
        LissabonConfig::default()
            .save(&args.config)
            .await
            .with_context(|| format!("Failed to write {}", args.config.display()))?;
        return Ok(());
    }

    let config = LissabonConfig::load(&args.config)
        .await
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    logging::init(&config.log_level);

    let mut state = BridgeState::new(config)?;
    let mode = state.start().await?;
    info!("Lissabon bridge running ({:?}), press Ctrl-C to stop", mode);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    state.shutdown().await
}
