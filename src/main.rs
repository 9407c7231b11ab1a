//! framecut CLI
//!
//! Samples thumbnail strips from local videos, follows the playback cursor
//! along the strip and cuts stream-copy sub-clips through ffmpeg.
//!
//! # Usage
//!
//! ```bash
//! framecut strip --input holiday.mp4 --count 10 --out-dir thumbs
//! framecut trim --input holiday.mp4 --start 00:02 --duration 5
//! framecut preview --input holiday.mp4 --track-width 800
//! framecut config
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use framecut::app::container::{AppContainer, DefaultAppContainer};
use framecut::cli::{commands, Cli, Commands};
use framecut::config_initialization::initialize_configuration_hierarchy;
use framecut::utils::logging::init_logging;

/// Main entry point for the framecut CLI application
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = initialize_configuration_hierarchy(&cli)?;
    init_logging(&config.logging).context("Failed to initialize logging")?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting framecut");

    match cli.command {
        Commands::Config => commands::show_config(&config)?,
        command => {
            let container = DefaultAppContainer::new(config, cli.dry_run)
                .context("Failed to initialize application")?;
            run(&container, command).await?;
        }
    }

    info!("framecut completed successfully");
    Ok(())
}

async fn run(container: &dyn AppContainer, command: Commands) -> Result<()> {
    match command {
        Commands::Strip(args) => {
            info!("Executing strip command");
            commands::strip(container, args).await
        }
        Commands::Trim(args) => {
            info!("Executing trim command");
            commands::trim(container, args).await
        }
        Commands::Preview(args) => {
            info!("Executing preview command");
            commands::preview(container, args).await
        }
        Commands::Config => commands::show_config(container.config()),
    }
}
