//! Configuration initialization and hierarchy management

use anyhow::{Context, Result};
use tracing::debug;

use crate::adapters::AppConfig;
use crate::cli::{Cli, Commands};

/// Resolve the effective configuration following precedence: CLI > Env > File > Defaults
pub fn initialize_configuration_hierarchy(cli: &Cli) -> Result<AppConfig> {
    let mut config =
        AppConfig::discover(cli.config.as_deref()).context("Failed to load configuration file")?;

    config
        .apply_env(|key| std::env::var(key).ok())
        .context("Invalid environment override")?;

    let overrides = apply_cli_configuration_overrides(&mut config, cli);
    debug!(overrides, "Applied CLI configuration overrides");

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Apply CLI argument overrides, returning how many were applied
pub fn apply_cli_configuration_overrides(config: &mut AppConfig, cli: &Cli) -> usize {
    let mut cli_overrides = 0;

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
        cli_overrides += 1;
    }
    if cli.log_json {
        config.logging.json = true;
        cli_overrides += 1;
    }
    if let Commands::Strip(args) = &cli.command {
        if let Some(count) = args.count {
            config.sampler.frame_count = count as usize;
            cli_overrides += 1;
        }
    }

    cli_overrides
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_overrides_win() {
        let cli = Cli::try_parse_from([
            "framecut",
            "--log-level",
            "trace",
            "--log-json",
            "strip",
            "--input",
            "clip.mp4",
            "--count",
            "4",
        ])
        .unwrap();

        let mut config = AppConfig::default();
        config.logging.level = "warn".to_string();
        assert_eq!(apply_cli_configuration_overrides(&mut config, &cli), 3);
        assert_eq!(config.logging.level, "trace");
        assert!(config.logging.json);
        assert_eq!(config.sampler.frame_count, 4);
    }

    #[test]
    fn test_explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[trim]\nevent_capacity = 8\n").unwrap();

        let cli = Cli::try_parse_from([
            "framecut",
            "--config",
            path.to_str().unwrap(),
            "config",
        ])
        .unwrap();
        let config = initialize_configuration_hierarchy(&cli).unwrap();
        assert_eq!(config.trim.event_capacity, 8);
    }
}
