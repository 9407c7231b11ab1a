//! Logging configuration and subscriber setup

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::{FramecutError, FramecutResult};

/// Logging configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (`error`, `warn`, `info`, `debug`, `trace`)
    pub level: String,
    /// Emit one JSON object per event instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> FramecutResult<()> {
        self.parsed_level().map(|_| ())
    }

    fn parsed_level(&self) -> FramecutResult<Level> {
        Level::from_str(self.level.trim()).map_err(|_| FramecutError::Config {
            message: format!(
                "logging.level must be one of error, warn, info, debug, trace (got '{}')",
                self.level
            ),
        })
    }

    /// Filter from `RUST_LOG` when set, else from the configured level
    fn filter(&self) -> FramecutResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let level = self.parsed_level()?;
        Ok(EnvFilter::new(level.to_string().to_lowercase()))
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for command output.
pub fn init_logging(config: &LoggingConfig) -> FramecutResult<()> {
    let filter = config.filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| FramecutError::Config {
        message: format!("failed to install logger: {}", e),
    })?;

    tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}
