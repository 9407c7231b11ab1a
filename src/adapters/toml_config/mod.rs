// TOML config adapter - Typed configuration loaded from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::frame_sampler::SamplerConfig;
use crate::app::trim_job::TrimConfig;
use crate::error::{FramecutError, FramecutResult};
use crate::utils::logging::LoggingConfig;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "framecut.toml";

/// Locations of the external ffmpeg tools
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Interval between position updates while playing
    pub tick_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { tick_ms: 250 }
    }
}

impl PlaybackConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Effective application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sampler: SamplerConfig,
    pub engine: EngineConfig,
    pub playback: PlaybackConfig,
    pub trim: TrimConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Parse a TOML document; missing sections and keys take defaults
    pub fn from_toml_str(content: &str) -> FramecutResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> FramecutResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FramecutError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults
    pub fn discover(explicit: Option<&Path>) -> FramecutResult<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    debug!("No configuration file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Apply `FRAMECUT_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> FramecutResult<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0;
        if let Some(level) = lookup("FRAMECUT_LOG_LEVEL") {
            self.logging.level = level;
            applied += 1;
        }
        if let Some(json) = lookup("FRAMECUT_LOG_JSON") {
            self.logging.json = parse_env_bool("FRAMECUT_LOG_JSON", &json)?;
            applied += 1;
        }
        if let Some(path) = lookup("FRAMECUT_FFMPEG") {
            self.engine.ffmpeg_path = PathBuf::from(path);
            applied += 1;
        }
        if let Some(path) = lookup("FRAMECUT_FFPROBE") {
            self.engine.ffprobe_path = PathBuf::from(path);
            applied += 1;
        }
        if let Some(count) = lookup("FRAMECUT_FRAME_COUNT") {
            self.sampler.frame_count = parse_env_number("FRAMECUT_FRAME_COUNT", &count)?;
            applied += 1;
        }
        if let Some(tick) = lookup("FRAMECUT_TICK_MS") {
            self.playback.tick_ms = parse_env_number("FRAMECUT_TICK_MS", &tick)?;
            applied += 1;
        }
        if applied > 0 {
            info!(applied, "Applied environment overrides");
        }
        Ok(applied)
    }

    pub fn validate(&self) -> FramecutResult<()> {
        self.sampler.validate()?;
        self.trim.validate()?;
        self.logging.validate()?;
        if self.playback.tick_ms == 0 {
            return Err(FramecutError::Config {
                message: "playback.tick_ms must be at least 1".to_string(),
            });
        }
        if self.engine.ffmpeg_path.as_os_str().is_empty()
            || self.engine.ffprobe_path.as_os_str().is_empty()
        {
            return Err(FramecutError::Config {
                message: "engine tool paths must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> FramecutResult<String> {
        toml::to_string_pretty(self).map_err(|e| FramecutError::Config {
            message: format!("failed to serialize configuration: {}", e),
        })
    }
}

fn parse_env_bool(key: &str, value: &str) -> FramecutResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(FramecutError::Config {
            message: format!("{} must be a boolean (got '{}')", key, other),
        }),
    }
}

fn parse_env_number<T: std::str::FromStr>(key: &str, value: &str) -> FramecutResult<T> {
    value.trim().parse::<T>().map_err(|_| FramecutError::Config {
        message: format!("{} must be a non-negative integer (got '{}')", key, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.sampler.frame_count, 10);
        assert_eq!(config.playback.tick_ms, 250);
        assert_eq!(config.trim.event_capacity, 64);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [sampler]
            frame_count = 4

            [engine]
            ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
            "#,
        )
        .unwrap();
        assert_eq!(config.sampler.frame_count, 4);
        assert_eq!(config.sampler.thumb_width, 80);
        assert_eq!(config.engine.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.engine.ffprobe_path, PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let err = AppConfig::from_toml_str("[sampler\nframe_count = ").unwrap_err();
        assert!(matches!(err, FramecutError::Config { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FRAMECUT_LOG_LEVEL", "debug"),
            ("FRAMECUT_LOG_JSON", "true"),
            ("FRAMECUT_FRAME_COUNT", "6"),
            ("FRAMECUT_TICK_MS", "40"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        let applied = config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(applied, 4);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert_eq!(config.sampler.frame_count, 6);
        assert_eq!(config.playback.tick(), Duration::from_millis(40));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = AppConfig::default();
        assert!(config
            .apply_env(|key| (key == "FRAMECUT_FRAME_COUNT").then(|| "many".to_string()))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = AppConfig::default();
        config.sampler.frame_count = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.playback.tick_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_output_parses_back() {
        let mut config = AppConfig::default();
        config.sampler.frame_count = 3;
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("[sampler]"));
        assert_eq!(AppConfig::from_toml_str(&text).unwrap(), config);
    }
}
