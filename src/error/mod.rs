//! Error handling module for framecut

use thiserror::Error;

/// Main error type for framecut operations.
///
/// Errors are `Clone` because they are stored inside observable state
/// (`ProcessingState::Failed`, `StripState::Failed`).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FramecutError {
    /// The transcoding engine failed to initialize
    #[error("Failed to load transcoding engine: {message}")]
    EngineLoad { message: String },

    /// A trim was requested before the engine became ready
    #[error("Transcoding engine is not ready (state: {state})")]
    EngineNotReady { state: String },

    /// A seek did not settle
    #[error("Seek to {time:.3}s failed: {message}")]
    Seek { time: f64, message: String },

    /// The engine's trim command failed
    #[error("Transcode failed: {message}")]
    Transcode { message: String },

    /// A trim job is already running or has an unacknowledged result
    #[error("A trim job is already in progress")]
    JobBusy,

    /// Trim request or sampler arguments out of range
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// No media resource is loaded
    #[error("No media resource is loaded")]
    NoResource,

    /// Decoder-level failure (open, capture, playback)
    #[error("Media error: {message}")]
    Media { message: String },

    /// Work superseded by a newer load or an explicit cancel
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O error
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl FramecutError {
    pub fn media(message: impl Into<String>) -> Self {
        Self::Media {
            message: message.into(),
        }
    }

    pub fn transcode(message: impl Into<String>) -> Self {
        Self::Transcode {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for FramecutError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for FramecutError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

impl From<image::ImageError> for FramecutError {
    fn from(err: image::ImageError) -> Self {
        Self::Media {
            message: format!("image processing failed: {}", err),
        }
    }
}

/// Result type alias for framecut operations
pub type FramecutResult<T> = std::result::Result<T, FramecutError>;
