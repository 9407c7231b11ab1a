// Adapters - External system implementations

pub mod decode_ffmpeg;
pub mod exec_ffmpeg;
pub mod scripted;
pub mod toml_config;

// Re-export adapters
pub use decode_ffmpeg::FfmpegDecoderAdapter;
pub use exec_ffmpeg::FfmpegTranscodeAdapter;
pub use scripted::{ScriptedDecoder, ScriptedTranscoder};
pub use toml_config::AppConfig;
