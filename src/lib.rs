//! framecut library
//!
//! Frame sampling and timeline synchronization for a local video, plus a
//! single-flight trim job controller driving an external transcoding engine.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod error;
pub mod output;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use app::{PreviewWorkspace, TrimJob};
pub use domain::model::{
    ArtifactRef, EngineState, Frame, MediaMetadata, ProcessingState, SourceRef, StripState,
    TrimRequest,
};
pub use error::{FramecutError, FramecutResult};
