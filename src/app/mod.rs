// Application layer - Session, sampling and trim orchestration

pub mod container;
pub mod engine_gate;
pub mod frame_sampler;
pub mod media_session;
pub mod subscribers;
pub mod trim_job;
pub mod workspace;

// Re-export the main entry points
pub use engine_gate::EngineGate;
pub use frame_sampler::{FrameSampler, SamplerConfig};
pub use media_session::MediaSession;
pub use subscribers::{Subscribers, Subscription};
pub use trim_job::{TrimConfig, TrimJob, TrimJobController};
pub use workspace::PreviewWorkspace;
