//! Artifact and thumbnail writer

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::model::{ArtifactRef, Frame};
use crate::error::{FramecutError, FramecutResult};

/// Writes downloadable bytes next to their final location, then renames
pub struct OutputWriter {
    overwrite: bool,
}

impl OutputWriter {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }

    /// Save a trim artifact to `path`
    pub fn save_artifact(&self, artifact: &ArtifactRef, path: &Path) -> FramecutResult<PathBuf> {
        self.write_atomic(path, artifact.bytes())?;
        info!(
            path = %path.display(),
            bytes = artifact.len(),
            job = artifact.job_id,
            "Saved trimmed clip"
        );
        Ok(path.to_path_buf())
    }

    /// Save each frame's PNG as `frame_000.png`, `frame_001.png`, ... in `dir`
    pub fn write_frames(&self, frames: &[Frame], dir: &Path) -> FramecutResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| FramecutError::Io {
            message: format!("failed to create {}: {}", dir.display(), e),
        })?;

        let mut written = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            let path = dir.join(frame_file_name(index));
            self.write_atomic(&path, frame.image().png())?;
            written.push(path);
        }
        info!(count = written.len(), dir = %dir.display(), "Wrote frame strip");
        Ok(written)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> FramecutResult<()> {
        if !self.overwrite && path.exists() {
            return Err(FramecutError::Io {
                message: format!("{} already exists (use --overwrite)", path.display()),
            });
        }

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let mut temp = NamedTempFile::new_in(&parent)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| FramecutError::Io {
            message: format!("failed to move output into {}: {}", path.display(), e.error),
        })?;
        debug!(path = %path.display(), bytes = bytes.len(), "Atomic write completed");
        Ok(())
    }
}

pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:03}.png", index)
}
