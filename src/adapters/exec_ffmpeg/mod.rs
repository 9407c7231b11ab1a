//! FFmpeg execution adapter
//!
//! Runs the ffmpeg binary as a subprocess. The engine's virtual file system
//! is a private temporary directory created by `initialize`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::model::TrimCommand;
use crate::error::{FramecutError, FramecutResult};
use crate::ports::TranscodePort;

/// Lines of ffmpeg's stderr kept in error messages
const STDERR_TAIL_LINES: usize = 5;

/// ffmpeg-based transcoding engine
pub struct FfmpegTranscodeAdapter {
    ffmpeg_path: PathBuf,
    workdir: Mutex<Option<TempDir>>,
}

impl FfmpegTranscodeAdapter {
    /// Create new FFmpeg adapter
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            workdir: Mutex::new(None),
        }
    }

    /// Resolve a virtual file name inside the work directory
    fn path_for(&self, name: &str) -> FramecutResult<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name == "."
            || name == ".."
        {
            return Err(FramecutError::invalid(format!(
                "invalid engine file name: {}",
                name
            )));
        }
        let workdir = self
            .workdir
            .lock()
            .map_err(|_| FramecutError::transcode("engine work directory lock poisoned"))?;
        match workdir.as_ref() {
            Some(dir) => Ok(dir.path().join(name)),
            None => Err(FramecutError::EngineNotReady {
                state: "unloaded".to_string(),
            }),
        }
    }
}

#[async_trait]
impl TranscodePort for FfmpegTranscodeAdapter {
    async fn initialize(&self) -> FramecutResult<()> {
        let output = Command::new(&self.ffmpeg_path)
            .arg("-hide_banner")
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| FramecutError::EngineLoad {
                message: format!("cannot run {}: {}", self.ffmpeg_path.display(), e),
            })?;
        if !output.status.success() {
            return Err(FramecutError::EngineLoad {
                message: format!(
                    "{} -version exited with {}",
                    self.ffmpeg_path.display(),
                    output.status
                ),
            });
        }

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        let dir = tempfile::Builder::new()
            .prefix("framecut-engine-")
            .tempdir()
            .map_err(|e| FramecutError::EngineLoad {
                message: format!("cannot create work directory: {}", e),
            })?;
        info!(%version, workdir = %dir.path().display(), "ffmpeg engine initialized");

        let mut workdir = self
            .workdir
            .lock()
            .map_err(|_| FramecutError::transcode("engine work directory lock poisoned"))?;
        *workdir = Some(dir);
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> FramecutResult<()> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, bytes).await?;
        debug!(file = name, bytes = bytes.len(), "Wrote engine file");
        Ok(())
    }

    async fn run_trim(
        &self,
        command: &TrimCommand,
        progress: mpsc::UnboundedSender<f64>,
    ) -> FramecutResult<()> {
        let input = self.path_for(&command.input_name)?;
        let output = self.path_for(&command.output_name)?;

        let mut args: Vec<String> = [
            "-hide_banner",
            "-nostdin",
            "-y",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(command.to_args(&path_string(&input), &path_string(&output)));
        debug!(?args, "Running ffmpeg");

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FramecutError::transcode(format!("failed to start ffmpeg: {}", e)))?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                if let Some(ratio) = parse_progress_line(&line, command.duration) {
                    let _ = progress.send(ratio);
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(FramecutError::transcode(format!(
                "ffmpeg exited with {}: {}",
                status,
                stderr_tail(&stderr)
            )));
        }
        Ok(())
    }

    async fn read_file(&self, name: &str) -> FramecutResult<Vec<u8>> {
        let path = self.path_for(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| FramecutError::transcode(format!("{}: {}", name, e)))
    }

    async fn remove_file(&self, name: &str) -> FramecutResult<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Progress ratio from one `-progress` line, relative to the clip duration.
///
/// `out_time_us` and `out_time_ms` both carry microseconds.
pub fn parse_progress_line(line: &str, clip_duration: f64) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            if clip_duration <= 0.0 {
                return None;
            }
            let micros = value.trim().parse::<i64>().ok()?;
            Some((micros.max(0) as f64 / 1_000_000.0 / clip_duration).clamp(0.0, 1.0))
        }
        "progress" if value.trim() == "end" => Some(1.0),
        _ => None,
    }
}

fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join(" | ");
    if tail.is_empty() {
        "no diagnostic output".to_string()
    } else {
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(parse_progress_line("out_time_us=2500000", 5.0), Some(0.5));
        assert_eq!(parse_progress_line("out_time_ms=5000000", 5.0), Some(1.0));
        assert_eq!(parse_progress_line("out_time_us=9000000", 5.0), Some(1.0));
        assert_eq!(parse_progress_line("out_time_us=N/A", 5.0), None);
        assert_eq!(parse_progress_line("progress=end", 5.0), Some(1.0));
        assert_eq!(parse_progress_line("progress=continue", 5.0), None);
        assert_eq!(parse_progress_line("frame=12", 5.0), None);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr = "a\nb\n\nc\nd\ne\nf\ng\n";
        assert_eq!(stderr_tail(stderr), "c | d | e | f | g");
        assert_eq!(stderr_tail(""), "no diagnostic output");
    }

    #[tokio::test]
    async fn test_file_access_requires_initialize() {
        let adapter = FfmpegTranscodeAdapter::new("ffmpeg");
        assert!(matches!(
            adapter.write_file("input.mp4", b"data").await,
            Err(FramecutError::EngineNotReady { .. })
        ));
    }

    #[tokio::test]
    async fn test_initialize_fails_for_missing_binary() {
        let adapter = FfmpegTranscodeAdapter::new("/nonexistent/ffmpeg-binary");
        assert!(matches!(
            adapter.initialize().await,
            Err(FramecutError::EngineLoad { .. })
        ));
    }

    #[test]
    fn test_rejects_path_traversal_names() {
        let adapter = FfmpegTranscodeAdapter::new("ffmpeg");
        assert!(matches!(
            adapter.path_for("../escape.mp4"),
            Err(FramecutError::InvalidRequest { .. })
        ));
    }
}
