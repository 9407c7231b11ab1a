//! Progress rendering for trim jobs

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::model::ProcessingState;
use crate::utils::format_file_size;

const BAR_WIDTH: usize = 30;

/// Renders the event stream of one trim job
pub trait ProgressReporter {
    /// Render one state published for job `job_id`
    fn report(&mut self, job_id: u64, state: &ProcessingState) -> io::Result<()>;
}

/// Single-line text bar, redrawn in place
pub struct ConsoleProgress<W: Write> {
    out: W,
    drawn: bool,
}

impl<W: Write> ConsoleProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out, drawn: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.drawn {
            writeln!(self.out)?;
            self.drawn = false;
        }
        Ok(())
    }
}

impl<W: Write> ProgressReporter for ConsoleProgress<W> {
    fn report(&mut self, job_id: u64, state: &ProcessingState) -> io::Result<()> {
        match state {
            ProcessingState::Idle => {}
            ProcessingState::Running(ratio) => {
                let ratio = ratio.clamp(0.0, 1.0);
                let filled = (ratio * BAR_WIDTH as f64).round() as usize;
                write!(
                    self.out,
                    "\rjob {} [{}{}] {:>5.1}%",
                    job_id,
                    "#".repeat(filled),
                    "-".repeat(BAR_WIDTH - filled),
                    ratio * 100.0
                )?;
                self.drawn = true;
            }
            ProcessingState::Completed(artifact) => {
                self.end_line()?;
                writeln!(
                    self.out,
                    "job {} completed: {} ({})",
                    job_id,
                    artifact.file_name,
                    format_file_size(artifact.len() as u64)
                )?;
            }
            ProcessingState::Failed(error) => {
                self.end_line()?;
                writeln!(self.out, "job {} failed: {}", job_id, error)?;
            }
        }
        self.out.flush()
    }
}

#[derive(Debug, Serialize)]
struct ProgressEvent<'a> {
    timestamp: DateTime<Utc>,
    job_id: u64,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// One JSON object per line
pub struct JsonProgress<W: Write> {
    out: W,
}

impl<W: Write> JsonProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressReporter for JsonProgress<W> {
    fn report(&mut self, job_id: u64, state: &ProcessingState) -> io::Result<()> {
        let mut event = ProgressEvent {
            timestamp: Utc::now(),
            job_id,
            state: "idle",
            progress: None,
            file_name: None,
            bytes: None,
            error: None,
        };
        match state {
            ProcessingState::Idle => {}
            ProcessingState::Running(ratio) => {
                event.state = "running";
                event.progress = Some(*ratio);
            }
            ProcessingState::Completed(artifact) => {
                event.state = "completed";
                event.progress = Some(1.0);
                event.file_name = Some(&artifact.file_name);
                event.bytes = Some(artifact.len());
            }
            ProcessingState::Failed(error) => {
                event.state = "failed";
                event.error = Some(error.to_string());
            }
        }
        serde_json::to_writer(&mut self.out, &event)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ArtifactRef;
    use crate::error::FramecutError;

    #[test]
    fn test_console_bar_and_completion() {
        let mut reporter = ConsoleProgress::new(Vec::new());
        reporter.report(1, &ProcessingState::Running(0.5)).unwrap();
        let artifact = ArtifactRef::new(1, "clip_trim_2s_7s.mp4", "video/mp4", vec![0u8; 2048]);
        reporter
            .report(1, &ProcessingState::Completed(artifact))
            .unwrap();

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(text.contains(" 50.0%"));
        assert!(text.contains(&format!("[{}{}]", "#".repeat(15), "-".repeat(15))));
        assert!(text.ends_with("job 1 completed: clip_trim_2s_7s.mp4 (2.00 KB)\n"));
    }

    #[test]
    fn test_json_events_one_per_line() {
        let mut reporter = JsonProgress::new(Vec::new());
        reporter.report(3, &ProcessingState::Running(0.25)).unwrap();
        reporter
            .report(3, &ProcessingState::Failed(FramecutError::Cancelled))
            .unwrap();

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["state"], "running");
        assert_eq!(lines[0]["progress"], 0.25);
        assert_eq!(lines[0]["job_id"], 3);
        assert!(lines[0]["timestamp"].is_string());
        assert_eq!(lines[1]["state"], "failed");
        assert!(lines[1].get("progress").is_none());
        assert!(lines[1]["error"].as_str().unwrap().contains("cancel"));
    }
}
