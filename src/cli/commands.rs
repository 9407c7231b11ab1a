//! Command implementations

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::sync::Notify;
use tokio_stream::StreamExt;
use tracing::info;

use crate::adapters::AppConfig;
use crate::app::container::AppContainer;
use crate::cli::args::{PreviewArgs, StripArgs, TrimArgs};
use crate::domain::model::{EngineState, ProcessingState, SourceRef, StripState, TrimRequest};
use crate::domain::timeline::{position_to_offset, scroll_to_reveal};
use crate::output::{ConsoleProgress, JsonProgress, OutputWriter, ProgressReporter};
use crate::utils::time::{format_time, parse_time};

#[derive(Serialize)]
struct FrameReport {
    index: usize,
    time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
}

/// Load a video and print (and optionally save) its thumbnail strip
pub async fn strip(container: &dyn AppContainer, args: StripArgs) -> Result<()> {
    let workspace = container.workspace();
    let source = SourceRef::from_path(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let metadata = workspace
        .load(source)
        .await
        .context("Failed to load media")?;
    info!(duration = metadata.duration, "Sampling frame strip");

    let frames = match workspace.wait_for_strip().await {
        StripState::Ready(frames) => frames,
        StripState::Failed(e) => return Err(e).context("Frame sampling failed"),
        other => bail!("Frame strip was not produced ({:?})", other),
    };

    let paths = match &args.out_dir {
        Some(dir) => OutputWriter::new(args.overwrite)
            .write_frames(&frames, dir)
            .context("Failed to write frames")?
            .into_iter()
            .map(Some)
            .collect(),
        None => vec![None; frames.len()],
    };

    let reports: Vec<FrameReport> = frames
        .iter()
        .zip(paths)
        .enumerate()
        .map(|(index, (frame, path))| FrameReport {
            index,
            time: frame.time(),
            path,
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!(
            "{} frames over {}",
            reports.len(),
            format_time(metadata.duration)
        );
        for report in &reports {
            match &report.path {
                Some(path) => println!(
                    "{:>3}  {}  {}",
                    report.index,
                    format_time(report.time),
                    path.display()
                ),
                None => println!("{:>3}  {}", report.index, format_time(report.time)),
            }
        }
    }
    Ok(())
}

/// Trim a sub-clip and save it
pub async fn trim(container: &dyn AppContainer, args: TrimArgs) -> Result<()> {
    let start = parse_time(&args.start).context("Invalid start time")?;
    let duration = parse_time(&args.duration).context("Invalid duration")?;
    let request = TrimRequest::new(start, duration);
    request.validate().context("Invalid trim range")?;

    let workspace = container.workspace();
    let source = SourceRef::from_path(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    workspace
        .load(source)
        .await
        .context("Failed to load media")?;

    match container.gate().wait_settled().await {
        EngineState::Ready => {}
        other => bail!("Transcoding engine unavailable: {}", other),
    }

    let mut job = workspace
        .submit_trim(request)
        .context("Trim request rejected")?;
    let job_id = job.id();

    let mut reporter: Box<dyn ProgressReporter> = if args.json {
        Box::new(JsonProgress::new(io::stdout()))
    } else {
        Box::new(ConsoleProgress::new(io::stderr()))
    };

    while let Some(state) = job.next().await {
        reporter.report(job_id, &state)?;
        match state {
            ProcessingState::Completed(artifact) => {
                let path = args
                    .output
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(&artifact.file_name));
                OutputWriter::new(args.overwrite)
                    .save_artifact(&artifact, &path)
                    .context("Failed to save trimmed clip")?;
                if !args.json {
                    println!("{}", path.display());
                }
                return Ok(());
            }
            ProcessingState::Failed(e) => return Err(e).context("Trim failed"),
            _ => {}
        }
    }
    bail!("Trim job {} ended without a result", job_id)
}

/// Play to the end, printing the cursor offset on every position update
pub async fn preview(container: &dyn AppContainer, args: PreviewArgs) -> Result<()> {
    if !args.track_width.is_finite() || args.track_width <= 0.0 {
        bail!("--track-width must be a positive number");
    }
    let viewport = args.viewport.unwrap_or(args.track_width);

    let workspace = container.workspace();
    let source = SourceRef::from_path(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let metadata = workspace
        .load(source)
        .await
        .context("Failed to load media")?;

    let duration = metadata.duration;
    let track_width = args.track_width;
    let _position = workspace.subscribe_position(move |time| {
        let offset = position_to_offset(time, duration, track_width);
        let scroll = scroll_to_reveal(offset, viewport, track_width);
        println!(
            "{}  offset {:>8.1}px  scroll {:>8.1}px",
            format_time(time),
            offset,
            scroll
        );
    });

    let ended = Arc::new(Notify::new());
    let _ended = workspace.subscribe_ended({
        let ended = Arc::clone(&ended);
        move |_| ended.notify_one()
    });

    println!(
        "{}  offset {:>8.1}px  (duration {})",
        format_time(0.0),
        workspace.cursor_offset(track_width),
        format_time(duration)
    );
    workspace.play().await.context("Failed to start playback")?;
    ended.notified().await;
    println!("ended");
    Ok(())
}

/// Print the effective configuration as TOML
pub fn show_config(config: &AppConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
