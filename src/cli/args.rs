//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

/// Arguments for the strip command
#[derive(Args, Debug)]
pub struct StripArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Number of intervals; the strip holds count + 1 frames
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub count: Option<u32>,

    /// Directory to write frame_000.png, frame_001.png, ... into
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Replace existing frame files
    #[arg(long)]
    pub overwrite: bool,

    /// Print frame times as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the trim command
#[derive(Args, Debug)]
pub struct TrimArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Start time (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub start: String,

    /// Clip length (HH:MM:SS.ms, MM:SS.ms, or seconds)
    #[arg(short, long)]
    pub duration: String,

    /// Output file path (default: <stem>_trim_<start>_<end>.<ext>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replace an existing output file
    #[arg(long)]
    pub overwrite: bool,

    /// Report progress as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the preview command
#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Width of the thumbnail track in pixels
    #[arg(long, default_value_t = 800.0)]
    pub track_width: f64,

    /// Width of the visible part of the track in pixels
    #[arg(long)]
    pub viewport: Option<f64>,
}
