//! CLI module for framecut
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

/// framecut - thumbnail strips, timeline preview and stream-copy trimming
#[derive(Parser, Debug)]
#[command(name = "framecut")]
#[command(about = "Sample thumbnail strips and trim clips from local videos")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (default: ./framecut.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use in-memory simulated decoder and engine instead of ffmpeg
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sample a thumbnail strip from a video
    Strip(args::StripArgs),
    /// Cut a sub-clip with the transcoding engine
    Trim(args::TrimArgs),
    /// Play a video, printing the timeline cursor as it moves
    Preview(args::PreviewArgs),
    /// Print the effective configuration
    Config,
}
