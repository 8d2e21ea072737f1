//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use clap_num::number_range;

use crate::config_initialization::ConfigOverrides;
use crate::domain::model::PacingPolicy;
use crate::utils::logging::LogFormat;
use crate::utils::time::parse_duration_secs;

/// Highest extraction rate accepted on the command line
pub const MAX_FPS: u32 = 240;

/// Sidecar document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MetadataFormat {
    #[default]
    Json,
    Yaml,
}

impl MetadataFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            MetadataFormat::Json => "json",
            MetadataFormat::Yaml => "yaml",
        }
    }
}

/// Arguments for the scramble command
#[derive(Args, Debug)]
pub struct ScrambleArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file path (default: <input>_scrambled.<mp4|webm>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Extraction and playback rate
    #[arg(long, value_parser = parse_fps)]
    pub fps: Option<u32>,

    /// Nominal chunk duration (seconds, "250ms", "2s" or MM:SS.ms)
    #[arg(long, value_parser = parse_chunk_duration)]
    pub chunk_duration: Option<f64>,

    /// Maximum random deviation of each chunk, in frames
    #[arg(long)]
    pub variance: Option<u32>,

    /// Seed for chunk sizes and shuffle order
    #[arg(long)]
    pub seed: Option<u64>,

    /// Behaviour when painting overruns the frame interval
    #[arg(long, value_parser = parse_pacing)]
    pub pacing: Option<PacingPolicy>,

    /// Target bitrate in bits per second
    #[arg(long)]
    pub bitrate: Option<u64>,

    /// Upper bound for a single seek, in seconds
    #[arg(long)]
    pub seek_timeout: Option<u64>,

    /// Refuse to start when the raw frame buffer would exceed this many bytes
    #[arg(long)]
    pub buffer_limit: Option<u64>,

    /// Timeline sidecar path (default: next to the output)
    #[arg(long)]
    pub metadata: Option<PathBuf>,

    /// Timeline sidecar format
    #[arg(long, value_enum, default_value_t = MetadataFormat::Json)]
    pub metadata_format: MetadataFormat,

    /// Hand the result to the hosted video service
    #[arg(long)]
    pub upload: bool,

    /// Run the pipeline against an in-memory encoder and write nothing
    #[arg(long)]
    pub dry_run: bool,
}

impl ScrambleArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            fps: self.fps,
            chunk_duration_secs: self.chunk_duration,
            chunk_variance_frames: self.variance,
            seek_timeout_secs: self.seek_timeout,
            pacing: self.pacing,
            bitrate: self.bitrate,
            frame_buffer_limit_bytes: self.buffer_limit,
            upload: self.upload.then_some(true),
            log_level: None,
            log_format: None,
        }
    }
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Input video file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Rate used for the frame count and buffer estimate
    #[arg(long, value_parser = parse_fps)]
    pub fps: Option<u32>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

fn parse_fps(s: &str) -> Result<u32, String> {
    number_range(s, 1, MAX_FPS)
}

fn parse_chunk_duration(s: &str) -> Result<f64, String> {
    parse_duration_secs(s).map_err(|e| e.to_string())
}

fn parse_pacing(s: &str) -> Result<PacingPolicy, String> {
    PacingPolicy::parse(s).map_err(|e| e.to_string())
}

pub(crate) fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    s.parse::<LogFormat>().map_err(|e| e.to_string())
}
