//! CLI module for the frame scrambler
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config_initialization::ConfigOverrides;
use crate::utils::logging::LogFormat;

pub mod args;
pub mod commands;
pub mod report;

pub use args::{ProbeArgs, ScrambleArgs};

/// Frame Scrambler
///
/// Cuts a video into randomly sized chunks, shuffles them and encodes the
/// result as a new video with a timeline of the shuffled shots.
#[derive(Parser, Debug)]
#[command(name = "scrambler")]
#[command(about = "Frame Scrambler - Re-cut a video into shuffled chunks")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_parser = args::parse_log_format)]
    pub log_format: Option<LogFormat>,

    /// Configuration file (default: ./scrambler.toml when present)
    #[arg(long, global = true, env = "SCRAMBLER_CONFIG")]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scramble a video into shuffled chunks
    Scramble(ScrambleArgs),
    /// Show source metadata and the memory a scramble would need
    Probe(ProbeArgs),
}

impl Cli {
    /// Configuration values given on the command line
    pub fn overrides(&self) -> ConfigOverrides {
        let mut overrides = match &self.command {
            Commands::Scramble(args) => args.overrides(),
            Commands::Probe(args) => ConfigOverrides {
                fps: args.fps,
                ..ConfigOverrides::default()
            },
        };
        overrides.log_level = self.log_level.clone();
        overrides.log_format = self.log_format;
        overrides
    }
}
