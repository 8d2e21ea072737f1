//! Frame Scrambler Library
//!
//! Re-cuts a video into randomly sized chunks, shuffles them and encodes
//! the permuted frame sequence into a new file, optionally handing the
//! result to a hosted video service.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use app::{ScrambleInteractor, ScrambleOutcome, ScrambleRequest};
pub use config_initialization::ScramblerConfig;
pub use domain::errors::{DomainError, ErrorKind};
pub use domain::model::{ChunkTimingMetadata, EncodedArtifact, PacingPolicy, ScrambleParams};
pub use error::{ScramblerError, ScramblerResult};

/// Initialize the scrambler library
pub fn init() -> ScramblerResult<()> {
    ffmpeg_next::init().map_err(|e| ScramblerError::FFmpegInitError {
        message: e.to_string(),
    })?;
    ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);

    Ok(())
}
