//! Error handling module for the frame scrambler

use thiserror::Error;

use crate::domain::errors::DomainError;

/// Main error type for library entry points
#[derive(Error, Debug)]
pub enum ScramblerError {
    /// Pipeline failure
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Input file not found or inaccessible
    #[error("Input file not found: {path}")]
    InputFileNotFound { path: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    ConfigError { message: String },

    /// FFmpeg initialization error
    #[error("Failed to initialize FFmpeg: {message}")]
    FFmpegInitError { message: String },

    /// Output file write error
    #[error("Failed to write output file {path}: {source}")]
    OutputError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML parse error
    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl ScramblerError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ScramblerError::Domain(e) if e.is_cancelled() => 130,
            ScramblerError::Domain(_) => 1,
            ScramblerError::InputFileNotFound { .. } | ScramblerError::ConfigError { .. } => 2,
            _ => 1,
        }
    }
}

/// Result type alias for scrambler operations
pub type ScramblerResult<T> = std::result::Result<T, ScramblerError>;
