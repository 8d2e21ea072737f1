//! Logging configuration and subscriber setup

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{ScramblerError, ScramblerResult};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line format
    #[default]
    Pretty,
    /// Single-line text format
    Compact,
    /// JSON lines for structured logging
    Json,
}

impl FromStr for LogFormat {
    type Err = ScramblerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(ScramblerError::ConfigError {
                message: format!("unknown log format '{}': expected pretty, compact or json", other),
            }),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => f.write_str("pretty"),
            LogFormat::Compact => f.write_str("compact"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Logging configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `frame_scrambler=debug`
    pub level: String,
    pub format: LogFormat,
    /// Include target module information
    pub target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            target: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>, format: LogFormat) -> Self {
        Self {
            level: level.into(),
            format,
            ..Self::default()
        }
    }

    /// `RUST_LOG` wins over the configured level
    pub fn env_filter(&self) -> ScramblerResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|e| ScramblerError::ConfigError {
            message: format!("invalid log level '{}': {}", self.level, e),
        })
    }

    /// Install the global subscriber; logs go to stderr
    pub fn init(&self) -> ScramblerResult<()> {
        let filter = self.env_filter()?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(self.target)
            .with_writer(std::io::stderr);

        let installed = match self.format {
            LogFormat::Pretty => builder.pretty().try_init(),
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        installed.map_err(|e| ScramblerError::ConfigError {
            message: format!("failed to install logger: {}", e),
        })?;

        tracing::debug!(level = %self.level, format = %self.format, "Logging initialized");
        Ok(())
    }
}

/// Log build and platform information
pub fn log_system_info() {
    tracing::info!("=== Frame Scrambler ===");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Platform: {} ({} cpus)", std::env::consts::OS, num_cpus::get());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_default_config_builds_filter() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.env_filter().is_ok());
    }
}
