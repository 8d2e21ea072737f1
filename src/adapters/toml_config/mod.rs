// TOML config adapter - Reads the `[scrambler]` configuration table

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config_initialization::ScramblerConfig;
use crate::error::{ScramblerError, ScramblerResult};

/// Table holding all settings in a config file
pub const CONFIG_SECTION: &str = "scrambler";

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "scrambler.toml";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    scrambler: Option<ScramblerConfig>,
}

/// TOML configuration adapter
pub struct TomlConfigAdapter;

impl TomlConfigAdapter {
    /// Default config file path in the working directory
    pub fn default_config_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    /// Load a config file; keys missing from the file keep their defaults
    pub fn load(path: &Path) -> ScramblerResult<ScramblerConfig> {
        if !path.exists() {
            return Err(ScramblerError::ConfigError {
                message: format!("config file does not exist: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| match e {
            ScramblerError::TomlError(inner) => ScramblerError::ConfigError {
                message: format!("failed to parse {}: {}", path.display(), inner),
            },
            other => other,
        })
    }

    /// Parse config file content
    pub fn parse(content: &str) -> ScramblerResult<ScramblerConfig> {
        let file: ConfigFile = toml::from_str(content)?;
        Ok(file.scrambler.unwrap_or_default())
    }
}
