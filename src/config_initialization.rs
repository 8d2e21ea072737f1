//! Configuration initialization and hierarchy management
//!
//! Precedence, lowest to highest: built-in defaults, TOML file, `SCRAMBLER_*`
//! environment variables, command-line flags.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::toml_config::TomlConfigAdapter;
use crate::adapters::upload_mux::DEFAULT_API_BASE;
use crate::app::{ScrambleRequest, UploadPolicy};
use crate::domain::model::{PacingPolicy, ScrambleParams};
use crate::engine::extractor::DEFAULT_LOAD_TIMEOUT;
use crate::error::{ScramblerError, ScramblerResult};
use crate::utils::logging::{LogFormat, LoggingConfig};

/// Upload handoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub api_base: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_secs: 5,
            max_poll_attempts: 60,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Effective scrambler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScramblerConfig {
    pub fps: u32,
    pub chunk_duration_secs: f64,
    pub chunk_variance_frames: u32,
    pub seek_timeout_secs: u64,
    pub pacing: PacingPolicy,
    pub bitrate: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_buffer_limit_bytes: Option<u64>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub upload: UploadConfig,
}

impl Default for ScramblerConfig {
    fn default() -> Self {
        Self {
            fps: 24,
            chunk_duration_secs: 1.0,
            chunk_variance_frames: 0,
            seek_timeout_secs: 30,
            pacing: PacingPolicy::Elongate,
            bitrate: 8_000_000,
            frame_buffer_limit_bytes: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            upload: UploadConfig::default(),
        }
    }
}

impl ScramblerConfig {
    /// Reject values no job could run with
    pub fn validate(&self) -> ScramblerResult<()> {
        let invalid = |message: &str| {
            Err(ScramblerError::ConfigError {
                message: message.to_string(),
            })
        };
        if self.fps == 0 {
            return invalid("fps must be at least 1");
        }
        if !self.chunk_duration_secs.is_finite() || self.chunk_duration_secs <= 0.0 {
            return invalid("chunk_duration_secs must be a positive number");
        }
        if self.seek_timeout_secs == 0 {
            return invalid("seek_timeout_secs must be at least 1");
        }
        if self.bitrate == 0 {
            return invalid("bitrate must be positive");
        }
        if self.upload.poll_interval_secs == 0 {
            return invalid("upload.poll_interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn params(&self) -> ScrambleParams {
        ScrambleParams::new(self.fps, self.chunk_duration_secs, self.chunk_variance_frames)
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            poll_interval: Duration::from_secs(self.upload.poll_interval_secs),
            max_attempts: self.upload.max_poll_attempts,
        }
    }

    pub fn request(&self) -> ScrambleRequest {
        ScrambleRequest {
            params: self.params(),
            pacing: self.pacing,
            bitrate: self.bitrate,
            seek_timeout: Duration::from_secs(self.seek_timeout_secs),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            buffer_limit: self.frame_buffer_limit_bytes,
            upload: self.upload.enabled.then(|| self.upload_policy()),
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig::new(self.log_level.clone(), self.log_format)
    }
}

/// Values given on the command line; `None` keeps the lower layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub fps: Option<u32>,
    pub chunk_duration_secs: Option<f64>,
    pub chunk_variance_frames: Option<u32>,
    pub seek_timeout_secs: Option<u64>,
    pub pacing: Option<PacingPolicy>,
    pub bitrate: Option<u64>,
    pub frame_buffer_limit_bytes: Option<u64>,
    pub upload: Option<bool>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

impl ConfigOverrides {
    /// Apply every set value; returns how many were applied
    pub fn apply(&self, config: &mut ScramblerConfig) -> usize {
        let mut applied = 0;
        merge(&mut config.fps, &self.fps, &mut applied);
        merge(&mut config.chunk_duration_secs, &self.chunk_duration_secs, &mut applied);
        merge(&mut config.chunk_variance_frames, &self.chunk_variance_frames, &mut applied);
        merge(&mut config.seek_timeout_secs, &self.seek_timeout_secs, &mut applied);
        merge(&mut config.pacing, &self.pacing, &mut applied);
        merge(&mut config.bitrate, &self.bitrate, &mut applied);
        merge(&mut config.upload.enabled, &self.upload, &mut applied);
        merge(&mut config.log_level, &self.log_level, &mut applied);
        merge(&mut config.log_format, &self.log_format, &mut applied);
        if let Some(limit) = self.frame_buffer_limit_bytes {
            config.frame_buffer_limit_bytes = Some(limit);
            applied += 1;
        }
        applied
    }
}

fn merge<T: Clone>(target: &mut T, value: &Option<T>, applied: &mut usize) {
    if let Some(value) = value {
        *target = value.clone();
        *applied += 1;
    }
}

/// Effective configuration plus a description of the layers that shaped it
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: ScramblerConfig,
    pub layers: Vec<String>,
}

/// Resolve configuration following precedence: CLI > Env > File > Defaults
pub fn initialize_configuration_hierarchy(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> ScramblerResult<ResolvedConfig> {
    initialize_with_env(config_path, overrides, |key| std::env::var(key).ok())
}

/// Same as [`initialize_configuration_hierarchy`] with an injectable environment
pub fn initialize_with_env<F>(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
    env: F,
) -> ScramblerResult<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut layers = vec!["defaults".to_string()];

    // Step 1: file, explicit path must exist
    let mut config = match config_path {
        Some(path) => {
            layers.push(format!("file {}", path.display()));
            TomlConfigAdapter::load(path)?
        }
        None => {
            let default_path = TomlConfigAdapter::default_config_path();
            if default_path.exists() {
                layers.push(format!("file {}", default_path.display()));
                TomlConfigAdapter::load(&default_path)?
            } else {
                ScramblerConfig::default()
            }
        }
    };

    // Step 2: environment
    let env_overrides = load_environment_variables(&env)?;
    let applied = env_overrides.apply(&mut config);
    if applied > 0 {
        layers.push(format!("{} environment overrides", applied));
    }

    // Step 3: command line
    let applied = overrides.apply(&mut config);
    if applied > 0 {
        layers.push(format!("{} command-line overrides", applied));
    }

    config.validate()?;
    Ok(ResolvedConfig { config, layers })
}

/// Read `SCRAMBLER_*` variables
fn load_environment_variables<F>(env: &F) -> ScramblerResult<ConfigOverrides>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: std::str::FromStr>(key: &str, value: Option<String>) -> ScramblerResult<Option<T>> {
        match value {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| ScramblerError::ConfigError {
                message: format!("invalid value for {}: '{}'", key, raw),
            }),
        }
    }

    let pacing = match env("SCRAMBLER_PACING") {
        Some(raw) => Some(PacingPolicy::parse(&raw).map_err(|e| ScramblerError::ConfigError {
            message: format!("invalid value for SCRAMBLER_PACING: {}", e),
        })?),
        None => None,
    };
    let log_format = match env("SCRAMBLER_LOG_FORMAT") {
        Some(raw) => Some(raw.parse::<LogFormat>()?),
        None => None,
    };

    Ok(ConfigOverrides {
        fps: parse("SCRAMBLER_FPS", env("SCRAMBLER_FPS"))?,
        chunk_duration_secs: parse("SCRAMBLER_CHUNK_DURATION", env("SCRAMBLER_CHUNK_DURATION"))?,
        chunk_variance_frames: parse("SCRAMBLER_CHUNK_VARIANCE", env("SCRAMBLER_CHUNK_VARIANCE"))?,
        seek_timeout_secs: parse("SCRAMBLER_SEEK_TIMEOUT", env("SCRAMBLER_SEEK_TIMEOUT"))?,
        pacing,
        bitrate: parse("SCRAMBLER_BITRATE", env("SCRAMBLER_BITRATE"))?,
        frame_buffer_limit_bytes: parse("SCRAMBLER_BUFFER_LIMIT", env("SCRAMBLER_BUFFER_LIMIT"))?,
        upload: parse("SCRAMBLER_UPLOAD", env("SCRAMBLER_UPLOAD"))?,
        log_level: env("SCRAMBLER_LOG_LEVEL"),
        log_format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = ScramblerConfig::default();
        assert_eq!(config.fps, 24);
        assert_eq!(config.params().nominal_chunk_frames(), 24);
        assert_eq!(config.bitrate, 8_000_000);
        assert_eq!(config.upload_policy(), UploadPolicy::default());
        assert!(config.request().upload.is_none());
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[scrambler]\nfps = 30\nchunk_duration_secs = 2.0\nchunk_variance_frames = 3\n",
        )
        .unwrap();

        let env = env_of(&[("SCRAMBLER_FPS", "25"), ("SCRAMBLER_CHUNK_VARIANCE", "5")]);
        let overrides = ConfigOverrides {
            chunk_variance_frames: Some(7),
            ..ConfigOverrides::default()
        };

        let resolved = initialize_with_env(Some(&path), &overrides, env).unwrap();
        assert_eq!(resolved.config.fps, 25);
        assert_eq!(resolved.config.chunk_duration_secs, 2.0);
        assert_eq!(resolved.config.chunk_variance_frames, 7);
        assert_eq!(resolved.layers.len(), 4);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let env = env_of(&[("SCRAMBLER_FPS", "many")]);
        let err = initialize_with_env(None, &ConfigOverrides::default(), env).unwrap_err();
        assert!(matches!(err, ScramblerError::ConfigError { .. }));
    }

    #[test]
    fn test_validation_rejects_zero_fps() {
        let overrides = ConfigOverrides {
            fps: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(initialize_with_env(None, &overrides, |_| None).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(initialize_with_env(Some(&missing), &ConfigOverrides::default(), |_| None).is_err());
    }

    #[test]
    fn test_upload_enabled_builds_policy() {
        let env = env_of(&[("SCRAMBLER_UPLOAD", "true"), ("SCRAMBLER_PACING", "drop-frames")]);
        let resolved = initialize_with_env(None, &ConfigOverrides::default(), env).unwrap();
        let request = resolved.config.request();
        assert_eq!(request.upload, Some(UploadPolicy::default()));
        assert_eq!(request.pacing, PacingPolicy::DropFrames);
    }
}
