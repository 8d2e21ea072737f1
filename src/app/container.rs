use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::adapters::{
    LibavEncoderBackend, LibavFrameSource, MemoryEncoderBackend, MuxUploadAdapter,
};
use crate::app::scramble_interactor::ScrambleInteractor;
use crate::config_initialization::ScramblerConfig;
use crate::domain::errors::DomainError;
use crate::engine::progress::{ProgressReporter, TracingProgress};
use crate::ports::{EncoderBackend, FrameSource, UploadPort};

/// Percentage step between progress log lines
const PROGRESS_LOG_STEP: u8 = 5;

pub trait AppContainer: Send + Sync {
    fn scramble_interactor(&self) -> Arc<ScrambleInteractor>;
    fn frame_source(&self, path: &Path) -> Box<dyn FrameSource>;
}

pub struct DefaultAppContainer {
    scramble_interactor: Arc<ScrambleInteractor>,
}

impl DefaultAppContainer {
    /// Wire the libav adapters, or the in-memory encoder for a dry run.
    ///
    /// The upload adapter is only built when uploads are enabled, so missing
    /// credentials fail here rather than after encoding.
    pub fn new(config: &ScramblerConfig, dry_run: bool) -> Result<Self, DomainError> {
        let encoder: Arc<dyn EncoderBackend> = if dry_run {
            info!("Dry run: frames are painted into the in-memory encoder");
            Arc::new(MemoryEncoderBackend::new())
        } else {
            Arc::new(LibavEncoderBackend::new())
        };

        let uploader: Option<Arc<dyn UploadPort>> = if config.upload.enabled && !dry_run {
            debug!("Upload service at {}", config.upload.api_base);
            Some(Arc::new(MuxUploadAdapter::from_env(config.upload.api_base.clone())?))
        } else {
            None
        };

        let progress = ProgressReporter::new();
        progress.add_callback(Arc::new(TracingProgress::new(PROGRESS_LOG_STEP)));

        Ok(Self {
            scramble_interactor: Arc::new(ScrambleInteractor::new(encoder, uploader, progress)),
        })
    }
}

impl AppContainer for DefaultAppContainer {
    fn scramble_interactor(&self) -> Arc<ScrambleInteractor> {
        Arc::clone(&self.scramble_interactor)
    }

    fn frame_source(&self, path: &Path) -> Box<dyn FrameSource> {
        Box::new(LibavFrameSource::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_needs_no_credentials() {
        let mut config = ScramblerConfig::default();
        config.upload.enabled = true;
        assert!(DefaultAppContainer::new(&config, true).is_ok());
    }
}
