//! Frame extraction: positions the source playhead at every sample time and
//! snapshots the decoded picture.

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::domain::errors::DomainError;
use crate::domain::model::{Frame, SourceMetadata};
use crate::domain::rules::ParameterRules;
use crate::engine::progress::{ProgressPhase, ProgressReporter};
use crate::ports::FrameSource;

/// Default bound on a single positioning request
pub const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on loading source metadata
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Extraction settings
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub fps: u32,
    pub seek_timeout: Duration,
    pub load_timeout: Duration,
    /// Refuse sources whose raw frames would exceed this many bytes
    pub buffer_limit: Option<u64>,
}

impl ExtractionOptions {
    pub fn new(fps: u32) -> Self {
        Self {
            fps,
            seek_timeout: DEFAULT_SEEK_TIMEOUT,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            buffer_limit: None,
        }
    }
}

/// Ordered frames covering `[0, duration)` plus the source metadata
#[derive(Debug)]
pub struct ExtractedFrames {
    pub metadata: SourceMetadata,
    pub frames: Vec<Frame>,
}

/// Sequential frame extractor
pub struct FrameExtractor<'a> {
    options: ExtractionOptions,
    progress: &'a ProgressReporter,
    cancel: &'a CancellationToken,
}

impl<'a> FrameExtractor<'a> {
    pub fn new(
        options: ExtractionOptions,
        progress: &'a ProgressReporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            options,
            progress,
            cancel,
        }
    }

    /// Load and validate source metadata within the load bound
    pub async fn load_metadata<S>(&self, source: &mut S) -> Result<SourceMetadata, DomainError>
    where
        S: FrameSource + ?Sized,
    {
        let bound = self.options.load_timeout;
        let metadata = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(DomainError::Cancelled("cancelled while loading source".to_string()));
            }
            loaded = timeout(bound, source.load_metadata()) => match loaded {
                Ok(result) => result?,
                Err(_) => {
                    return Err(DomainError::LoadError(format!(
                        "source metadata not available after {}s",
                        bound.as_secs()
                    )));
                }
            },
        };

        if !metadata.duration.is_finite() || metadata.duration <= 0.0 {
            return Err(DomainError::LoadError(format!(
                "source reports an unusable duration: {}",
                metadata.duration
            )));
        }
        if metadata.geometry.width == 0 || metadata.geometry.height == 0 {
            return Err(DomainError::LoadError(format!(
                "source reports empty dimensions {}x{}",
                metadata.geometry.width, metadata.geometry.height
            )));
        }

        info!(
            duration = metadata.duration,
            width = metadata.geometry.width,
            height = metadata.geometry.height,
            container = %metadata.container,
            "Source loaded"
        );
        Ok(metadata)
    }

    /// Decode `floor(duration * fps)` frames in timeline order.
    ///
    /// A seek that overruns its bound aborts the extraction; frames are never
    /// skipped. Every frame must match the dimensions the source reported.
    pub async fn extract<S>(&self, source: &mut S) -> Result<ExtractedFrames, DomainError>
    where
        S: FrameSource + ?Sized,
    {
        let metadata = self.load_metadata(source).await?;
        let fps = self.options.fps;
        ParameterRules::check_buffer_limit(&metadata, fps, self.options.buffer_limit)?;

        let total = metadata.total_frames(fps);
        info!("Extracting {} frames at {} fps", total, fps);

        let mut frames = Vec::with_capacity(total as usize);
        for index in 0..total {
            let target = index as f64 / fps as f64;
            self.seek(source, index, target).await?;

            let frame = source.capture(index, target)?;
            if frame.geometry() != metadata.geometry {
                return Err(DomainError::LoadError(format!(
                    "frame {} is {}x{}, source reported {}x{}",
                    index,
                    frame.geometry().width,
                    frame.geometry().height,
                    metadata.geometry.width,
                    metadata.geometry.height
                )));
            }
            trace!(index, target, "Captured frame");
            frames.push(frame);

            self.progress
                .report_units(ProgressPhase::Extraction, index + 1, total);
        }

        self.progress.finish_phase(ProgressPhase::Extraction);
        debug!("Extracted {} frames", frames.len());
        Ok(ExtractedFrames { metadata, frames })
    }

    async fn seek<S>(&self, source: &mut S, index: u64, target: f64) -> Result<(), DomainError>
    where
        S: FrameSource + ?Sized,
    {
        if self.cancel.is_cancelled() {
            return Err(DomainError::Cancelled(format!(
                "cancelled before seeking frame {}",
                index
            )));
        }

        let bound = self.options.seek_timeout;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(DomainError::Cancelled(format!(
                "cancelled while seeking frame {}",
                index
            ))),
            positioned = timeout(bound, source.seek(target)) => match positioned {
                Ok(result) => result,
                Err(_) => Err(DomainError::SeekTimeout {
                    frame_index: index,
                    target_seconds: target,
                    bound_secs: bound.as_secs(),
                }),
            },
        }
    }
}
