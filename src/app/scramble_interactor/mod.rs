// Scramble interactor - Orchestrates the frame scrambling use case

mod handoff;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::errors::*;
use crate::domain::model::*;
use crate::domain::rules::*;
use crate::engine::extractor::{ExtractionOptions, FrameExtractor, DEFAULT_LOAD_TIMEOUT, DEFAULT_SEEK_TIMEOUT};
use crate::engine::progress::{ProgressPhase, ProgressReporter};
use crate::engine::reconstructor::{ReconstructionOptions, Reconstructor, DEFAULT_BITRATE};
use crate::engine::{build_timing_metadata, ChunkSegmenter, Shuffler};
use crate::ports::*;

pub use handoff::{UploadHandoff, UploadPolicy, UploadedAsset};

/// Everything needed to run one scrambling job
#[derive(Debug, Clone)]
pub struct ScrambleRequest {
    pub params: ScrambleParams,
    pub pacing: PacingPolicy,
    pub bitrate: u64,
    pub seek_timeout: Duration,
    pub load_timeout: Duration,
    pub buffer_limit: Option<u64>,
    /// Hand the artifact to the upload service when set
    pub upload: Option<UploadPolicy>,
}

impl ScrambleRequest {
    pub fn new(params: ScrambleParams) -> Self {
        Self {
            params,
            pacing: PacingPolicy::default(),
            bitrate: DEFAULT_BITRATE,
            seek_timeout: DEFAULT_SEEK_TIMEOUT,
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            buffer_limit: None,
            upload: None,
        }
    }
}

/// Result of a job that produced an artifact
#[derive(Debug)]
pub struct ScrambleOutcome {
    pub artifact: EncodedArtifact,
    pub codec: CodecCandidate,
    pub source: SourceMetadata,
    pub timing: ChunkTimingMetadata,
    pub permutation: Permutation,
    pub nominal_chunk_frames: usize,
    pub frames_extracted: u64,
    pub frames_painted: u64,
    pub frames_dropped: u64,
    /// Length of the encoded timeline in frames
    pub output_frames: u64,
    /// Present when an upload was requested; a failed upload keeps the artifact
    pub upload: Option<Result<UploadedAsset, DomainError>>,
    pub final_state: JobState,
}

impl ScrambleOutcome {
    pub fn upload_error(&self) -> Option<&DomainError> {
        self.upload.as_ref().and_then(|result| result.as_ref().err())
    }
}

/// Lifecycle tracker for one job
#[derive(Debug)]
pub struct Job {
    state: JobState,
    history: Vec<JobState>,
}

impl Job {
    pub fn new() -> Self {
        Self {
            state: JobState::Idle,
            history: vec![JobState::Idle],
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    fn advance(&mut self, to: JobState) -> Result<(), DomainError> {
        if !JobTransitions::is_allowed(self.state, to) {
            return Err(DomainError::InvalidParameters(format!(
                "illegal job transition {} -> {}",
                self.state, to
            )));
        }
        info!("Job state: {} -> {}", self.state, to);
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    fn fail(&mut self, error: &DomainError) {
        let failed = JobState::Failed(error.kind());
        if JobTransitions::is_allowed(self.state, failed) {
            error!("Job failed in {}: {}", self.state, error);
            self.state = failed;
            self.history.push(failed);
        }
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

/// Interactor for the scrambling use case
pub struct ScrambleInteractor {
    encoder: Arc<dyn EncoderBackend>,
    uploader: Option<Arc<dyn UploadPort>>,
    progress: ProgressReporter,
}

impl ScrambleInteractor {
    /// Create new scramble interactor with injected ports
    pub fn new(
        encoder: Arc<dyn EncoderBackend>,
        uploader: Option<Arc<dyn UploadPort>>,
        progress: ProgressReporter,
    ) -> Self {
        Self {
            encoder,
            uploader,
            progress,
        }
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    /// Run the job to completion or failure.
    ///
    /// The source is released on every path. Upload failures are reported in
    /// the outcome rather than as an error since the artifact is already valid.
    pub async fn execute<R>(
        &self,
        source: &mut dyn FrameSource,
        request: &ScrambleRequest,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<ScrambleOutcome, DomainError>
    where
        R: Rng + Send,
    {
        let mut job = Job::new();
        let result = self.run(&mut job, source, request, rng, cancel).await;
        source.release().await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                job.fail(&e);
                Err(e)
            }
        }
    }

    async fn run<R>(
        &self,
        job: &mut Job,
        source: &mut dyn FrameSource,
        request: &ScrambleRequest,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<ScrambleOutcome, DomainError>
    where
        R: Rng + Send,
    {
        let params = &request.params;
        ParameterRules::validate(params)?;
        for advisory in ParameterRules::advisories(params) {
            warn!("{}", advisory);
        }

        job.advance(JobState::Extracting)?;
        let mut options = ExtractionOptions::new(params.fps);
        options.seek_timeout = request.seek_timeout;
        options.load_timeout = request.load_timeout;
        options.buffer_limit = request.buffer_limit;
        let extracted = FrameExtractor::new(options, &self.progress, cancel)
            .extract(source)
            .await?;
        let frames_extracted = extracted.frames.len() as u64;
        if frames_extracted == 0 {
            return Err(DomainError::LoadError(format!(
                "source of {:.3}s is shorter than one frame at {} fps",
                extracted.metadata.duration, params.fps
            )));
        }

        job.advance(JobState::Segmenting)?;
        let nominal = params.nominal_chunk_frames();
        let segmenter = ChunkSegmenter::new(nominal, params.variance_frames, params.fps);
        let mut chunks = segmenter.segment(extracted.frames, rng)?;
        self.progress.report(
            ProgressPhase::Segmentation,
            0.5,
            Some(format!("{} chunks", chunks.len())),
        );

        job.advance(JobState::Shuffling)?;
        let permutation = Shuffler::shuffle(&mut chunks, rng);
        self.progress.finish_phase(ProgressPhase::Segmentation);

        job.advance(JobState::Reconstructing)?;
        let codec = Reconstructor::negotiate(&extracted.metadata, self.encoder.as_ref())?;
        let reconstruction_options = ReconstructionOptions {
            fps: params.fps,
            bitrate: request.bitrate,
            pacing: request.pacing,
        };
        let reconstructor = Reconstructor::new(reconstruction_options, &self.progress, cancel);

        job.advance(JobState::Encoding)?;
        let reconstruction = reconstructor
            .reconstruct(&chunks, &codec, self.encoder.as_ref())
            .await?;
        let timing = build_timing_metadata(&chunks);
        drop(chunks);

        Self::log_summary(&reconstruction.artifact, &timing, nominal, params.variance_frames);

        let upload = match (&request.upload, &self.uploader) {
            (Some(policy), Some(uploader)) => {
                job.advance(JobState::AwaitingUpload)?;
                let delivered = UploadHandoff::new(uploader.as_ref(), *policy, &self.progress, cancel)
                    .deliver(&reconstruction.artifact)
                    .await;
                match &delivered {
                    Ok(_) => job.advance(JobState::Complete)?,
                    Err(e) => {
                        warn!("Upload failed, artifact kept: {}", e);
                        job.fail(e);
                    }
                }
                Some(delivered)
            }
            (Some(_), None) => {
                warn!("Upload requested but no upload service is configured");
                job.advance(JobState::Complete)?;
                None
            }
            _ => {
                job.advance(JobState::Complete)?;
                None
            }
        };

        Ok(ScrambleOutcome {
            artifact: reconstruction.artifact,
            codec: reconstruction.codec,
            source: extracted.metadata,
            timing,
            permutation,
            nominal_chunk_frames: nominal,
            frames_extracted,
            frames_painted: reconstruction.frames_painted,
            frames_dropped: reconstruction.frames_dropped,
            output_frames: reconstruction.output_frames,
            upload,
            final_state: job.state(),
        })
    }

    fn log_summary(
        artifact: &EncodedArtifact,
        timing: &ChunkTimingMetadata,
        nominal: usize,
        variance: u32,
    ) {
        info!(
            size_mb = %format!("{:.2}", artifact.len() as f64 / 1024.0 / 1024.0),
            mime = artifact.mime_type(),
            chunks = timing.len(),
            chunk_frames = nominal,
            variance,
            "Scrambled video ready"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryEncoderBackend, MemoryFrameSource};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn interactor(backend: MemoryEncoderBackend) -> ScrambleInteractor {
        ScrambleInteractor::new(Arc::new(backend), None, ProgressReporter::new())
    }

    #[test]
    fn test_job_follows_linear_path() {
        let mut job = Job::new();
        for state in [
            JobState::Extracting,
            JobState::Segmenting,
            JobState::Shuffling,
            JobState::Reconstructing,
            JobState::Encoding,
            JobState::Complete,
        ] {
            job.advance(state).unwrap();
        }
        assert_eq!(job.history().len(), 7);
        assert!(job.advance(JobState::Extracting).is_err());
    }

    #[test]
    fn test_job_fail_records_kind() {
        let mut job = Job::new();
        job.advance(JobState::Extracting).unwrap();
        job.fail(&DomainError::LoadError("gone".to_string()));
        assert_eq!(job.state(), JobState::Failed(ErrorKind::LoadError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_releases_source_on_success() {
        let mut source = MemoryFrameSource::new(2.0, FrameGeometry::new(2, 2), 24);
        let request = ScrambleRequest::new(ScrambleParams::new(24, 0.5, 0));
        let outcome = interactor(MemoryEncoderBackend::new())
            .execute(&mut source, &request, &mut StdRng::seed_from_u64(1), &CancellationToken::new())
            .await
            .unwrap();

        assert!(source.is_released());
        assert_eq!(outcome.final_state, JobState::Complete);
        assert_eq!(outcome.timing.len(), 4);
        assert_eq!(outcome.frames_painted, 48);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_releases_source_on_failure() {
        let mut source = MemoryFrameSource::new(2.0, FrameGeometry::new(2, 2), 24);
        let request = ScrambleRequest::new(ScrambleParams::new(24, 0.5, 0));
        let err = interactor(MemoryEncoderBackend::supporting(&[]))
            .execute(&mut source, &request, &mut StdRng::seed_from_u64(1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CodecUnsupported);
        assert!(source.is_released());
    }

    #[tokio::test]
    async fn test_sub_frame_source_is_load_error() {
        let mut source = MemoryFrameSource::new(0.01, FrameGeometry::new(2, 2), 24);
        let request = ScrambleRequest::new(ScrambleParams::default());
        let err = interactor(MemoryEncoderBackend::new())
            .execute(&mut source, &request, &mut StdRng::seed_from_u64(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LoadError);
    }
}
