// Domain rules - Business logic and policies

use crate::domain::errors::*;
use crate::domain::model::*;

/// Recommended operating range of the nominal chunk duration, in seconds
pub const RECOMMENDED_CHUNK_DURATION: (f64, f64) = (0.25, 5.0);

/// Recommended upper bound of the chunk variance, in frames
pub const RECOMMENDED_MAX_VARIANCE: u32 = 24;

/// Validation rules for scrambling parameters
pub struct ParameterRules;

impl ParameterRules {
    /// Reject parameters the pipeline cannot run with
    pub fn validate(params: &ScrambleParams) -> Result<(), DomainError> {
        if params.fps == 0 {
            return Err(DomainError::InvalidParameters(
                "Frame rate must be at least 1 fps".to_string(),
            ));
        }

        if !params.chunk_duration_secs.is_finite() || params.chunk_duration_secs <= 0.0 {
            return Err(DomainError::InvalidParameters(format!(
                "Chunk duration must be a positive number of seconds, got {}",
                params.chunk_duration_secs
            )));
        }

        Ok(())
    }

    /// Human-readable notes for parameters outside the recommended ranges
    pub fn advisories(params: &ScrambleParams) -> Vec<String> {
        let mut notes = Vec::new();
        let (min, max) = RECOMMENDED_CHUNK_DURATION;

        if params.chunk_duration_secs < min || params.chunk_duration_secs > max {
            notes.push(format!(
                "Chunk duration {}s is outside the recommended {}-{}s range",
                params.chunk_duration_secs, min, max
            ));
        }

        if params.variance_frames > RECOMMENDED_MAX_VARIANCE {
            notes.push(format!(
                "Chunk variance {} frames exceeds the recommended maximum of {}",
                params.variance_frames, RECOMMENDED_MAX_VARIANCE
            ));
        }

        if params.variance_frames as usize >= params.nominal_chunk_frames() {
            notes.push(format!(
                "Variance {} is not smaller than the nominal chunk size {}; drawn sizes clamp to 1 frame",
                params.variance_frames,
                params.nominal_chunk_frames()
            ));
        }

        notes
    }

    /// Refuse to buffer more raw frames than the configured cap
    pub fn check_buffer_limit(
        metadata: &SourceMetadata,
        fps: u32,
        limit: Option<u64>,
    ) -> Result<(), DomainError> {
        if let Some(limit) = limit {
            let required = metadata.estimated_buffer_bytes(fps);
            if required > limit {
                return Err(DomainError::BufferLimitExceeded { required, limit });
            }
        }
        Ok(())
    }
}

/// Allowed transitions of the job state machine
pub struct JobTransitions;

impl JobTransitions {
    /// `Idle → Extracting → Segmenting → Shuffling → Reconstructing → Encoding
    /// → AwaitingUpload → Complete`, with `Encoding → Complete` when no upload
    /// is requested and any non-terminal state able to fail.
    pub fn is_allowed(from: JobState, to: JobState) -> bool {
        use JobState::*;

        match (from, to) {
            (Complete, _) | (Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Idle, Extracting)
            | (Extracting, Segmenting)
            | (Segmenting, Shuffling)
            | (Shuffling, Reconstructing)
            | (Reconstructing, Encoding)
            | (Encoding, AwaitingUpload)
            | (Encoding, Complete)
            | (AwaitingUpload, Complete) => true,
            _ => false,
        }
    }
}

/// Ordered codec preferences for the reconstructor
pub struct CodecPreferences;

impl CodecPreferences {
    /// Source-matching H.264/MP4 first (only for MP4 sources), then VP9 and VP8
    /// in WebM, then the generic WebM default.
    pub fn candidates(source: &SourceMetadata) -> Vec<CodecCandidate> {
        let mut candidates = Vec::with_capacity(4);
        if source.is_mp4_family() {
            candidates.push(CodecCandidate::new("mp4", Some(VideoCodec::H264)));
        }
        candidates.push(CodecCandidate::new("webm", Some(VideoCodec::Vp9)));
        candidates.push(CodecCandidate::new("webm", Some(VideoCodec::Vp8)));
        candidates.push(CodecCandidate::new("webm", None));
        candidates
    }

    /// First candidate accepted by `is_supported`
    pub fn negotiate<F>(
        candidates: &[CodecCandidate],
        is_supported: F,
    ) -> Result<CodecCandidate, DomainError>
    where
        F: Fn(&CodecCandidate) -> bool,
    {
        candidates
            .iter()
            .find(|candidate| is_supported(candidate))
            .cloned()
            .ok_or_else(|| {
                DomainError::CodecUnsupported(
                    candidates.iter().map(|c| c.mime_type.clone()).collect(),
                )
            })
    }
}

#[cfg(test)]
mod tests;
