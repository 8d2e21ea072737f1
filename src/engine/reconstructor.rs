//! Reconstruction: replays the permuted chunks onto the encoder's render
//! surface at a fixed cadence and collects the encoded output.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::{
    Chunk, CodecCandidate, EncodedArtifact, Frame, PacingPolicy, SourceMetadata,
};
use crate::domain::rules::CodecPreferences;
use crate::engine::progress::{ProgressPhase, ProgressReporter};
use crate::ports::{EncoderBackend, EncoderSession};

/// Default target bitrate of the re-encoded stream
pub const DEFAULT_BITRATE: u64 = 8_000_000;

/// Reconstruction settings
#[derive(Debug, Clone)]
pub struct ReconstructionOptions {
    pub fps: u32,
    pub bitrate: u64,
    pub pacing: PacingPolicy,
}

impl ReconstructionOptions {
    pub fn new(fps: u32) -> Self {
        Self {
            fps,
            bitrate: DEFAULT_BITRATE,
            pacing: PacingPolicy::default(),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// What to do after painting one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingStep {
    /// Time to sleep before the next paint
    pub wait: Duration,
    /// Frames to skip before the next paint
    pub skip: usize,
    /// Output slots the current picture is held for beyond its own
    pub hold: u64,
}

/// Start of output slot `slot` relative to the first paint
fn slot_deadline(interval: Duration, slot: u64) -> Duration {
    let nanos = interval.as_nanos().saturating_mul(u128::from(slot));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Decide the wait/skip/hold after painting output slot `slot`.
///
/// `since_start` is the capture clock: the time since the first paint began.
/// `remaining` is the number of frames still queued after this one. Slots
/// whose start passed while painting are either filled by holding the
/// current picture (`Elongate`, the output grows) or by skipping queued
/// frames (`DropFrames`, the output keeps its length). The final frame is
/// never skipped.
pub fn pacing_step(
    policy: PacingPolicy,
    interval: Duration,
    slot: u64,
    since_start: Duration,
    remaining: usize,
) -> PacingStep {
    let next_deadline = slot_deadline(interval, slot + 1);
    if since_start < next_deadline {
        return PacingStep {
            wait: next_deadline - since_start,
            skip: 0,
            hold: 0,
        };
    }

    let current_slot = u64::try_from(since_start.as_nanos() / interval.as_nanos().max(1))
        .unwrap_or(u64::MAX);
    let behind = current_slot.saturating_sub(slot + 1);
    match policy {
        PacingPolicy::Elongate => PacingStep {
            wait: Duration::ZERO,
            skip: 0,
            hold: behind,
        },
        PacingPolicy::DropFrames => {
            let skip = usize::try_from(behind)
                .unwrap_or(usize::MAX)
                .min(remaining.saturating_sub(1));
            PacingStep {
                wait: Duration::ZERO,
                skip,
                hold: 0,
            }
        }
    }
}

/// Result of a completed reconstruction
#[derive(Debug)]
pub struct Reconstruction {
    pub artifact: EncodedArtifact,
    pub codec: CodecCandidate,
    pub frames_painted: u64,
    pub frames_dropped: u64,
    /// Length of the encoded timeline in output slots
    pub output_frames: u64,
    pub wall_time: Duration,
}

#[derive(Debug, Default)]
struct PaintStats {
    painted: u64,
    dropped: u64,
    held: u64,
    output_frames: u64,
}

/// Encodes the flattened, permuted frame sequence
pub struct Reconstructor<'a> {
    options: ReconstructionOptions,
    progress: &'a ProgressReporter,
    cancel: &'a CancellationToken,
}

impl<'a> Reconstructor<'a> {
    pub fn new(
        options: ReconstructionOptions,
        progress: &'a ProgressReporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            options,
            progress,
            cancel,
        }
    }

    /// Frames of the chunks played back-to-back; this is the output order
    pub fn flatten(chunks: &[Chunk]) -> Vec<&Frame> {
        chunks.iter().flat_map(|chunk| chunk.frames()).collect()
    }

    /// Pick the first candidate the backend supports
    pub fn negotiate(
        source: &SourceMetadata,
        backend: &dyn EncoderBackend,
    ) -> Result<CodecCandidate, DomainError> {
        let candidates = CodecPreferences::candidates(source);
        let chosen = CodecPreferences::negotiate(&candidates, |c| backend.is_supported(c))?;
        info!("Selected codec: {}", chosen);
        Ok(chosen)
    }

    /// Negotiate an encoder and encode the frames in their new order.
    ///
    /// Any paint or flush error discards the encoder's output; no partial
    /// artifact is ever returned.
    pub async fn reconstruct(
        &self,
        chunks: &[Chunk],
        codec: &CodecCandidate,
        backend: &dyn EncoderBackend,
    ) -> Result<Reconstruction, DomainError> {
        let frames = Self::flatten(chunks);
        let geometry = match frames.first() {
            Some(frame) => frame.geometry(),
            None => {
                return Err(DomainError::EncodeFailure(
                    "no frames to encode".to_string(),
                ))
            }
        };

        self.ensure_not_cancelled("before encoder start")?;
        let started = Instant::now();
        let mut session = backend
            .start(codec, geometry, self.options.fps, self.options.bitrate)
            .await?;
        info!(
            "Reconstructing {} frames from {} chunks at {} fps ({} pacing)",
            frames.len(),
            chunks.len(),
            self.options.fps,
            self.options.pacing
        );

        let stats = match self.paint_all(session.as_mut(), &frames).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Discarding encoder output: {}", e);
                session.abort().await;
                return Err(e);
            }
        };

        if let Err(e) = self.ensure_not_cancelled("before encoder stop") {
            session.abort().await;
            return Err(e);
        }

        let segments = session.finish().await?;
        let artifact = EncodedArtifact::from_segments(segments, codec);
        if artifact.is_empty() {
            return Err(DomainError::EncodeFailure(
                "encoder produced no output".to_string(),
            ));
        }

        if stats.dropped > 0 {
            warn!("Dropped {} late frames to hold the cadence", stats.dropped);
        }
        if stats.held > 0 {
            warn!(
                "Painting overran the frame interval; output lengthened by {} frames",
                stats.held
            );
        }
        self.progress.finish_phase(ProgressPhase::Encoding);

        Ok(Reconstruction {
            artifact,
            codec: codec.clone(),
            frames_painted: stats.painted,
            frames_dropped: stats.dropped,
            output_frames: stats.output_frames,
            wall_time: started.elapsed(),
        })
    }

    async fn paint_all(
        &self,
        session: &mut dyn EncoderSession,
        frames: &[&Frame],
    ) -> Result<PaintStats, DomainError> {
        let interval = self.options.frame_interval();
        let total = frames.len();
        let mut stats = PaintStats::default();
        let mut position = 0usize;
        let mut slot = 0u64;
        let started = Instant::now();

        while position < total {
            self.ensure_not_cancelled("during reconstruction")?;

            session.paint(frames[position], slot)?;
            stats.painted += 1;

            self.progress
                .report_units(ProgressPhase::Encoding, (position + 1) as u64, total as u64);

            let step = pacing_step(
                self.options.pacing,
                interval,
                slot,
                started.elapsed(),
                total - position - 1,
            );
            if step.skip > 0 {
                debug!(slot, skip = step.skip, "Behind cadence, skipping frames");
            }
            if step.hold > 0 {
                debug!(slot, hold = step.hold, "Behind cadence, holding picture");
            }
            self.pause(step.wait).await?;

            stats.dropped += step.skip as u64;
            stats.output_frames = slot + 1;
            position += 1 + step.skip;
            if position < total {
                stats.held += step.hold;
            }
            slot += 1 + step.skip as u64 + step.hold;
        }

        Ok(stats)
    }

    async fn pause(&self, wait: Duration) -> Result<(), DomainError> {
        if wait.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = self.cancel.cancelled() => Err(DomainError::Cancelled(
                "cancelled while pacing frames".to_string(),
            )),
            _ = sleep(wait) => Ok(()),
        }
    }

    fn ensure_not_cancelled(&self, stage: &str) -> Result<(), DomainError> {
        if self.cancel.is_cancelled() {
            return Err(DomainError::Cancelled(format!("cancelled {}", stage)));
        }
        Ok(())
    }
}
