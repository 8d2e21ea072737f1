// Domain models - Core types and data structures

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, ErrorKind};

/// Bytes per pixel of the raster format every frame is captured in (RGBA)
pub const BYTES_PER_PIXEL: usize = 4;

/// Time specification - represents time in seconds with fractional precision
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeSpec {
    pub seconds: f64,
}

impl TimeSpec {
    /// Create a new TimeSpec from seconds
    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    /// Format as [H:]MM:SS.mmm
    pub fn format_hms(&self) -> String {
        let total_ms = (self.seconds.max(0.0) * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let seconds = (total_ms % 60_000) / 1000;
        let milliseconds = total_ms % 1000;

        if hours > 0 {
            format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, milliseconds)
        } else {
            format!("{:02}:{:02}.{:03}", minutes, seconds, milliseconds)
        }
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_hms())
    }
}

/// Raster dimensions shared by every frame of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size in bytes of one RGBA frame
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

/// An immutable RGBA snapshot of the source at one sample index
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    index: u64,
    timestamp: f64,
    geometry: FrameGeometry,
    pixels: Vec<u8>,
}

impl Frame {
    /// Create a frame, checking the buffer matches the geometry
    pub fn new(
        index: u64,
        timestamp: f64,
        geometry: FrameGeometry,
        pixels: Vec<u8>,
    ) -> Result<Self, DomainError> {
        if pixels.len() != geometry.frame_bytes() {
            return Err(DomainError::LoadError(format!(
                "Frame {} has {} bytes, expected {} for {}x{}",
                index,
                pixels.len(),
                geometry.frame_bytes(),
                geometry.width,
                geometry.height
            )));
        }
        Ok(Self {
            index,
            timestamp,
            geometry,
            pixels,
        })
    }

    /// Sample index `i` in the source timeline
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Source timestamp `i / fps` in seconds
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Metadata reported by a frame source once loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Duration in seconds
    pub duration: f64,
    pub geometry: FrameGeometry,
    /// Container/format name as reported by the demuxer
    pub container: String,
    /// Mime type of the source, used for codec preference
    pub mime_type: String,
}

impl SourceMetadata {
    /// Number of samples at `fps` covering `[0, duration)`: `floor(duration * fps)`
    pub fn total_frames(&self, fps: u32) -> u64 {
        total_frame_count(self.duration, fps)
    }

    /// Bytes needed to hold every extracted frame at once
    pub fn estimated_buffer_bytes(&self, fps: u32) -> u64 {
        self.total_frames(fps) * self.geometry.frame_bytes() as u64
    }

    pub fn is_mp4_family(&self) -> bool {
        self.mime_type.contains("mp4") || self.container.split(',').any(|name| name == "mp4")
    }
}

/// `floor(duration * fps)`, zero for non-finite or negative durations
pub fn total_frame_count(duration: f64, fps: u32) -> u64 {
    let frames = duration * fps as f64;
    if frames.is_finite() && frames > 0.0 {
        frames.floor() as u64
    } else {
        0
    }
}

/// Caller-tunable parameters of one scrambling job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrambleParams {
    /// Extraction and playback rate
    pub fps: u32,
    /// Nominal chunk duration in seconds
    pub chunk_duration_secs: f64,
    /// Maximum random deviation of each chunk's size, in frames
    pub variance_frames: u32,
}

impl Default for ScrambleParams {
    fn default() -> Self {
        Self {
            fps: 24,
            chunk_duration_secs: 1.0,
            variance_frames: 0,
        }
    }
}

impl ScrambleParams {
    pub fn new(fps: u32, chunk_duration_secs: f64, variance_frames: u32) -> Self {
        Self {
            fps,
            chunk_duration_secs,
            variance_frames,
        }
    }

    /// Nominal chunk size `N = max(1, floor(fps * chunk_duration))`
    pub fn nominal_chunk_frames(&self) -> usize {
        let frames = self.fps as f64 * self.chunk_duration_secs;
        if frames.is_finite() && frames >= 1.0 {
            frames.floor() as usize
        } else {
            1
        }
    }
}

/// Contiguous, non-empty run of frames from the source timeline
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    source_index: usize,
    frames: Vec<Frame>,
    duration_ms: f64,
}

impl Chunk {
    /// Create a chunk; `durationMs = frameCount / fps * 1000`
    pub fn new(source_index: usize, frames: Vec<Frame>, fps: u32) -> Result<Self, DomainError> {
        if frames.is_empty() {
            return Err(DomainError::InvalidParameters(format!(
                "Chunk {} has no frames",
                source_index
            )));
        }
        if fps == 0 {
            return Err(DomainError::InvalidParameters(
                "Frame rate must be positive".to_string(),
            ));
        }
        let duration_ms = frames.len() as f64 / fps as f64 * 1000.0;
        Ok(Self {
            source_index,
            frames,
            duration_ms,
        })
    }

    /// Position of this chunk before shuffling
    pub fn source_index(&self) -> usize {
        self.source_index
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }
}

/// Bijection from output position to pre-shuffle chunk index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permutation {
    order: Vec<usize>,
}

impl Permutation {
    pub fn identity(len: usize) -> Self {
        Self {
            order: (0..len).collect(),
        }
    }

    pub(crate) fn swap(&mut self, a: usize, b: usize) {
        self.order.swap(a, b);
    }

    /// Pre-shuffle index of the chunk placed at `position`
    pub fn source_at(&self, position: usize) -> Option<usize> {
        self.order.get(position).copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_identity(&self) -> bool {
        self.order.iter().enumerate().all(|(i, &v)| i == v)
    }

    /// Every index in `0..len` appears exactly once
    pub fn is_bijection(&self) -> bool {
        let mut seen = vec![false; self.order.len()];
        for &index in &self.order {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        true
    }
}

/// Video codecs the reconstructor can ask an encoder for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    Vp9,
    Vp8,
}

impl VideoCodec {
    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Vp8 => "vp8",
        }
    }
}

/// One entry in the encoder negotiation list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecCandidate {
    /// Mime/container descriptor, e.g. `video/webm;codecs=vp9`
    pub mime_type: String,
    /// Container short name (`mp4`, `webm`)
    pub container: String,
    /// Explicit codec, or `None` for the container default
    pub codec: Option<VideoCodec>,
}

impl CodecCandidate {
    pub fn new(container: &str, codec: Option<VideoCodec>) -> Self {
        let mime_type = match codec {
            Some(codec) => format!("video/{};codecs={}", container, codec.name()),
            None => format!("video/{}", container),
        };
        Self {
            mime_type,
            container: container.to_string(),
            codec,
        }
    }

    pub fn file_extension(&self) -> &str {
        &self.container
    }
}

impl fmt::Display for CodecCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type)
    }
}

/// The encoded output: opaque bytes plus the negotiated descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedArtifact {
    bytes: Vec<u8>,
    mime_type: String,
    container: String,
}

impl EncodedArtifact {
    /// Assemble the artifact from the encoder's output segments, in order
    pub fn from_segments(segments: Vec<Vec<u8>>, codec: &CodecCandidate) -> Self {
        Self {
            bytes: segments.concat(),
            mime_type: codec.mime_type.clone(),
            container: codec.container.clone(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_extension(&self) -> &str {
        &self.container
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Timing of one chunk in the output timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChunkTiming {
    /// Pre-shuffle index of the chunk
    pub source_index: usize,
    pub duration_ms: f64,
    pub start_offset_seconds: f64,
}

/// Per-chunk durations and cumulative start offsets, in shuffled order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkTimingMetadata {
    pub entries: Vec<ChunkTiming>,
}

impl ChunkTimingMetadata {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_duration_ms(&self) -> f64 {
        self.entries.iter().map(|e| e.duration_ms).sum()
    }

    pub fn start_offsets(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.start_offset_seconds).collect()
    }

    pub fn durations_ms(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.duration_ms).collect()
    }
}

/// How the reconstructor reacts when painting overruns the frame interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PacingPolicy {
    /// Paint every frame; slots that pass during an overrun hold the previous
    /// picture, so the output grows
    #[default]
    Elongate,
    /// Hold a fixed cadence from the start time; frames whose slot has passed are skipped
    DropFrames,
}

impl PacingPolicy {
    pub fn parse(policy: &str) -> Result<Self, DomainError> {
        match policy.trim().to_lowercase().as_str() {
            "elongate" => Ok(PacingPolicy::Elongate),
            "drop-frames" | "drop_frames" | "drop" => Ok(PacingPolicy::DropFrames),
            _ => Err(DomainError::InvalidParameters(format!(
                "Invalid pacing policy: {}. Valid policies: elongate, drop-frames",
                policy
            ))),
        }
    }
}

impl fmt::Display for PacingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacingPolicy::Elongate => f.write_str("elongate"),
            PacingPolicy::DropFrames => f.write_str("drop-frames"),
        }
    }
}

/// Lifecycle of a scrambling job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Extracting,
    Segmenting,
    Shuffling,
    Reconstructing,
    Encoding,
    AwaitingUpload,
    Complete,
    Failed(ErrorKind),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed(_))
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => f.write_str("idle"),
            JobState::Extracting => f.write_str("extracting"),
            JobState::Segmenting => f.write_str("segmenting"),
            JobState::Shuffling => f.write_str("shuffling"),
            JobState::Reconstructing => f.write_str("reconstructing"),
            JobState::Encoding => f.write_str("encoding"),
            JobState::AwaitingUpload => f.write_str("awaiting_upload"),
            JobState::Complete => f.write_str("complete"),
            JobState::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}
