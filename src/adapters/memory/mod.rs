// Memory adapters - Synthetic source, recording encoder and scripted upload service
//
// Used by `scramble --dry-run` and by the test suites.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::DomainError;
use crate::domain::model::*;
use crate::ports::*;

const ARTIFACT_MAGIC: &[u8] = b"SCRM";

/// Write `value` into the leading bytes of `pixels`
fn stamp(pixels: &mut [u8], value: u64) {
    let bytes = value.to_le_bytes();
    let len = bytes.len().min(pixels.len());
    pixels[..len].copy_from_slice(&bytes[..len]);
}

/// Source frame number stamped into a synthetic frame
pub fn stamped_index(pixels: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let len = bytes.len().min(pixels.len());
    bytes[..len].copy_from_slice(&pixels[..len]);
    u64::from_le_bytes(bytes)
}

/// Synthetic video whose every picture carries the frame number under the
/// playhead in its first pixels.
pub struct MemoryFrameSource {
    metadata: SourceMetadata,
    native_fps: u32,
    playhead: Option<f64>,
    load_delay: Option<Duration>,
    stall_from: Option<f64>,
    resize_from: Option<(f64, FrameGeometry)>,
    seeks: u64,
    released: Arc<AtomicBool>,
}

impl MemoryFrameSource {
    /// A `width`x`height` mp4 source of `duration` seconds recorded at `native_fps`
    pub fn new(duration: f64, geometry: FrameGeometry, native_fps: u32) -> Self {
        Self {
            metadata: SourceMetadata {
                duration,
                geometry,
                container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
                mime_type: "video/mp4".to_string(),
            },
            native_fps: native_fps.max(1),
            playhead: None,
            load_delay: None,
            stall_from: None,
            resize_from: None,
            seeks: 0,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report the source as a webm file
    pub fn with_webm_container(mut self) -> Self {
        self.metadata.container = "matroska,webm".to_string();
        self.metadata.mime_type = "video/webm".to_string();
        self
    }

    /// Delay metadata availability
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Never complete seeks at or beyond `seconds`
    pub fn with_stall_from(mut self, seconds: f64) -> Self {
        self.stall_from = Some(seconds);
        self
    }

    /// Decode pictures of `geometry` from `seconds` onwards
    pub fn with_resize_from(mut self, seconds: f64, geometry: FrameGeometry) -> Self {
        self.resize_from = Some((seconds, geometry));
        self
    }

    pub fn seek_count(&self) -> u64 {
        self.seeks
    }

    /// Shared flag raised once the source has been released
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    async fn load_metadata(&mut self) -> Result<SourceMetadata, DomainError> {
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.metadata.clone())
    }

    async fn seek(&mut self, target_seconds: f64) -> Result<(), DomainError> {
        self.seeks += 1;
        if matches!(self.stall_from, Some(from) if target_seconds >= from) {
            std::future::pending::<()>().await;
        }
        self.playhead = Some(target_seconds);
        Ok(())
    }

    fn capture(&mut self, index: u64, timestamp: f64) -> Result<Frame, DomainError> {
        let playhead = self
            .playhead
            .ok_or_else(|| DomainError::LoadError("capture before seek".to_string()))?;
        let geometry = match self.resize_from {
            Some((from, resized)) if playhead >= from => resized,
            _ => self.metadata.geometry,
        };
        let mut pixels = vec![0u8; geometry.frame_bytes()];
        stamp(&mut pixels, (playhead * self.native_fps as f64).round() as u64);
        Frame::new(index, timestamp, geometry, pixels)
    }

    async fn release(&mut self) {
        self.playhead = None;
        self.released.store(true, Ordering::SeqCst);
    }
}

/// What a [`MemoryEncoderBackend`] observed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncoderRecording {
    pub started: Option<CodecCandidate>,
    /// `(frame index, output slot)` in paint order
    pub painted: Vec<(u64, u64)>,
    pub finished: bool,
    pub aborted: bool,
}

impl EncoderRecording {
    pub fn painted_indices(&self) -> Vec<u64> {
        self.painted.iter().map(|(index, _)| *index).collect()
    }

    pub fn slots(&self) -> Vec<u64> {
        self.painted.iter().map(|(_, slot)| *slot).collect()
    }
}

/// Encoder that records every paint and emits a byte stream of frame indices
#[derive(Clone, Default)]
pub struct MemoryEncoderBackend {
    supported: Option<Vec<String>>,
    fail_at_paint: Option<u64>,
    fail_on_finish: bool,
    paint_cost: Option<Duration>,
    recording: Arc<Mutex<EncoderRecording>>,
}

impl MemoryEncoderBackend {
    /// Supports every candidate
    pub fn new() -> Self {
        Self::default()
    }

    /// Support only the listed mime types
    pub fn supporting(mimes: &[&str]) -> Self {
        Self {
            supported: Some(mimes.iter().map(|m| m.to_string()).collect()),
            ..Self::default()
        }
    }

    /// Fail the paint of the `n`th frame (zero-based)
    pub fn failing_at_paint(mut self, n: u64) -> Self {
        self.fail_at_paint = Some(n);
        self
    }

    pub fn failing_on_finish(mut self) -> Self {
        self.fail_on_finish = true;
        self
    }

    /// Block the calling thread this long on every paint
    pub fn with_paint_cost(mut self, cost: Duration) -> Self {
        self.paint_cost = Some(cost);
        self
    }

    pub fn recording(&self) -> EncoderRecording {
        self.recording
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Decode an artifact produced by this backend back into frame indices
    pub fn decode_artifact(bytes: &[u8]) -> Option<Vec<u64>> {
        let body = bytes.strip_prefix(ARTIFACT_MAGIC)?;
        if body.len() % 8 != 0 {
            return None;
        }
        Some(
            body.chunks_exact(8)
                .map(|chunk| {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(chunk);
                    u64::from_le_bytes(raw)
                })
                .collect(),
        )
    }
}

#[async_trait]
impl EncoderBackend for MemoryEncoderBackend {
    fn is_supported(&self, candidate: &CodecCandidate) -> bool {
        match &self.supported {
            Some(mimes) => mimes.iter().any(|m| m == &candidate.mime_type),
            None => true,
        }
    }

    async fn start(
        &self,
        candidate: &CodecCandidate,
        _geometry: FrameGeometry,
        _fps: u32,
        _bitrate: u64,
    ) -> Result<Box<dyn EncoderSession>, DomainError> {
        if let Ok(mut recording) = self.recording.lock() {
            *recording = EncoderRecording {
                started: Some(candidate.clone()),
                ..EncoderRecording::default()
            };
        }
        Ok(Box::new(MemoryEncoderSession {
            backend: self.clone(),
            segments: vec![ARTIFACT_MAGIC.to_vec()],
            paints: 0,
        }))
    }
}

struct MemoryEncoderSession {
    backend: MemoryEncoderBackend,
    segments: Vec<Vec<u8>>,
    paints: u64,
}

impl MemoryEncoderSession {
    fn record<F: FnOnce(&mut EncoderRecording)>(&self, f: F) {
        if let Ok(mut recording) = self.backend.recording.lock() {
            f(&mut recording);
        }
    }
}

#[async_trait]
impl EncoderSession for MemoryEncoderSession {
    fn paint(&mut self, frame: &Frame, slot: u64) -> Result<(), DomainError> {
        if let Some(cost) = self.backend.paint_cost {
            std::thread::sleep(cost);
        }
        if self.backend.fail_at_paint == Some(self.paints) {
            return Err(DomainError::EncodeFailure(format!(
                "encoder rejected frame {}",
                frame.index()
            )));
        }
        self.paints += 1;
        self.record(|r| r.painted.push((frame.index(), slot)));

        // one output segment per second of 24 fps video
        if slot % 24 == 0 {
            self.segments.push(Vec::new());
        }
        if let Some(segment) = self.segments.last_mut() {
            segment.extend_from_slice(&frame.index().to_le_bytes());
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<Vec<Vec<u8>>, DomainError> {
        if self.backend.fail_on_finish {
            self.record(|r| r.aborted = true);
            return Err(DomainError::EncodeFailure("final flush failed".to_string()));
        }
        self.record(|r| r.finished = true);
        Ok(self.segments)
    }

    async fn abort(self: Box<Self>) {
        self.record(|r| r.aborted = true);
    }
}

/// What a [`MemoryUploadPort`] observed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadRecording {
    pub uploads_created: u32,
    pub transferred: Vec<(String, usize)>,
    pub polls: u32,
}

/// Upload service that turns an upload into an asset after a set number of polls
pub struct MemoryUploadPort {
    ready_after_polls: Option<u32>,
    failing_polls: u32,
    playback_id: Option<String>,
    polls: AtomicU32,
    recording: Mutex<UploadRecording>,
}

impl MemoryUploadPort {
    /// Asset appears on poll number `polls` (1-based)
    pub fn ready_after(polls: u32) -> Self {
        Self {
            ready_after_polls: Some(polls),
            failing_polls: 0,
            playback_id: Some("playback-1".to_string()),
            polls: AtomicU32::new(0),
            recording: Mutex::new(UploadRecording::default()),
        }
    }

    /// Asset never appears
    pub fn never_ready() -> Self {
        Self {
            ready_after_polls: None,
            ..Self::ready_after(0)
        }
    }

    /// The first `n` polls return an error
    pub fn with_failing_polls(mut self, n: u32) -> Self {
        self.failing_polls = n;
        self
    }

    pub fn without_playback_id(mut self) -> Self {
        self.playback_id = None;
        self
    }

    pub fn recording(&self) -> UploadRecording {
        self.recording
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UploadPort for MemoryUploadPort {
    async fn create_upload(&self) -> Result<UploadTarget, DomainError> {
        if let Ok(mut recording) = self.recording.lock() {
            recording.uploads_created += 1;
        }
        Ok(UploadTarget {
            upload_id: "upload-1".to_string(),
            url: "memory://upload-1".to_string(),
        })
    }

    async fn transfer(
        &self,
        _target: &UploadTarget,
        artifact: &EncodedArtifact,
    ) -> Result<(), DomainError> {
        if let Ok(mut recording) = self.recording.lock() {
            recording
                .transferred
                .push((artifact.mime_type().to_string(), artifact.len()));
        }
        Ok(())
    }

    async fn poll(&self, upload_id: &str) -> Result<UploadStatus, DomainError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut recording) = self.recording.lock() {
            recording.polls = poll;
        }
        if poll <= self.failing_polls {
            return Err(DomainError::UploadFailure(format!(
                "transient error polling {}",
                upload_id
            )));
        }
        match self.ready_after_polls {
            Some(ready) if poll >= ready => Ok(UploadStatus::AssetCreated {
                asset_id: "asset-1".to_string(),
            }),
            _ => Ok(UploadStatus::Waiting),
        }
    }

    async fn asset(&self, asset_id: &str) -> Result<AssetInfo, DomainError> {
        Ok(AssetInfo {
            asset_id: asset_id.to_string(),
            playback_id: self.playback_id.clone(),
            duration: None,
            status: "ready".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_source_stamps_playhead_frame() {
        let mut source = MemoryFrameSource::new(2.0, FrameGeometry::new(2, 2), 24);
        source.load_metadata().await.unwrap();
        source.seek(0.5).await.unwrap();
        let frame = source.capture(12, 0.5).unwrap();
        assert_eq!(stamped_index(frame.pixels()), 12);

        source.release().await;
        assert!(source.is_released());
        assert!(source.capture(13, 0.54).is_err());
    }

    #[tokio::test]
    async fn test_encoder_artifact_decodes_to_paint_order() {
        let backend = MemoryEncoderBackend::new();
        let candidate = CodecCandidate::new("webm", Some(VideoCodec::Vp9));
        let geometry = FrameGeometry::new(1, 1);
        let mut session = backend.start(&candidate, geometry, 24, 1).await.unwrap();

        for (slot, index) in [5u64, 3, 9].into_iter().enumerate() {
            let frame = Frame::new(index, 0.0, geometry, vec![0; 4]).unwrap();
            session.paint(&frame, slot as u64).unwrap();
        }
        let bytes = session.finish().await.unwrap().concat();

        assert_eq!(MemoryEncoderBackend::decode_artifact(&bytes), Some(vec![5, 3, 9]));
        let recording = backend.recording();
        assert!(recording.finished);
        assert_eq!(recording.slots(), vec![0, 1, 2]);
    }

    #[test]
    fn test_supporting_filters_candidates() {
        let backend = MemoryEncoderBackend::supporting(&["video/webm"]);
        assert!(backend.is_supported(&CodecCandidate::new("webm", None)));
        assert!(!backend.is_supported(&CodecCandidate::new("mp4", Some(VideoCodec::H264))));
    }
}
