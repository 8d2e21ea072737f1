// Decode LibAV adapter - Positioned frame decoding using libav

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ffmpeg_next::format::{self, Pixel};
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use ffmpeg_next::{codec, decoder, media, Rational};
use tracing::{debug, trace};

use crate::domain::errors::DomainError;
use crate::domain::model::*;
use crate::ports::FrameSource;

/// Forward decoding is used instead of a container seek for targets this
/// close ahead of the current picture
const FORWARD_DECODE_WINDOW_SECS: f64 = 2.0;

/// Timestamps closer than this are treated as equal
const PTS_EPSILON: f64 = 1e-4;

/// Demuxer, decoder and the picture currently under the playhead
struct DecodeState {
    input: format::context::Input,
    decoder: decoder::Video,
    stream_index: usize,
    time_base: Rational,
    start_offset: f64,
    current: Option<(f64, VideoFrame)>,
    pending: Option<(f64, VideoFrame)>,
    eof: bool,
    /// RGBA converter for the input format and size it was built for
    scaler: Option<(Pixel, u32, u32, ScalingContext)>,
}

impl DecodeState {
    fn open(path: &Path) -> Result<(Self, SourceMetadata), DomainError> {
        let input = format::input(path).map_err(|e| {
            DomainError::LoadError(format!("failed to open {}: {}", path.display(), e))
        })?;

        let stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| DomainError::LoadError("no video stream found".to_string()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_offset = match stream.start_time() {
            ts if ts > 0 => ts as f64 * f64::from(time_base),
            _ => 0.0,
        };

        let decoder = codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| DomainError::LoadError(format!("failed to create decoder context: {}", e)))?
            .decoder()
            .video()
            .map_err(|e| DomainError::LoadError(format!("failed to create video decoder: {}", e)))?;

        let duration = if input.duration() > 0 {
            input.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE)
        } else if stream.duration() > 0 {
            stream.duration() as f64 * f64::from(time_base)
        } else {
            0.0
        };

        let metadata = SourceMetadata {
            duration,
            geometry: FrameGeometry::new(decoder.width(), decoder.height()),
            container: input.format().name().to_string(),
            mime_type: mime_type_for(path),
        };

        Ok((
            Self {
                input,
                decoder,
                stream_index,
                time_base,
                start_offset,
                current: None,
                pending: None,
                eof: false,
                scaler: None,
            },
            metadata,
        ))
    }

    /// Leave the latest picture with `pts <= target` in `current`.
    ///
    /// Gives up between packets once `released` is raised.
    fn position(&mut self, target: f64, released: &AtomicBool) -> Result<(), DomainError> {
        let needs_seek = match &self.current {
            None => true,
            Some((pts, _)) => {
                target + PTS_EPSILON < *pts || target - pts > FORWARD_DECODE_WINDOW_SECS
            }
        };
        if needs_seek {
            self.seek_container(target)?;
        }

        loop {
            if released.load(Ordering::SeqCst) {
                return Err(DomainError::Cancelled(format!(
                    "source released while seeking {:.3}s",
                    target
                )));
            }
            if let Some((pts, _)) = &self.pending {
                if *pts > target + PTS_EPSILON {
                    break;
                }
                self.current = self.pending.take();
            }
            match self.decode_next()? {
                Some(decoded) => self.pending = Some(decoded),
                None => break,
            }
        }

        // the first decoded picture may start after the target
        if self.current.is_none() {
            self.current = self.pending.take();
        }
        if self.current.is_none() {
            return Err(DomainError::LoadError(format!(
                "no picture decodable at {:.3}s",
                target
            )));
        }
        Ok(())
    }

    fn seek_container(&mut self, target: f64) -> Result<(), DomainError> {
        let timestamp = ((target + self.start_offset) * f64::from(ffmpeg_next::ffi::AV_TIME_BASE)) as i64;
        self.input
            .seek(timestamp, ..timestamp)
            .map_err(|e| DomainError::LoadError(format!("seek to {:.3}s failed: {}", target, e)))?;
        self.decoder.flush();
        self.current = None;
        self.pending = None;
        self.eof = false;
        trace!(target, "Container seek");
        Ok(())
    }

    fn decode_next(&mut self) -> Result<Option<(f64, VideoFrame)>, DomainError> {
        let mut frame = VideoFrame::empty();
        loop {
            if self.decoder.receive_frame(&mut frame).is_ok() {
                let pts = frame.pts().or(frame.timestamp()).unwrap_or(0);
                let seconds = pts as f64 * f64::from(self.time_base) - self.start_offset;
                return Ok(Some((seconds, frame)));
            }
            if self.eof {
                return Ok(None);
            }

            let mut sent = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .map_err(|e| DomainError::LoadError(format!("failed to decode packet: {}", e)))?;
                sent = true;
                break;
            }

            if !sent {
                self.decoder
                    .send_eof()
                    .map_err(|e| DomainError::LoadError(format!("failed to flush decoder: {}", e)))?;
                self.eof = true;
            }
        }
    }

    /// Convert the current picture to tightly packed RGBA
    fn snapshot(&mut self) -> Result<(FrameGeometry, Vec<u8>), DomainError> {
        let (_, frame) = self
            .current
            .as_ref()
            .ok_or_else(|| DomainError::LoadError("capture before seek".to_string()))?;

        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        let reusable = matches!(
            &self.scaler,
            Some((f, w, h, _)) if *f == format && *w == width && *h == height
        );
        if !reusable {
            let context = ScalingContext::get(
                format,
                width,
                height,
                Pixel::RGBA,
                width,
                height,
                ScalingFlags::BILINEAR,
            )
            .map_err(|e| DomainError::LoadError(format!("failed to create scaler: {}", e)))?;
            self.scaler = Some((format, width, height, context));
        }

        let mut rgba = VideoFrame::empty();
        if let Some((_, _, _, scaler)) = self.scaler.as_mut() {
            scaler
                .run(frame, &mut rgba)
                .map_err(|e| DomainError::LoadError(format!("failed to convert frame: {}", e)))?;
        }

        let geometry = FrameGeometry::new(width, height);
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        let stride = rgba.stride(0);
        let data = rgba.data(0);
        let mut pixels = Vec::with_capacity(geometry.frame_bytes());
        for row in 0..height as usize {
            let offset = row * stride;
            pixels.extend_from_slice(&data[offset..offset + row_bytes]);
        }
        Ok((geometry, pixels))
    }
}

type SharedState = Arc<Mutex<Option<DecodeState>>>;

fn lock_state(state: &SharedState) -> Result<MutexGuard<'_, Option<DecodeState>>, DomainError> {
    state
        .lock()
        .map_err(|_| DomainError::LoadError("decoder state poisoned".to_string()))
}

/// Frame source backed by the libav demuxer and decoder.
///
/// Positioning runs on the blocking pool. The decoder state stays shared
/// with this source, so a seek abandoned by its caller can still be
/// released: the in-flight task stops at the next packet and the state is
/// dropped as soon as the task lets go of it.
pub struct LibavFrameSource {
    path: PathBuf,
    state: SharedState,
    released: Arc<AtomicBool>,
}

impl LibavFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Arc::new(Mutex::new(None)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a demuxer and decoder are open; waits for an in-flight seek
    pub fn is_loaded(&self) -> bool {
        lock_state(&self.state)
            .map(|state| state.is_some())
            .unwrap_or(false)
    }
}

#[async_trait]
impl FrameSource for LibavFrameSource {
    async fn load_metadata(&mut self) -> Result<SourceMetadata, DomainError> {
        let path = self.path.clone();
        let (state, metadata) = tokio::task::spawn_blocking(move || DecodeState::open(&path))
            .await
            .map_err(|e| DomainError::LoadError(format!("decoder task failed: {}", e)))??;

        debug!(
            path = %self.path.display(),
            container = %metadata.container,
            "Opened source"
        );
        *lock_state(&self.state)? = Some(state);
        self.released.store(false, Ordering::SeqCst);
        Ok(metadata)
    }

    async fn seek(&mut self, target_seconds: f64) -> Result<(), DomainError> {
        let state = Arc::clone(&self.state);
        let released = Arc::clone(&self.released);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock_state(&state)?;
            let decode = guard
                .as_mut()
                .ok_or_else(|| DomainError::LoadError("source is not loaded".to_string()))?;
            let result = decode.position(target_seconds, &released);
            if released.load(Ordering::SeqCst) {
                guard.take();
            }
            result
        })
        .await
        .map_err(|e| DomainError::LoadError(format!("decoder task failed: {}", e)))?
    }

    fn capture(&mut self, index: u64, timestamp: f64) -> Result<Frame, DomainError> {
        let mut guard = lock_state(&self.state)?;
        let state = guard
            .as_mut()
            .ok_or_else(|| DomainError::LoadError("source is not loaded".to_string()))?;
        let (geometry, pixels) = state.snapshot()?;
        Frame::new(index, timestamp, geometry, pixels)
    }

    async fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
        let released_now = match self.state.try_lock() {
            Ok(mut state) => state.take().is_some(),
            Err(_) => {
                // a detached seek still holds the decoder; drop it once that task returns
                let state = Arc::clone(&self.state);
                tokio::task::spawn_blocking(move || {
                    if let Ok(mut state) = state.lock() {
                        state.take();
                    }
                });
                debug!(path = %self.path.display(), "Release deferred to in-flight seek");
                false
            }
        };
        if released_now {
            debug!(path = %self.path.display(), "Released source");
        }
    }
}

/// Mime type guessed from the file extension
pub fn mime_type_for(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        Some("ogv") => "video/ogg",
        Some("avi") => "video/x-msvideo",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_from_extension() {
        assert_eq!(mime_type_for(Path::new("clip.MP4")), "video/mp4");
        assert_eq!(mime_type_for(Path::new("/tmp/a.webm")), "video/webm");
        assert_eq!(mime_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_unloaded_source_refuses_to_seek() {
        let mut source = LibavFrameSource::new("missing.mp4");
        let err = source.seek(0.0).await.unwrap_err();
        assert!(matches!(err, DomainError::LoadError(_)));
        assert!(source.capture(0, 0.0).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_while_seek_holds_state() {
        let mut source = LibavFrameSource::new("busy.mp4");
        let state = Arc::clone(&source.state);
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let seek = std::thread::spawn(move || {
            let _guard = state.lock().unwrap();
            held_tx.send(()).unwrap();
            done_rx.recv().unwrap();
        });
        held_rx.recv().unwrap();

        source.release().await;
        assert!(source.released.load(Ordering::SeqCst));

        done_tx.send(()).unwrap();
        seek.join().unwrap();
        assert!(!source.is_loaded());
    }
}
