// Encode LibAV adapter - Frame-at-a-time video encoding using libav

use async_trait::async_trait;
use ffmpeg_next::codec::{self, Id};
use ffmpeg_next::format::{self, Pixel};
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::util::frame::video::Video as VideoFrame;
use ffmpeg_next::{encoder, threading, Packet, Rational};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::*;
use crate::ports::{EncoderBackend, EncoderSession};

/// Encoder backend producing mp4/webm files through libav
pub struct LibavEncoderBackend {
    thread_count: usize,
}

impl LibavEncoderBackend {
    pub fn new() -> Self {
        Self {
            thread_count: Self::optimize_thread_count(),
        }
    }

    /// Use most cores but leave room for the decoder and pacing loop
    fn optimize_thread_count() -> usize {
        let cpu_count = num_cpus::get();
        ((cpu_count as f64 * 0.75).ceil() as usize).clamp(1, 16)
    }

    fn codec_ids(candidate: &CodecCandidate) -> &'static [Id] {
        match candidate.codec {
            Some(VideoCodec::H264) => &[Id::H264],
            Some(VideoCodec::Vp9) => &[Id::VP9],
            Some(VideoCodec::Vp8) => &[Id::VP8],
            // container default
            None if candidate.container == "webm" => &[Id::VP9, Id::VP8, Id::AV1],
            None => &[Id::H264],
        }
    }

    fn find_encoder(candidate: &CodecCandidate) -> Option<ffmpeg_next::Codec> {
        Self::codec_ids(candidate)
            .iter()
            .find_map(|id| encoder::find(*id))
    }
}

impl Default for LibavEncoderBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EncoderBackend for LibavEncoderBackend {
    fn is_supported(&self, candidate: &CodecCandidate) -> bool {
        let supported = Self::find_encoder(candidate).is_some();
        debug!(candidate = %candidate, supported, "Probed encoder");
        supported
    }

    async fn start(
        &self,
        candidate: &CodecCandidate,
        geometry: FrameGeometry,
        fps: u32,
        bitrate: u64,
    ) -> Result<Box<dyn EncoderSession>, DomainError> {
        let codec = Self::find_encoder(candidate)
            .ok_or_else(|| DomainError::CodecUnsupported(vec![candidate.mime_type.clone()]))?;
        let session = LibavEncoderSession::open(
            candidate,
            codec,
            geometry,
            fps,
            bitrate,
            self.thread_count,
        )?;
        info!(
            "Encoder started: {} via {} at {}x{}",
            candidate,
            codec.name(),
            session.encoded.width,
            session.encoded.height
        );
        Ok(Box::new(session))
    }
}

/// An open muxer writing into a scratch file
pub struct LibavEncoderSession {
    output: format::context::Output,
    encoder: encoder::Video,
    scratch: NamedTempFile,
    source: FrameGeometry,
    encoded: FrameGeometry,
    scaler: ScalingContext,
    frame_time_base: Rational,
    stream_time_base: Rational,
    frames_sent: u64,
}

impl LibavEncoderSession {
    fn open(
        candidate: &CodecCandidate,
        codec: ffmpeg_next::Codec,
        geometry: FrameGeometry,
        fps: u32,
        bitrate: u64,
        thread_count: usize,
    ) -> Result<Self, DomainError> {
        let scratch = tempfile::Builder::new()
            .prefix("scrambled-")
            .suffix(&format!(".{}", candidate.file_extension()))
            .tempfile()
            .map_err(|e| DomainError::EncodeFailure(format!("failed to create scratch file: {}", e)))?;

        let mut output = format::output_as(scratch.path(), &candidate.container)
            .map_err(|e| DomainError::EncodeFailure(format!("failed to create {} muxer: {}", candidate.container, e)))?;

        // yuv420p needs even dimensions
        let encoded = FrameGeometry::new((geometry.width & !1).max(2), (geometry.height & !1).max(2));
        let frame_time_base = Rational::new(1, fps as i32);
        let global_header = output.format().flags().contains(format::Flags::GLOBAL_HEADER);

        let mut stream = output
            .add_stream(codec)
            .map_err(|e| DomainError::EncodeFailure(format!("failed to add video stream: {}", e)))?;
        stream.set_time_base(frame_time_base);

        let mut config = codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| DomainError::EncodeFailure(format!("failed to create video encoder: {}", e)))?;
        config.set_width(encoded.width);
        config.set_height(encoded.height);
        config.set_format(Pixel::YUV420P);
        config.set_time_base(frame_time_base);
        config.set_frame_rate(Some(Rational::new(fps as i32, 1)));
        config.set_bit_rate(bitrate as usize);
        config.set_threading(threading::Config::count(thread_count));
        if global_header {
            config.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let encoder = config
            .open_as(codec)
            .map_err(|e| DomainError::EncodeFailure(format!("failed to open {} encoder: {}", codec.name(), e)))?;
        stream.set_parameters(&encoder);

        let scaler = ScalingContext::get(
            Pixel::RGBA,
            geometry.width,
            geometry.height,
            Pixel::YUV420P,
            encoded.width,
            encoded.height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|e| DomainError::EncodeFailure(format!("failed to create scaler: {}", e)))?;

        output
            .write_header()
            .map_err(|e| DomainError::EncodeFailure(format!("failed to write header: {}", e)))?;
        let stream_time_base = output
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or(frame_time_base);

        Ok(Self {
            output,
            encoder,
            scratch,
            source: geometry,
            encoded,
            scaler,
            frame_time_base,
            stream_time_base,
            frames_sent: 0,
        })
    }

    fn to_encoder_frame(&mut self, frame: &Frame) -> Result<VideoFrame, DomainError> {
        let geometry = frame.geometry();
        if geometry != self.source {
            return Err(DomainError::EncodeFailure(format!(
                "frame {} is {}x{}, surface is {}x{}",
                frame.index(),
                geometry.width,
                geometry.height,
                self.source.width,
                self.source.height
            )));
        }

        let mut rgba = VideoFrame::new(Pixel::RGBA, geometry.width, geometry.height);
        let row_bytes = geometry.width as usize * BYTES_PER_PIXEL;
        let stride = rgba.stride(0);
        let data = rgba.data_mut(0);
        for (row, pixels) in frame.pixels().chunks_exact(row_bytes).enumerate() {
            let offset = row * stride;
            data[offset..offset + row_bytes].copy_from_slice(pixels);
        }

        let mut yuv = VideoFrame::empty();
        self.scaler
            .run(&rgba, &mut yuv)
            .map_err(|e| DomainError::EncodeFailure(format!("failed to convert frame: {}", e)))?;
        Ok(yuv)
    }

    fn drain_packets(&mut self) -> Result<(), DomainError> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.frame_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| DomainError::EncodeFailure(format!("failed to write packet: {}", e)))?;
        }
        Ok(())
    }

    fn flush(mut self) -> Result<Vec<Vec<u8>>, DomainError> {
        self.encoder
            .send_eof()
            .map_err(|e| DomainError::EncodeFailure(format!("failed to flush encoder: {}", e)))?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .map_err(|e| DomainError::EncodeFailure(format!("failed to write trailer: {}", e)))?;

        let bytes = std::fs::read(self.scratch.path())
            .map_err(|e| DomainError::EncodeFailure(format!("failed to read encoded output: {}", e)))?;
        debug!("Encoder flushed {} frames into {} bytes", self.frames_sent, bytes.len());
        Ok(vec![bytes])
    }
}

#[async_trait]
impl EncoderSession for LibavEncoderSession {
    fn paint(&mut self, frame: &Frame, slot: u64) -> Result<(), DomainError> {
        let mut yuv = self.to_encoder_frame(frame)?;
        yuv.set_pts(Some(slot as i64));
        self.encoder
            .send_frame(&yuv)
            .map_err(|e| DomainError::EncodeFailure(format!("failed to encode frame {}: {}", slot, e)))?;
        self.frames_sent += 1;
        self.drain_packets()
    }

    async fn finish(self: Box<Self>) -> Result<Vec<Vec<u8>>, DomainError> {
        let session = *self;
        tokio::task::spawn_blocking(move || session.flush())
            .await
            .map_err(|e| DomainError::EncodeFailure(format!("encoder task failed: {}", e)))?
    }

    async fn abort(self: Box<Self>) {
        warn!("Encoder aborted after {} frames; output discarded", self.frames_sent);
        // the scratch file is removed on drop
    }
}
