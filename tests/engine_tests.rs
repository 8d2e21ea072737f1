//! End-to-end pipeline tests over the in-memory adapters

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use frame_scrambler::adapters::memory::stamped_index;
use frame_scrambler::adapters::{MemoryEncoderBackend, MemoryFrameSource, MemoryUploadPort};
use frame_scrambler::app::{ScrambleInteractor, ScrambleOutcome, ScrambleRequest, UploadPolicy};
use frame_scrambler::domain::model::{FrameGeometry, JobState, PacingPolicy, ScrambleParams};
use frame_scrambler::engine::{
    ExtractionOptions, FrameExtractor, ProgressCallback, ProgressReporter, ProgressUpdate,
};
use frame_scrambler::ports::UploadPort;
use frame_scrambler::{DomainError, ErrorKind};

// Test utilities

fn geometry() -> FrameGeometry {
    FrameGeometry::new(2, 2)
}

fn source(duration: f64) -> MemoryFrameSource {
    MemoryFrameSource::new(duration, geometry(), 24)
}

fn request(chunk_duration: f64, variance: u32) -> ScrambleRequest {
    ScrambleRequest::new(ScrambleParams::new(24, chunk_duration, variance))
}

fn interactor(backend: &MemoryEncoderBackend) -> ScrambleInteractor {
    ScrambleInteractor::new(Arc::new(backend.clone()), None, ProgressReporter::new())
}

async fn run(
    backend: &MemoryEncoderBackend,
    source: &mut MemoryFrameSource,
    request: &ScrambleRequest,
    seed: u64,
) -> Result<ScrambleOutcome, DomainError> {
    interactor(backend)
        .execute(
            source,
            request,
            &mut StdRng::seed_from_u64(seed),
            &CancellationToken::new(),
        )
        .await
}

/// Frame indices the permuted chunk list should play, in output order
fn expected_order(outcome: &ScrambleOutcome, chunk_frames: u64, total: u64) -> Vec<u64> {
    outcome
        .permutation
        .as_slice()
        .iter()
        .flat_map(|&chunk| {
            let start = chunk as u64 * chunk_frames;
            start..(start + chunk_frames).min(total)
        })
        .collect()
}

#[derive(Default)]
struct Collector {
    percents: Mutex<Vec<u8>>,
}

impl ProgressCallback for Collector {
    fn on_progress(&self, update: &ProgressUpdate) {
        if let Ok(mut percents) = self.percents.lock() {
            percents.push(update.percent);
        }
    }
}

// Extraction

#[tokio::test(start_paused = true)]
async fn test_frame_count_is_floor_of_duration_times_fps() {
    let progress = ProgressReporter::new();
    let cancel = CancellationToken::new();

    for (duration, expected) in [(1.0, 24u64), (5.3, 127), (0.99, 23), (10.0, 240)] {
        let mut source = source(duration);
        let extracted = FrameExtractor::new(ExtractionOptions::new(24), &progress, &cancel)
            .extract(&mut source)
            .await
            .unwrap();

        assert_eq!(extracted.frames.len() as u64, expected, "duration {}", duration);
        assert_eq!(source.seek_count(), expected);
        for (i, frame) in extracted.frames.iter().enumerate() {
            assert_eq!(frame.index(), i as u64);
            assert_eq!(stamped_index(frame.pixels()), i as u64);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_seek_times_out() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(3.0).with_stall_from(1.0);
    let mut request = request(1.0, 0);
    request.seek_timeout = Duration::from_secs(2);

    let err = run(&backend, &mut source, &request, 1).await.unwrap_err();

    assert_eq!(
        err,
        DomainError::SeekTimeout {
            frame_index: 24,
            target_seconds: 1.0,
            bound_secs: 2
        }
    );
    assert!(source.is_released());
    assert!(backend.recording().started.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_mid_stream_resize_fails_extraction() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(3.0).with_resize_from(2.0, FrameGeometry::new(4, 2));

    let err = run(&backend, &mut source, &request(1.0, 0), 1).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadError);
    assert!(err.to_string().contains("frame 48"), "{}", err);
    assert_eq!(source.seek_count(), 49);
    assert!(source.is_released());
    assert!(backend.recording().started.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_slow_metadata_is_load_error() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(3.0).with_load_delay(Duration::from_secs(60));

    let err = run(&backend, &mut source, &request(1.0, 0), 1).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadError);
    assert_eq!(source.seek_count(), 0);
    assert!(source.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_buffer_limit_refuses_before_extraction() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(10.0);
    let mut request = request(1.0, 0);
    request.buffer_limit = Some(1000);

    let err = run(&backend, &mut source, &request, 1).await.unwrap_err();

    assert_eq!(
        err,
        DomainError::BufferLimitExceeded {
            required: 240 * 16,
            limit: 1000
        }
    );
    assert_eq!(source.seek_count(), 0);
}

// Segmentation, shuffle and timing

#[tokio::test(start_paused = true)]
async fn test_ten_seconds_in_two_second_chunks() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(10.0);

    let outcome = run(&backend, &mut source, &request(2.0, 0), 7).await.unwrap();

    assert_eq!(outcome.nominal_chunk_frames, 48);
    assert_eq!(outcome.frames_extracted, 240);
    assert_eq!(outcome.timing.len(), 5);
    assert_eq!(outcome.timing.durations_ms(), vec![2000.0; 5]);
    assert_eq!(outcome.timing.start_offsets(), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    assert!(outcome.permutation.is_bijection());

    let mut sources: Vec<usize> = outcome.timing.entries.iter().map(|e| e.source_index).collect();
    assert_eq!(sources, outcome.permutation.as_slice().to_vec());
    sources.sort_unstable();
    assert_eq!(sources, vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_five_seconds_in_one_second_chunks() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(5.0);

    let outcome = run(&backend, &mut source, &request(1.0, 0), 3).await.unwrap();

    assert_eq!(outcome.timing.len(), 5);
    assert_eq!(outcome.timing.durations_ms(), vec![1000.0; 5]);
    assert_eq!(outcome.frames_painted, 120);
}

#[tokio::test(start_paused = true)]
async fn test_remainder_forms_final_short_chunk() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(5.3);

    let outcome = run(&backend, &mut source, &request(1.0, 0), 11).await.unwrap();

    assert_eq!(outcome.frames_extracted, 127);
    assert_eq!(outcome.timing.len(), 6);
    assert_eq!(outcome.frames_painted, 127);
    assert_eq!(outcome.frames_dropped, 0);

    let short: Vec<_> = outcome
        .timing
        .entries
        .iter()
        .filter(|e| e.duration_ms < 1000.0)
        .collect();
    assert_eq!(short.len(), 1);
    assert_eq!(short[0].source_index, 5);
    assert!((short[0].duration_ms - 7.0 * 1000.0 / 24.0).abs() < 1e-9);

    let total: f64 = outcome.timing.total_duration_ms();
    assert!((total - 127.0 * 1000.0 / 24.0).abs() < 1e-6);
}

#[tokio::test(start_paused = true)]
async fn test_variance_at_least_nominal_never_yields_empty_chunks() {
    let backend = MemoryEncoderBackend::new();

    for seed in 0..20 {
        let mut source = source(3.0);
        // N = 6, V = 10
        let outcome = run(&backend, &mut source, &request(0.25, 10), seed).await.unwrap();

        let frames: f64 = outcome
            .timing
            .durations_ms()
            .iter()
            .map(|ms| ms * 24.0 / 1000.0)
            .sum();
        assert!((frames - 72.0).abs() < 1e-6);
        for duration in outcome.timing.durations_ms() {
            let count = (duration * 24.0 / 1000.0).round() as u64;
            assert!((1..=16).contains(&count), "chunk of {} frames", count);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_offsets_are_cumulative_durations() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(6.0);

    let outcome = run(&backend, &mut source, &request(0.5, 6), 99).await.unwrap();

    let mut expected = 0.0;
    for entry in &outcome.timing.entries {
        assert!((entry.start_offset_seconds - expected).abs() < 1e-9);
        expected += entry.duration_ms / 1000.0;
    }
    let offsets = outcome.timing.start_offsets();
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_same_permutation() {
    let backend = MemoryEncoderBackend::new();

    let first = run(&backend, &mut source(8.0), &request(0.5, 4), 2024).await.unwrap();
    let second = run(&backend, &mut source(8.0), &request(0.5, 4), 2024).await.unwrap();

    assert_eq!(first.permutation, second.permutation);
    assert_eq!(first.timing, second.timing);
}

// Reconstruction

#[tokio::test(start_paused = true)]
async fn test_artifact_plays_chunks_in_permuted_order() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(5.3);

    let outcome = run(&backend, &mut source, &request(1.0, 0), 5).await.unwrap();

    let decoded = MemoryEncoderBackend::decode_artifact(outcome.artifact.bytes()).unwrap();
    assert_eq!(decoded, expected_order(&outcome, 24, 127));
    assert_eq!(backend.recording().slots(), (0..127).collect::<Vec<u64>>());
    assert!(backend.recording().finished);
    assert_eq!(outcome.artifact.mime_type(), "video/mp4;codecs=h264");
}

#[tokio::test(start_paused = true)]
async fn test_elongate_paces_at_frame_interval() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(2.0);
    let started = tokio::time::Instant::now();

    let outcome = run(&backend, &mut source, &request(1.0, 0), 1).await.unwrap();

    // 48 paints each followed by a full interval of sleep
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1990), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2100), "{:?}", elapsed);
    assert_eq!(outcome.output_frames, 48);
    assert_eq!(backend.recording().slots(), (0..48).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_elongate_overruns_stretch_the_output() {
    // Every paint overruns the 41.7ms interval
    let backend = MemoryEncoderBackend::new().with_paint_cost(Duration::from_millis(60));
    let mut source = source(1.0);

    let outcome = run(&backend, &mut source, &request(0.25, 0), 4).await.unwrap();

    assert_eq!(outcome.frames_painted, 24);
    assert_eq!(outcome.frames_dropped, 0);

    let recording = backend.recording();
    assert_eq!(recording.painted_indices(), expected_order(&outcome, 6, 24));

    let slots = recording.slots();
    assert_eq!(slots[0], 0);
    assert!(slots.windows(2).all(|w| w[0] < w[1]));
    assert!(slots.windows(2).any(|w| w[1] - w[0] > 1), "{:?}", slots);
    assert!(*slots.last().unwrap() > 23, "{:?}", slots);
    assert!(outcome.output_frames > 24);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_frames_skips_late_slots_but_keeps_final_frame() {
    // Every paint overruns the 41.7ms interval
    let backend = MemoryEncoderBackend::new().with_paint_cost(Duration::from_millis(60));
    let mut source = source(1.0);
    let mut request = request(0.25, 0);
    request.pacing = PacingPolicy::DropFrames;

    let outcome = run(&backend, &mut source, &request, 4).await.unwrap();

    assert!(outcome.frames_dropped > 0);
    assert_eq!(outcome.frames_painted + outcome.frames_dropped, 24);

    let recording = backend.recording();
    let slots = recording.slots();
    assert!(slots.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(slots.last(), Some(&23));

    let last_frame = *expected_order(&outcome, 6, 24).last().unwrap();
    assert_eq!(recording.painted_indices().last(), Some(&last_frame));
}

#[tokio::test(start_paused = true)]
async fn test_codec_negotiation_follows_source_container() {
    let backend = MemoryEncoderBackend::supporting(&["video/mp4;codecs=h264", "video/webm;codecs=vp8"]);

    let mut webm = source(1.0).with_webm_container();
    let outcome = run(&backend, &mut webm, &request(0.5, 0), 1).await.unwrap();
    assert_eq!(outcome.codec.mime_type, "video/webm;codecs=vp8");
    assert_eq!(outcome.artifact.file_extension(), "webm");

    let mut mp4 = source(1.0);
    let outcome = run(&backend, &mut mp4, &request(0.5, 0), 1).await.unwrap();
    assert_eq!(outcome.codec.mime_type, "video/mp4;codecs=h264");
}

#[tokio::test(start_paused = true)]
async fn test_no_supported_codec() {
    let backend = MemoryEncoderBackend::supporting(&[]);
    let mut source = source(1.0).with_webm_container();

    let err = run(&backend, &mut source, &request(0.5, 0), 1).await.unwrap_err();

    match err {
        DomainError::CodecUnsupported(tried) => assert_eq!(
            tried,
            vec!["video/webm;codecs=vp9", "video/webm;codecs=vp8", "video/webm"]
        ),
        other => panic!("unexpected error {:?}", other),
    }
    assert!(source.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_paint_failure_discards_output() {
    let backend = MemoryEncoderBackend::new().failing_at_paint(10);
    let mut source = source(2.0);

    let err = run(&backend, &mut source, &request(0.5, 0), 1).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::EncodeFailure);
    let recording = backend.recording();
    assert!(recording.aborted);
    assert!(!recording.finished);
    assert_eq!(recording.painted.len(), 10);
    assert!(source.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_flush_failure_is_encode_failure() {
    let backend = MemoryEncoderBackend::new().failing_on_finish();
    let mut source = source(1.0);

    let err = run(&backend, &mut source, &request(0.5, 0), 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailure);
}

// Cancellation

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start_touches_nothing() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(2.0);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = interactor(&backend)
        .execute(&mut source, &request(1.0, 0), &mut StdRng::seed_from_u64(1), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(source.seek_count(), 0);
    assert!(source.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_encoding_aborts_encoder() {
    let backend = MemoryEncoderBackend::new();
    let mut source = source(10.0);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        trigger.cancel();
    });

    let err = interactor(&backend)
        .execute(&mut source, &request(1.0, 0), &mut StdRng::seed_from_u64(1), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    let recording = backend.recording();
    assert!(recording.aborted);
    assert!(recording.painted.len() < 240);
    assert!(source.is_released());
}

// Progress

#[tokio::test(start_paused = true)]
async fn test_progress_is_monotonic_through_phases() {
    let backend = MemoryEncoderBackend::new();
    let collector = Arc::new(Collector::default());
    let progress = ProgressReporter::new();
    progress.add_callback(collector.clone());

    let interactor = ScrambleInteractor::new(Arc::new(backend), None, progress);
    interactor
        .execute(
            &mut source(3.0),
            &request(0.5, 2),
            &mut StdRng::seed_from_u64(8),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let percents = collector.percents.lock().unwrap().clone();
    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert!(percents.contains(&40));
    assert!(percents.contains(&50));
    assert_eq!(percents.last(), Some(&95));
}

// Upload handoff

#[tokio::test(start_paused = true)]
async fn test_upload_completes_job() {
    let backend = MemoryEncoderBackend::new();
    let port = Arc::new(MemoryUploadPort::ready_after(2));
    let interactor = ScrambleInteractor::new(
        Arc::new(backend),
        Some(port.clone() as Arc<dyn UploadPort>),
        ProgressReporter::new(),
    );
    let mut request = request(1.0, 0);
    request.upload = Some(UploadPolicy::default());

    let outcome = interactor
        .execute(&mut source(2.0), &request, &mut StdRng::seed_from_u64(1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.final_state, JobState::Complete);
    let asset = outcome.upload.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(asset.asset_id, "asset-1");
    assert_eq!(asset.upload_id, "upload-1");
    assert_eq!(interactor.progress().current(), 100);
    assert_eq!(
        port.recording().transferred,
        vec![(outcome.artifact.mime_type().to_string(), outcome.artifact.len())]
    );
}

#[tokio::test(start_paused = true)]
async fn test_upload_timeout_keeps_artifact() {
    let backend = MemoryEncoderBackend::new();
    let port = Arc::new(MemoryUploadPort::never_ready());
    let interactor = ScrambleInteractor::new(
        Arc::new(backend),
        Some(port.clone() as Arc<dyn UploadPort>),
        ProgressReporter::new(),
    );
    let mut request = request(1.0, 0);
    request.upload = Some(UploadPolicy {
        poll_interval: Duration::from_secs(5),
        max_attempts: 3,
    });

    let outcome = interactor
        .execute(&mut source(2.0), &request, &mut StdRng::seed_from_u64(1), &CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.artifact.is_empty());
    assert_eq!(
        outcome.upload_error(),
        Some(&DomainError::UploadTimeout {
            upload_id: "upload-1".to_string(),
            attempts: 3
        })
    );
    assert_eq!(outcome.final_state, JobState::Failed(ErrorKind::UploadTimeout));
    assert_eq!(port.recording().polls, 3);
}
