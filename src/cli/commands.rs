//! Command implementations

use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::LibavFrameSource;
use crate::app::{AppContainer, DefaultAppContainer, ScrambleOutcome};
use crate::cli::args::{ProbeArgs, ScrambleArgs};
use crate::cli::report::{default_output_path, default_timeline_path, TimelineDocument};
use crate::config_initialization::ScramblerConfig;
use crate::domain::model::SourceMetadata;
use crate::error::ScramblerError;
use crate::ports::FrameSource;
use crate::utils::time::format_seconds;
use crate::utils::Utils;

/// Execute the scramble command
pub async fn scramble(
    args: ScrambleArgs,
    config: &ScramblerConfig,
    cancel: CancellationToken,
) -> Result<()> {
    info!("Starting scramble operation");
    info!("Input: {}", args.input.display());

    ensure_input_exists(&args.input)?;

    let container = DefaultAppContainer::new(config, args.dry_run).map_err(ScramblerError::from)?;
    let mut request = config.request();
    if args.dry_run {
        request.upload = None;
    }

    let mut rng = match args.seed {
        Some(seed) => {
            info!("Using seed {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_os_rng(),
    };

    let mut source = container.frame_source(&args.input);
    let outcome = container
        .scramble_interactor()
        .execute(source.as_mut(), &request, &mut rng, &cancel)
        .await
        .map_err(ScramblerError::from)
        .context("Scramble failed")?;

    let document = TimelineDocument::from_outcome(&outcome, config.fps, config.chunk_variance_frames);

    if args.dry_run {
        info!("Dry run: no files written");
        if let Some(path) = &args.metadata {
            document.write(path, args.metadata_format)?;
        }
        display_outcome(&outcome, None);
        return Ok(());
    }

    let output_path = match &args.output {
        Some(path) => {
            if path.extension().and_then(|e| e.to_str()) != Some(outcome.artifact.file_extension()) {
                warn!(
                    "Output {} does not end in .{}; the container is {}",
                    path.display(),
                    outcome.artifact.file_extension(),
                    outcome.artifact.mime_type()
                );
            }
            path.clone()
        }
        None => default_output_path(&args.input, outcome.artifact.file_extension()),
    };

    std::fs::write(&output_path, outcome.artifact.bytes()).map_err(|source| {
        ScramblerError::OutputError {
            path: output_path.display().to_string(),
            source,
        }
    })?;
    info!("Wrote {}", output_path.display());

    let timeline_path = args
        .metadata
        .clone()
        .unwrap_or_else(|| default_timeline_path(&output_path, args.metadata_format));
    document
        .write(&timeline_path, args.metadata_format)
        .context("Failed to write timeline")?;
    info!("Wrote timeline {}", timeline_path.display());

    display_outcome(&outcome, Some(&output_path));

    // The artifact stays on disk; the failure still surfaces in the exit status
    if let Some(e) = outcome.upload_error() {
        return Err(anyhow::Error::new(ScramblerError::from(e.clone())).context(format!(
            "Upload failed; scrambled video kept at {}",
            output_path.display()
        )));
    }

    info!("Scramble operation completed successfully");
    Ok(())
}

/// What `probe` reports about a source
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    #[serde(flatten)]
    pub metadata: SourceMetadata,
    pub fps: u32,
    pub total_frames: u64,
    pub estimated_buffer_bytes: u64,
}

impl ProbeReport {
    pub fn new(metadata: SourceMetadata, fps: u32) -> Self {
        Self {
            total_frames: metadata.total_frames(fps),
            estimated_buffer_bytes: metadata.estimated_buffer_bytes(fps),
            metadata,
            fps,
        }
    }
}

/// Execute the probe command
pub async fn probe(args: ProbeArgs, config: &ScramblerConfig) -> Result<()> {
    info!("Starting probe operation");
    info!("Input: {}", args.input.display());

    ensure_input_exists(&args.input)?;

    let mut source = LibavFrameSource::new(&args.input);
    let loaded = source.load_metadata().await;
    source.release().await;
    let metadata = loaded
        .map_err(ScramblerError::from)
        .context("Failed to load source metadata")?;

    let report = ProbeReport::new(metadata, config.fps);
    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .context("Failed to serialize probe report to JSON")?;
        println!("{}", json);
    } else {
        display_probe_report(&report, config.frame_buffer_limit_bytes);
    }

    info!("Probe operation completed successfully");
    Ok(())
}

fn ensure_input_exists(path: &Path) -> Result<(), ScramblerError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ScramblerError::InputFileNotFound {
            path: path.display().to_string(),
        })
    }
}

/// Display a probe report in human-readable format
fn display_probe_report(report: &ProbeReport, buffer_limit: Option<u64>) {
    let metadata = &report.metadata;
    println!("Source Information");
    println!("==================");
    println!("Duration: {} ({:.3}s)", format_seconds(metadata.duration), metadata.duration);
    println!("Dimensions: {}x{}", metadata.geometry.width, metadata.geometry.height);
    println!("Container: {}", metadata.container);
    println!("Mime Type: {}", metadata.mime_type);
    println!();
    println!("Frames @ {} fps: {}", report.fps, report.total_frames);
    println!(
        "Raw Frame Buffer: {}",
        Utils::format_file_size(report.estimated_buffer_bytes)
    );
    if let Some(limit) = buffer_limit {
        let verdict = if report.estimated_buffer_bytes > limit { "exceeds" } else { "within" };
        println!("Buffer Limit: {} ({})", Utils::format_file_size(limit), verdict);
    }
}

/// Display a finished job in human-readable format
fn display_outcome(outcome: &ScrambleOutcome, output: Option<&Path>) {
    println!("Scramble Results");
    println!("================");
    if let Some(path) = output {
        println!("Output: {}", path.display());
    }
    println!("Format: {}", outcome.artifact.mime_type());
    println!("Size: {}", Utils::format_file_size(outcome.artifact.len() as u64));
    println!(
        "Chunks: {} (nominal {} frames)",
        outcome.timing.len(),
        outcome.nominal_chunk_frames
    );
    println!(
        "Frames: {} extracted, {} painted, {} dropped, {} encoded",
        outcome.frames_extracted,
        outcome.frames_painted,
        outcome.frames_dropped,
        outcome.output_frames
    );
    println!(
        "Duration: {}",
        format_seconds(outcome.timing.total_duration_ms() / 1000.0)
    );

    match &outcome.upload {
        Some(Ok(asset)) => {
            println!();
            println!("Asset: {}", asset.asset_id);
            println!("Playback: {}", asset.playback_id);
        }
        Some(Err(e)) => {
            println!();
            println!("Upload: failed ({})", e);
        }
        None => {}
    }
}
