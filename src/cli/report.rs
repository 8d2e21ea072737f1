//! Timeline sidecar written next to a scrambled video

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::{ScrambleOutcome, UploadedAsset};
use crate::cli::args::MetadataFormat;
use crate::error::{ScramblerError, ScramblerResult};

/// One shuffled chunk as it appears in the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineShot {
    pub title: String,
    /// Index of the chunk before shuffling
    pub source_index: usize,
    pub duration_ms: f64,
    /// Where the shot starts in the output; also its thumbnail time
    pub start_offset_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub fps: u32,
    pub nominal_chunk_frames: usize,
    pub variance_frames: u32,
    pub chunk_count: usize,
    pub frames_painted: u64,
    pub frames_dropped: u64,
    pub output_frames: u64,
    pub mime_type: String,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDocument {
    pub summary: TimelineSummary,
    pub shots: Vec<TimelineShot>,
}

impl TimelineDocument {
    pub fn from_outcome(outcome: &ScrambleOutcome, fps: u32, variance_frames: u32) -> Self {
        let uploaded: Option<&UploadedAsset> =
            outcome.upload.as_ref().and_then(|result| result.as_ref().ok());

        let shots = outcome
            .timing
            .entries
            .iter()
            .enumerate()
            .map(|(k, entry)| TimelineShot {
                title: format!("Scrambled Shot {}", k + 1),
                source_index: entry.source_index,
                duration_ms: entry.duration_ms,
                start_offset_seconds: entry.start_offset_seconds,
            })
            .collect();

        Self {
            summary: TimelineSummary {
                fps,
                nominal_chunk_frames: outcome.nominal_chunk_frames,
                variance_frames,
                chunk_count: outcome.timing.len(),
                frames_painted: outcome.frames_painted,
                frames_dropped: outcome.frames_dropped,
                output_frames: outcome.output_frames,
                mime_type: outcome.artifact.mime_type().to_string(),
                size_bytes: outcome.artifact.len(),
                created_at: Utc::now(),
                asset_id: uploaded.map(|asset| asset.asset_id.clone()),
                playback_id: uploaded.map(|asset| asset.playback_id.clone()),
            },
            shots,
        }
    }

    pub fn render(&self, format: MetadataFormat) -> ScramblerResult<String> {
        Ok(match format {
            MetadataFormat::Json => serde_json::to_string_pretty(self)?,
            MetadataFormat::Yaml => serde_yaml::to_string(self)?,
        })
    }

    pub fn write(&self, path: &Path, format: MetadataFormat) -> ScramblerResult<()> {
        let content = self.render(format)?;
        std::fs::write(path, content).map_err(|source| ScramblerError::OutputError {
            path: path.display().to_string(),
            source,
        })
    }
}

/// `clip.mp4` becomes `clip.timeline.json`
pub fn default_timeline_path(output: &Path, format: MetadataFormat) -> PathBuf {
    output.with_extension(format!("timeline.{}", format.extension()))
}

/// `holiday.mov` becomes `holiday_scrambled.<extension>` in the same directory
pub fn default_output_path(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_scrambled.{}", stem, extension))
}
