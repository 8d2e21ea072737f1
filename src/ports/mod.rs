// Ports - Host capabilities the scrambling pipeline depends on

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::*;
use crate::domain::model::*;

/// Port for decoding the source video one positioned frame at a time.
///
/// The source exposes a single playhead: `seek` must complete before
/// `capture` is called, and positioning requests are never issued in
/// parallel.
#[async_trait]
pub trait FrameSource: Send {
    /// Load duration and dimensions; fails with `LoadError` when unavailable
    async fn load_metadata(&mut self) -> Result<SourceMetadata, DomainError>;

    /// Move the playhead to `target_seconds`
    async fn seek(&mut self, target_seconds: f64) -> Result<(), DomainError>;

    /// Snapshot the picture under the playhead as frame `index`
    fn capture(&mut self, index: u64, timestamp: f64) -> Result<Frame, DomainError>;

    /// Release decoder state and any temporary media handles
    async fn release(&mut self);
}

/// Port for the platform encoder
#[async_trait]
pub trait EncoderBackend: Send + Sync {
    /// Whether the host can encode this codec/container pair
    fn is_supported(&self, candidate: &CodecCandidate) -> bool;

    /// Start capturing a render surface of `geometry` at `fps`
    async fn start(
        &self,
        candidate: &CodecCandidate,
        geometry: FrameGeometry,
        fps: u32,
        bitrate: u64,
    ) -> Result<Box<dyn EncoderSession>, DomainError>;
}

/// A started encoder bound to its render surface
#[async_trait]
pub trait EncoderSession: Send {
    /// Paint `frame` onto the surface at output slot `slot`
    fn paint(&mut self, frame: &Frame, slot: u64) -> Result<(), DomainError>;

    /// Stop capturing and wait for the final flush; returns the output segments in order
    async fn finish(self: Box<Self>) -> Result<Vec<Vec<u8>>, DomainError>;

    /// Stop capturing and discard everything produced so far
    async fn abort(self: Box<Self>);
}

/// Destination issued by the upload collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub upload_id: String,
    pub url: String,
}

/// State of an upload as reported by the collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum UploadStatus {
    /// Still being ingested
    Waiting,
    /// Asset created from the upload
    AssetCreated { asset_id: String },
    /// Collaborator reported a processing error
    Errored(String),
}

/// Processed asset as returned by the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub asset_id: String,
    pub playback_id: Option<String>,
    pub duration: Option<f64>,
    pub status: String,
}

/// Port for the hosted asset-upload service
#[async_trait]
pub trait UploadPort: Send + Sync {
    /// Create an upload target with an opaque handle and destination URL
    async fn create_upload(&self) -> Result<UploadTarget, DomainError>;

    /// Transfer the artifact bytes to the target URL
    async fn transfer(
        &self,
        target: &UploadTarget,
        artifact: &EncodedArtifact,
    ) -> Result<(), DomainError>;

    /// Check whether the upload has become an asset
    async fn poll(&self, upload_id: &str) -> Result<UploadStatus, DomainError>;

    /// Fetch asset details including its playback identifier
    async fn asset(&self, asset_id: &str) -> Result<AssetInfo, DomainError>;
}
