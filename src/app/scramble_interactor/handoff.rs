// Upload handoff - Delivers a finished artifact to the upload service

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::DomainError;
use crate::domain::model::EncodedArtifact;
use crate::engine::progress::{ProgressPhase, ProgressReporter};
use crate::ports::{UploadPort, UploadStatus};

/// How long to wait for the service to turn an upload into an asset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

/// Identifiers of the ingested asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub upload_id: String,
    pub asset_id: String,
    pub playback_id: String,
    pub duration: Option<f64>,
    pub status: String,
}

pub struct UploadHandoff<'a> {
    port: &'a dyn UploadPort,
    policy: UploadPolicy,
    progress: &'a ProgressReporter,
    cancel: &'a CancellationToken,
}

impl<'a> UploadHandoff<'a> {
    pub fn new(
        port: &'a dyn UploadPort,
        policy: UploadPolicy,
        progress: &'a ProgressReporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            port,
            policy,
            progress,
            cancel,
        }
    }

    /// Create an upload, transfer the bytes and wait for a playable asset
    pub async fn deliver(&self, artifact: &EncodedArtifact) -> Result<UploadedAsset, DomainError> {
        let target = self.port.create_upload().await?;
        self.progress.report(ProgressPhase::Upload, 0.2, Some("upload created".to_string()));

        self.port.transfer(&target, artifact).await?;
        self.progress.report(ProgressPhase::Upload, 0.4, Some("artifact transferred".to_string()));
        info!(upload_id = %target.upload_id, "Artifact transferred, waiting for processing");

        let asset_id = self.wait_for_asset(&target.upload_id).await?;
        let asset = self.port.asset(&asset_id).await?;
        let playback_id = asset.playback_id.ok_or_else(|| {
            DomainError::UploadFailure(format!("asset {} has no playback id", asset.asset_id))
        })?;

        self.progress.finish_phase(ProgressPhase::Upload);
        info!(asset_id = %asset.asset_id, playback_id = %playback_id, "Asset ready");
        Ok(UploadedAsset {
            upload_id: target.upload_id,
            asset_id: asset.asset_id,
            playback_id,
            duration: asset.duration,
            status: asset.status,
        })
    }

    /// Poll after each interval; errors count as attempts
    async fn wait_for_asset(&self, upload_id: &str) -> Result<String, DomainError> {
        let max_attempts = self.policy.max_attempts;
        for attempt in 1..=max_attempts {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(DomainError::Cancelled("cancelled while awaiting upload".to_string()));
                }
                _ = tokio::time::sleep(self.policy.poll_interval) => {}
            }

            match self.port.poll(upload_id).await {
                Ok(UploadStatus::AssetCreated { asset_id }) => return Ok(asset_id),
                Ok(UploadStatus::Errored(message)) => {
                    return Err(DomainError::UploadFailure(message));
                }
                Ok(UploadStatus::Waiting) => debug!(attempt, "Upload still processing"),
                Err(e) => warn!(attempt, "Error polling upload status: {}", e),
            }

            let fraction = 0.4 + 0.5 * attempt as f64 / max_attempts.max(1) as f64;
            self.progress.report(ProgressPhase::Upload, fraction, None);
        }

        Err(DomainError::UploadTimeout {
            upload_id: upload_id.to_string(),
            attempts: max_attempts,
        })
    }
}
