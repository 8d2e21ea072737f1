// Upload Mux adapter - Direct uploads to the Mux video API

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::domain::errors::DomainError;
use crate::domain::model::EncodedArtifact;
use crate::ports::{AssetInfo, UploadPort, UploadStatus, UploadTarget};

pub const DEFAULT_API_BASE: &str = "https://api.mux.com";
pub const TOKEN_ID_ENV: &str = "MUX_TOKEN_ID";
pub const TOKEN_SECRET_ENV: &str = "MUX_TOKEN_SECRET";

/// API credentials, read from the environment only
#[derive(Clone)]
pub struct MuxCredentials {
    pub token_id: String,
    pub token_secret: String,
}

impl MuxCredentials {
    pub fn from_env() -> Result<Self, DomainError> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DomainError::UploadFailure(format!("{} is not set", name)))
        };
        Ok(Self {
            token_id: read(TOKEN_ID_ENV)?,
            token_secret: read(TOKEN_SECRET_ENV)?,
        })
    }
}

impl std::fmt::Debug for MuxCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxCredentials")
            .field("token_id", &self.token_id)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    error: Option<UploadError>,
}

#[derive(Debug, Deserialize)]
struct UploadError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetData {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    playback_ids: Vec<PlaybackId>,
}

#[derive(Debug, Deserialize)]
struct PlaybackId {
    id: String,
}

/// Mux direct-upload client
pub struct MuxUploadAdapter {
    client: reqwest::Client,
    credentials: MuxCredentials,
    api_base: String,
}

impl MuxUploadAdapter {
    pub fn new(credentials: MuxCredentials, api_base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            credentials,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build from `MUX_TOKEN_ID`/`MUX_TOKEN_SECRET`
    pub fn from_env(api_base: impl Into<String>) -> Result<Self, DomainError> {
        Ok(Self::new(MuxCredentials::from_env()?, api_base))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/video/v1/{}", self.api_base, path)
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, DomainError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .get(self.endpoint(path))
            .basic_auth(&self.credentials.token_id, Some(&self.credentials.token_secret))
            .send()
            .await
            .map_err(|e| DomainError::UploadFailure(format!("GET {} failed: {}", path, e)))?;
        Self::decode(path, response).await
    }

    async fn decode<T>(path: &str, response: reqwest::Response) -> Result<T, DomainError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::UploadFailure(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| DomainError::UploadFailure(format!("unexpected response from {}: {}", path, e)))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl UploadPort for MuxUploadAdapter {
    async fn create_upload(&self) -> Result<UploadTarget, DomainError> {
        let body = json!({
            "cors_origin": "*",
            "new_asset_settings": {
                "playback_policy": ["public"],
                "encoding_tier": "baseline",
            },
        });

        let response = self
            .client
            .post(self.endpoint("uploads"))
            .basic_auth(&self.credentials.token_id, Some(&self.credentials.token_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::UploadFailure(format!("create upload failed: {}", e)))?;
        let data: UploadData = Self::decode("uploads", response).await?;

        let url = data
            .url
            .ok_or_else(|| DomainError::UploadFailure("upload has no destination url".to_string()))?;
        info!(upload_id = %data.id, "Created upload");
        Ok(UploadTarget {
            upload_id: data.id,
            url,
        })
    }

    async fn transfer(
        &self,
        target: &UploadTarget,
        artifact: &EncodedArtifact,
    ) -> Result<(), DomainError> {
        let response = self
            .client
            .put(&target.url)
            .header(reqwest::header::CONTENT_TYPE, artifact.mime_type())
            .body(artifact.bytes().to_vec())
            .send()
            .await
            .map_err(|e| DomainError::UploadFailure(format!("transfer failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DomainError::UploadFailure(format!(
                "transfer rejected with {}",
                response.status()
            )));
        }
        debug!(upload_id = %target.upload_id, bytes = artifact.len(), "Transferred artifact");
        Ok(())
    }

    async fn poll(&self, upload_id: &str) -> Result<UploadStatus, DomainError> {
        let data: UploadData = self.get_json(&format!("uploads/{}", upload_id)).await?;
        debug!(upload_id, status = ?data.status, "Polled upload");

        if let Some(asset_id) = data.asset_id {
            return Ok(UploadStatus::AssetCreated { asset_id });
        }
        let status = data.status.unwrap_or_default();
        match status.as_str() {
            "errored" | "cancelled" | "timed_out" => {
                let message = data
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| format!("upload {}", status));
                Ok(UploadStatus::Errored(message))
            }
            _ => Ok(UploadStatus::Waiting),
        }
    }

    async fn asset(&self, asset_id: &str) -> Result<AssetInfo, DomainError> {
        let data: AssetData = self.get_json(&format!("assets/{}", asset_id)).await?;
        Ok(AssetInfo {
            asset_id: data.id,
            playback_id: data.playback_ids.into_iter().next().map(|p| p.id),
            duration: data.duration,
            status: data.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_envelope_parses_asset_id() {
        let body = r#"{"data":{"id":"up1","status":"asset_created","asset_id":"as9","url":"https://x"}}"#;
        let envelope: Envelope<UploadData> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.asset_id.as_deref(), Some("as9"));
    }

    #[test]
    fn test_asset_envelope_takes_playback_ids() {
        let body = r#"{"data":{"id":"as9","status":"ready","duration":10.0,"playback_ids":[{"id":"pb1","policy":"public"}]}}"#;
        let envelope: Envelope<AssetData> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.playback_ids[0].id, "pb1");
        assert_eq!(envelope.data.duration, Some(10.0));
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let credentials = MuxCredentials {
            token_id: "id".to_string(),
            token_secret: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", credentials).contains("hunter2"));
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let adapter = MuxUploadAdapter::new(
            MuxCredentials {
                token_id: "id".to_string(),
                token_secret: "secret".to_string(),
            },
            "http://localhost:9/",
        );
        assert_eq!(adapter.endpoint("uploads"), "http://localhost:9/video/v1/uploads");
    }
}
