//! Image persistence tool
//!
//! Moves a generated image artifact into the bucket under a unique key.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use super::ToolContext;
use crate::artifacts::ArtifactError;
use crate::storage::{StorageError, StorageSettings, StoreConnector};

/// Content type of every persisted image
pub const PNG_MIME: &str = "image/png";

/// Tool arguments
#[derive(Debug, Clone, Deserialize)]
pub struct SaveImageInput {
    pub filename: String,
}

/// Outcome status, rendered as the string the agent sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveImageStatus {
    Success { key: String },
    FailedLoadArtifact,
    FailedEmptyData,
    FailedCreateClient,
    FailedUpload,
}

impl fmt::Display for SaveImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveImageStatus::Success { key } => write!(f, "success: uploaded as {}", key),
            SaveImageStatus::FailedLoadArtifact => f.write_str("failed to load artifact"),
            SaveImageStatus::FailedEmptyData => f.write_str("artifact has no inline data"),
            SaveImageStatus::FailedCreateClient => f.write_str("failed to create S3 client"),
            SaveImageStatus::FailedUpload => f.write_str("failed to upload image to S3"),
        }
    }
}

impl Serialize for SaveImageStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Tool result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveImageResult {
    pub status: SaveImageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SaveImageResult {
    pub fn uploaded(key: String, url: String) -> Self {
        Self {
            status: SaveImageStatus::Success { key: key.clone() },
            key: Some(key),
            url: Some(url),
        }
    }

    pub fn failed(status: SaveImageStatus) -> Self {
        Self {
            status,
            key: None,
            url: None,
        }
    }
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum SaveImageError {
    #[error("failed to load artifact: {0}")]
    LoadArtifact(#[source] ArtifactError),

    #[error("artifact {0:?} has no inline data")]
    EmptyData(String),

    #[error("failed to create S3 client: {0}")]
    CreateClient(#[source] StorageError),

    #[error("failed to upload {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },
}

impl SaveImageError {
    pub fn status(&self) -> SaveImageStatus {
        match self {
            SaveImageError::LoadArtifact(_) => SaveImageStatus::FailedLoadArtifact,
            SaveImageError::EmptyData(_) => SaveImageStatus::FailedEmptyData,
            SaveImageError::CreateClient(_) => SaveImageStatus::FailedCreateClient,
            SaveImageError::Upload { .. } => SaveImageStatus::FailedUpload,
        }
    }
}

/// Ensure a `.png` suffix
fn normalize_filename(filename: &str) -> String {
    if filename.ends_with(".png") {
        filename.to_string()
    } else {
        format!("{}.png", filename)
    }
}

/// Bucket key for `filename`: `<uuid>-<filename>.png`
pub fn storage_key(filename: &str) -> String {
    format!("{}-{}", Uuid::new_v4(), normalize_filename(filename))
}

/// Uploads image artifacts to the bucket
pub struct SaveImageTool {
    storage: Arc<dyn StoreConnector>,
    settings: StorageSettings,
}

impl SaveImageTool {
    pub const NAME: &'static str = "SaveImageTool";

    pub fn new(storage: Arc<dyn StoreConnector>, settings: &StorageSettings) -> Self {
        Self {
            storage,
            settings: settings.clone(),
        }
    }

    /// Load the artifact, then upload it under a fresh key
    ///
    /// An empty artifact aborts before any storage client is built.
    pub async fn run(
        &self,
        ctx: &ToolContext,
        input: SaveImageInput,
    ) -> Result<SaveImageResult, SaveImageError> {
        let artifact = ctx
            .artifacts
            .load(&input.filename)
            .await
            .map_err(SaveImageError::LoadArtifact)?;

        if artifact.data.is_empty() {
            return Err(SaveImageError::EmptyData(input.filename));
        }

        let key = storage_key(&input.filename);
        let store = self
            .storage
            .connect()
            .map_err(SaveImageError::CreateClient)?;

        let key = store
            .put(&key, artifact.data, PNG_MIME)
            .await
            .map_err(|source| SaveImageError::Upload {
                key: key.clone(),
                source,
            })?;

        info!("Uploaded image {} as {}", input.filename, key);
        let url = self.settings.public_url_for(&key);
        Ok(SaveImageResult::uploaded(key, url))
    }
}
