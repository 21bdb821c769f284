//! Image generation tool
//!
//! Steps:
//! 1. Build the model client and make sure the scratch directory exists
//! 2. Send the prompt (one round trip)
//! 3. Buffer the returned image under the scratch directory (best effort)
//! 4. Save the image as a session artifact for `SaveImageTool`

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{ToolContext, PNG_MIME};
use crate::artifacts::ArtifactError;
use crate::gemini::{ContentPart, ModelConnector, ModelError};

/// Tool arguments
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateImageInput {
    pub prompt: String,
    pub filename: String,
}

/// Outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GenerateImageStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failed to create genai client")]
    FailedCreateClient,
    #[serde(rename = "failed to generate image")]
    FailedGenerate,
    #[serde(rename = "failed to create tmp directory")]
    FailedCreateDir,
    #[serde(rename = "failed to save artifact")]
    FailedSaveArtifact,
}

/// Tool result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerateImageResult {
    pub filename: String,
    pub status: GenerateImageStatus,
}

impl GenerateImageResult {
    pub fn success(filename: String) -> Self {
        Self {
            filename,
            status: GenerateImageStatus::Success,
        }
    }

    /// Failures never report a filename
    pub fn failed(status: GenerateImageStatus) -> Self {
        Self {
            filename: String::new(),
            status,
        }
    }
}

/// Generation failures
#[derive(Debug, Error)]
pub enum GenerateImageError {
    #[error("failed to create genai client: {0}")]
    CreateClient(#[source] ModelError),

    #[error("failed to generate image: {0}")]
    Generate(#[source] ModelError),

    #[error("model returned no image data")]
    NoImage,

    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to save artifact: {0}")]
    SaveArtifact(#[source] ArtifactError),
}

impl GenerateImageError {
    pub fn status(&self) -> GenerateImageStatus {
        match self {
            GenerateImageError::CreateClient(_) => GenerateImageStatus::FailedCreateClient,
            GenerateImageError::Generate(_) | GenerateImageError::NoImage => {
                GenerateImageStatus::FailedGenerate
            }
            GenerateImageError::CreateDir { .. } => GenerateImageStatus::FailedCreateDir,
            GenerateImageError::SaveArtifact(_) => GenerateImageStatus::FailedSaveArtifact,
        }
    }
}

/// True when `filename` is one plain path segment
fn is_plain_segment(filename: &str) -> bool {
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Generates images and stores them as artifacts
pub struct GenerateImageTool {
    models: Arc<dyn ModelConnector>,
    output_dir: PathBuf,
}

impl GenerateImageTool {
    pub const NAME: &'static str = "GenerateImageTool";

    pub fn new(models: Arc<dyn ModelConnector>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            models,
            output_dir: output_dir.into(),
        }
    }

    pub async fn run(
        &self,
        ctx: &ToolContext,
        input: GenerateImageInput,
    ) -> Result<GenerateImageResult, GenerateImageError> {
        let model = self
            .models
            .connect()
            .map_err(GenerateImageError::CreateClient)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| GenerateImageError::CreateDir {
                path: self.output_dir.clone(),
                source,
            })?;

        info!("Generating image {}", input.filename);
        let parts = model
            .generate_content(&input.prompt)
            .await
            .map_err(GenerateImageError::Generate)?;

        let mut image: Option<(Vec<u8>, String)> = None;
        for part in parts {
            match part {
                ContentPart::Text(text) => debug!("Model text: {}", text),
                ContentPart::InlineData { mime_type, data } => {
                    self.buffer_locally(&input.filename, &data).await;
                    image = Some((data, mime_type));
                }
            }
        }

        let (data, mime_type) = image.ok_or(GenerateImageError::NoImage)?;
        let mime_type = if mime_type.is_empty() {
            PNG_MIME.to_string()
        } else {
            mime_type
        };

        let version = ctx
            .artifacts
            .save(&input.filename, Bytes::from(data), &mime_type)
            .await
            .map_err(GenerateImageError::SaveArtifact)?;

        info!("Saved artifact {} v{}", input.filename, version);
        Ok(GenerateImageResult::success(input.filename))
    }

    /// Write a diagnostic copy under the scratch directory; failures only warn
    async fn buffer_locally(&self, filename: &str, data: &[u8]) {
        if !is_plain_segment(filename) {
            warn!("Not buffering {:?}: not a plain file name", filename);
            return;
        }

        let path = self.output_dir.join(filename);
        if let Err(e) = tokio::fs::write(&path, data).await {
            warn!("Failed to buffer image at {}: {}", path.display(), e);
        }
    }
}
