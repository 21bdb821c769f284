//! Gemini generative-model integration
//!
//! Provides:
//! - REST client for `models/{model}:generateContent`
//! - Decoding of returned content parts (text and inline binary data)
//! - The `ImageModel` seam the image generation tool is written against

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Model client errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Gemini API key not configured")]
    NotConfigured,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {status}")]
    Api { status: reqwest::StatusCode, body: String },

    #[error("invalid inline data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("no candidates in response")]
    EmptyResponse,
}

/// One part of a model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    InlineData { mime_type: String, data: Vec<u8> },
}

/// A generative model that turns a prompt into content parts
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate_content(&self, prompt: &str) -> Result<Vec<ContentPart>, ModelError>;
}

/// Builds a model client on demand
///
/// Construction is per call so a missing key surfaces as a tool failure
/// rather than a startup failure.
pub trait ModelConnector: Send + Sync {
    fn connect(&self) -> Result<Arc<dyn ImageModel>, ModelError>;
}

/// Gemini client settings
#[derive(Clone)]
pub struct GeminiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ModelConnector for GeminiSettings {
    fn connect(&self) -> Result<Arc<dyn ImageModel>, ModelError> {
        Ok(Arc::new(GeminiClient::new(self.clone())?))
    }
}

/// generateContent request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

/// generateContent response body
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

impl GenerateResponse {
    /// Decode the parts of the first candidate
    fn into_parts(self) -> Result<Vec<ContentPart>, ModelError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyResponse)?;

        let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
        let mut decoded = Vec::with_capacity(parts.len());
        for part in parts {
            if let Some(inline) = part.inline_data {
                decoded.push(ContentPart::InlineData {
                    mime_type: inline.mime_type,
                    data: BASE64.decode(inline.data.as_bytes())?,
                });
            } else if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                decoded.push(ContentPart::Text(text));
            }
        }
        Ok(decoded)
    }
}

/// Gemini REST client
#[derive(Debug)]
pub struct GeminiClient {
    client: Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    /// Create a new client, failing when no API key is configured
    pub fn new(settings: GeminiSettings) -> Result<Self, ModelError> {
        if settings.api_key.is_empty() {
            return Err(ModelError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(ModelError::Client)?;

        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait]
impl ImageModel for GeminiClient {
    async fn generate_content(&self, prompt: &str) -> Result<Vec<ContentPart>, ModelError> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            },
        };

        debug!("Sending generateContent request for model {}", self.settings.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini API error: {} - {}", status, body);
            return Err(ModelError::Api { status, body });
        }

        let body: GenerateResponse = response.json().await?;
        body.into_parts()
    }
}
