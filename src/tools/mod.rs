//! Agent tools
//!
//! The agent runtime can call two tools:
//! - `GenerateImageTool`: prompt -> image artifact
//! - `SaveImageTool`: image artifact -> object in the bucket
//!
//! Tools form a closed set registered by name in a `ToolRegistry`.

mod generate;
mod save;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::artifacts::ArtifactStore;

pub use generate::{
    GenerateImageError, GenerateImageInput, GenerateImageResult, GenerateImageStatus,
    GenerateImageTool,
};
pub use save::{
    storage_key, SaveImageError, SaveImageInput, SaveImageResult, SaveImageStatus, SaveImageTool,
    PNG_MIME,
};

/// Tool invocation errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode result: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Per-invocation context
#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub artifacts: Arc<dyn ArtifactStore>,
}

impl ToolContext {
    pub fn new(session_id: impl Into<String>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            session_id: session_id.into(),
            artifacts,
        }
    }
}

/// Structured tool response
///
/// `output` is always the tool's result record; `error` carries the
/// underlying error when the tool failed.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub output: Value,
    pub error: Option<String>,
}

impl ToolResponse {
    fn from_outcome<T, E>(
        tool: &'static str,
        outcome: Result<T, E>,
        failed: impl FnOnce(&E) -> T,
    ) -> Result<Self, ToolError>
    where
        T: Serialize,
        E: std::error::Error,
    {
        match outcome {
            Ok(result) => Ok(Self {
                output: serde_json::to_value(result).map_err(ToolError::Encode)?,
                error: None,
            }),
            Err(err) => {
                warn!("{} failed: {}", tool, err);
                Ok(Self {
                    output: serde_json::to_value(failed(&err)).map_err(ToolError::Encode)?,
                    error: Some(err.to_string()),
                })
            }
        }
    }
}

/// Tool declaration advertised to the agent runtime
#[derive(Debug, Clone, Serialize)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// The tools this service provides
pub enum Tool {
    GenerateImage(GenerateImageTool),
    SaveImage(SaveImageTool),
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::GenerateImage(_) => GenerateImageTool::NAME,
            Tool::SaveImage(_) => SaveImageTool::NAME,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::GenerateImage(_) => {
                "Generates an LGTM image based on the provided prompt and saves it as an artifact."
            }
            Tool::SaveImage(_) => {
                "Saves the generated LGTM image artifact to the image bucket."
            }
        }
    }

    /// JSON schema of the tool's arguments
    pub fn parameters(&self) -> Value {
        match self {
            Tool::GenerateImage(_) => serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": {"type": "string", "description": "Description of the image to generate"},
                    "filename": {"type": "string", "description": "Artifact name for the generated image"}
                },
                "required": ["prompt", "filename"]
            }),
            Tool::SaveImage(_) => serde_json::json!({
                "type": "object",
                "properties": {
                    "filename": {"type": "string", "description": "Artifact name of the image to save"}
                },
                "required": ["filename"]
            }),
        }
    }

    pub fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name(),
            description: self.description(),
            parameters: self.parameters(),
        }
    }

    /// Decode `args` and run the tool
    pub async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<ToolResponse, ToolError> {
        let name = self.name();
        info!(tool = name, session = %ctx.session_id, "invoking tool");

        match self {
            Tool::GenerateImage(tool) => {
                let input: GenerateImageInput = serde_json::from_value(args)
                    .map_err(|source| ToolError::InvalidArguments { tool: name, source })?;
                ToolResponse::from_outcome(name, tool.run(ctx, input).await, |err| {
                    GenerateImageResult::failed(err.status())
                })
            }
            Tool::SaveImage(tool) => {
                let input: SaveImageInput = serde_json::from_value(args)
                    .map_err(|source| ToolError::InvalidArguments { tool: name, source })?;
                ToolResponse::from_outcome(name, tool.run(ctx, input).await, |err| {
                    SaveImageResult::failed(err.status())
                })
            }
        }
    }
}

/// Tools keyed by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Tool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding both image tools
    pub fn with_image_tools(generate: GenerateImageTool, save: SaveImageTool) -> Self {
        let mut registry = Self::new();
        registry.register(Tool::GenerateImage(generate));
        registry.register(Tool::SaveImage(save));
        registry
    }

    pub fn register(&mut self, tool: Tool) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.values().map(Tool::declaration).collect()
    }

    /// Look up `name` and invoke it
    pub async fn invoke(
        &self,
        name: &str,
        ctx: &ToolContext,
        args: Value,
    ) -> Result<ToolResponse, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.invoke(ctx, args).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles for the model and storage seams

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;

    use crate::gemini::{ContentPart, ImageModel, ModelConnector, ModelError};
    use crate::storage::{ObjectStore, StorageError, StoreConnector, StoredObject};

    use super::*;

    /// Model returning canned parts, or failing
    pub struct FakeModel {
        pub parts: Vec<ContentPart>,
        pub fail: bool,
        pub calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ImageModel for FakeModel {
        async fn generate_content(&self, _prompt: &str) -> Result<Vec<ContentPart>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ModelError::EmptyResponse);
            }
            Ok(self.parts.clone())
        }
    }

    /// Connector handing out a `FakeModel`, or failing to connect
    pub struct FakeModels {
        pub parts: Vec<ContentPart>,
        pub fail_connect: bool,
        pub fail_generate: bool,
        /// Number of `generate_content` calls across all handed-out models
        pub generate_calls: Arc<AtomicUsize>,
    }

    impl FakeModels {
        pub fn image(data: &[u8]) -> Self {
            Self {
                parts: vec![
                    ContentPart::Text("here you go".to_string()),
                    ContentPart::InlineData {
                        mime_type: "image/png".to_string(),
                        data: data.to_vec(),
                    },
                ],
                fail_connect: false,
                fail_generate: false,
                generate_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ModelConnector for FakeModels {
        fn connect(&self) -> Result<Arc<dyn ImageModel>, ModelError> {
            if self.fail_connect {
                return Err(ModelError::NotConfigured);
            }
            Ok(Arc::new(FakeModel {
                parts: self.parts.clone(),
                fail: self.fail_generate,
                calls: self.generate_calls.clone(),
            }))
        }
    }

    /// Recording object store
    #[derive(Default)]
    pub struct FakeStore {
        pub puts: Mutex<Vec<(String, Bytes, String)>>,
        pub fail_put: bool,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn put(
            &self,
            key: &str,
            data: Bytes,
            content_type: &str,
        ) -> Result<String, StorageError> {
            if self.fail_put {
                return Err(StorageError::NotConfigured);
            }
            self.puts
                .lock()
                .push((key.to_string(), data, content_type.to_string()));
            Ok(key.to_string())
        }

        async fn list(
            &self,
            _prefix: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<StoredObject>, StorageError> {
            Ok(Vec::new())
        }
    }

    /// Connector counting connects, optionally failing
    #[derive(Default)]
    pub struct FakeStores {
        pub store: Arc<FakeStore>,
        pub fail_connect: bool,
        pub connects: AtomicUsize,
    }

    impl StoreConnector for FakeStores {
        fn connect(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_connect {
                return Err(StorageError::NotConfigured);
            }
            Ok(self.store.clone())
        }
    }
}
