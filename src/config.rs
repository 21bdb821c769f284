//! Server configuration
//!
//! Loaded once at startup from defaults, an optional TOML file and the
//! process environment. Components receive the pieces they need
//! (`GeminiSettings`, `StorageSettings`) at construction time.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use thiserror::Error;

use crate::gemini::GeminiSettings;
use crate::storage::StorageSettings;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "lgtm-agent.toml";

/// Endpoint used in local mode when no object store endpoint is set
pub const LOCAL_STORAGE_ENDPOINT: &str = "http://minio:9000";

/// Environment variables recognized by the loader
const ENV_KEYS: &[&str] = &[
    "env",
    "port",
    "allowed_origins",
    "gemini_api_key",
    "gemini_model",
    "gemini_image_model",
    "gemini_api_url",
    "cloudflare_r2_account_id",
    "cloudflare_r2_accesskey",
    "cloudflare_r2_secretkey",
    "cloudflare_r2_bucket_name",
    "cloudflare_r2_endpoint",
    "cloudflare_r2_public_url",
    "cloudflare_r2_region",
    "agent_runtime_url",
    "tools_token",
    "artifact_ttl_secs",
    "artifact_max_sessions",
    "output_dir",
    "request_timeout_secs",
    "shutdown_grace_secs",
];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Developer machine or docker-compose stack
    #[default]
    Local,
    /// Production deployment
    Prod,
}

impl Environment {
    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

/// Server configuration
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub env: Environment,
    pub port: u16,
    /// Comma-separated list of CORS origins, `*` allows any
    pub allowed_origins: String,

    pub gemini_api_key: String,
    /// Model the agent runtime reasons with
    pub gemini_model: String,
    /// Model used by the image generation tool
    pub gemini_image_model: String,
    pub gemini_api_url: String,

    pub cloudflare_r2_account_id: String,
    pub cloudflare_r2_accesskey: String,
    pub cloudflare_r2_secretkey: String,
    pub cloudflare_r2_bucket_name: String,
    pub cloudflare_r2_endpoint: String,
    pub cloudflare_r2_public_url: String,
    pub cloudflare_r2_region: String,

    /// Base URL of the external agent runtime serving `/v1/agent/*`
    pub agent_runtime_url: Option<String>,
    /// Bearer token the agent runtime must present on tool calls
    pub tools_token: Option<String>,
    /// Idle time after which a session's artifacts are dropped
    pub artifact_ttl_secs: u64,
    pub artifact_max_sessions: usize,
    /// Scratch directory for locally buffered images
    pub output_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: Environment::Local,
            port: 8080,
            allowed_origins: "*".to_string(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_image_model: "gemini-2.5-flash-image".to_string(),
            gemini_api_url: "https://generativelanguage.googleapis.com".to_string(),
            cloudflare_r2_account_id: String::new(),
            cloudflare_r2_accesskey: String::new(),
            cloudflare_r2_secretkey: String::new(),
            cloudflare_r2_bucket_name: String::new(),
            cloudflare_r2_endpoint: String::new(),
            cloudflare_r2_public_url: "http://localhost:9001".to_string(),
            cloudflare_r2_region: "auto".to_string(),
            agent_runtime_url: None,
            tools_token: None,
            artifact_ttl_secs: 3600,
            artifact_max_sessions: 1024,
            output_dir: PathBuf::from("tmp"),
            request_timeout_secs: 60,
            shutdown_grace_secs: 60,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("env", &self.env)
            .field("port", &self.port)
            .field("allowed_origins", &self.allowed_origins)
            .field("gemini_model", &self.gemini_model)
            .field("gemini_image_model", &self.gemini_image_model)
            .field("bucket", &self.cloudflare_r2_bucket_name)
            .field("endpoint", &self.cloudflare_r2_endpoint)
            .field("agent_runtime_url", &self.agent_runtime_url)
            .field("tools_token", &self.tools_token.as_ref().map(|_| "<redacted>"))
            .field("artifact_ttl_secs", &self.artifact_ttl_secs)
            .field("artifact_max_sessions", &self.artifact_max_sessions)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Layered figment: defaults, TOML file, then environment
    pub fn figment(file: Option<&Path>) -> Figment {
        let file = file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::new()
            .merge(Toml::file(file))
            .merge(Env::raw().only(ENV_KEYS))
    }

    /// Load and validate configuration
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Config = Self::figment(file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.shutdown_grace_secs == 0 {
            return Err(ConfigError::Invalid(
                "shutdown_grace_secs must be greater than zero".to_string(),
            ));
        }
        if self.artifact_ttl_secs == 0 || self.artifact_max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "artifact_ttl_secs and artifact_max_sessions must be greater than zero"
                    .to_string(),
            ));
        }
        if self.tools_token.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid("tools_token must not be blank".to_string()));
        }
        if let Some(url) = &self.agent_runtime_url {
            reqwest::Url::parse(url).map_err(|e| {
                ConfigError::Invalid(format!("agent_runtime_url '{}': {}", url, e))
            })?;
        }
        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Parsed list of allowed CORS origins
    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }

    /// Settings for the image model client
    pub fn gemini(&self) -> GeminiSettings {
        GeminiSettings {
            api_key: self.gemini_api_key.clone(),
            base_url: self.gemini_api_url.clone(),
            model: self.gemini_image_model.clone(),
            timeout: self.request_timeout(),
        }
    }

    /// Settings for the object store client
    ///
    /// Region falls back to `auto`; in local mode an unset endpoint points
    /// at the development MinIO container.
    pub fn storage(&self) -> StorageSettings {
        let region = if self.cloudflare_r2_region.is_empty() {
            "auto".to_string()
        } else {
            self.cloudflare_r2_region.clone()
        };

        let endpoint = if self.cloudflare_r2_endpoint.is_empty() {
            match self.env {
                Environment::Local => Some(LOCAL_STORAGE_ENDPOINT.to_string()),
                Environment::Prod => None,
            }
        } else {
            Some(self.cloudflare_r2_endpoint.clone())
        };

        StorageSettings {
            bucket: self.cloudflare_r2_bucket_name.clone(),
            region,
            endpoint,
            access_key_id: self.cloudflare_r2_accesskey.clone(),
            secret_access_key: self.cloudflare_r2_secretkey.clone(),
            account_id: self.cloudflare_r2_account_id.clone(),
            public_url: self.cloudflare_r2_public_url.clone(),
            timeout: self.request_timeout(),
        }
    }
}
