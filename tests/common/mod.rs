//! Common test utilities - AgentTest harness for end-to-end testing

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use lgtm_agent::gemini::GeminiSettings;
use lgtm_agent::storage::{BucketClient, ObjectStore, StorageError, StoreConnector};
use lgtm_agent::{AppState, Config, Server};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Bytes the fake Gemini server returns as the generated image
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nlgtm";

/// Connector handing out one shared in-memory bucket
pub struct MemoryBucket(pub BucketClient);

impl StoreConnector for MemoryBucket {
    fn connect(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
        Ok(Arc::new(self.0.clone()))
    }
}

/// Test harness that spawns a real server on a random port, backed by a
/// fake Gemini endpoint and an in-memory bucket
pub struct AgentTest {
    pub addr: SocketAddr,
    pub client: Client,
    pub bucket: BucketClient,
    server: Arc<Server>,
    _handle: JoinHandle<()>,
}

impl AgentTest {
    /// Start with a configured bucket
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    /// Start after adjusting the default test config
    pub async fn start_with(adjust: impl FnOnce(&mut Config)) -> Result<Self> {
        let gemini_url = spawn_fake_gemini().await?;

        // Find a random available port
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let output_dir = std::env::temp_dir().join("lgtm-agent-it");
        let mut config = Config {
            port: addr.port(),
            gemini_api_key: "test-key".to_string(),
            gemini_api_url: gemini_url,
            cloudflare_r2_bucket_name: "lgtm".to_string(),
            cloudflare_r2_public_url: "https://img.example.dev".to_string(),
            allowed_origins: "http://localhost:3000".to_string(),
            output_dir,
            shutdown_grace_secs: 1,
            ..Config::default()
        };
        adjust(&mut config);

        let bucket = BucketClient::in_memory();
        let models = Arc::new(GeminiSettings {
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_api_url.clone(),
            model: config.gemini_image_model.clone(),
            timeout: Duration::from_secs(5),
        });
        let state = AppState::new(config, models, Arc::new(MemoryBucket(bucket.clone())))?;

        let server = Arc::new(Server::with_state(addr, state));
        let server_clone = server.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = server_clone.run().await {
                eprintln!("Server error: {}", e);
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        // Poll until server is ready (max 2 seconds)
        let mut ready = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if client
                .get(format!("http://{}/v1/agent/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
        }

        if !ready {
            panic!("Server failed to start within 2 seconds");
        }

        Ok(Self {
            addr,
            client,
            bucket,
            server,
            _handle: handle,
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Response> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await?)
    }

    /// Invoke a tool and return the `ToolResponse` JSON
    pub async fn invoke(&self, tool: &str, session: &str, args: Value) -> Result<Value> {
        let response = self
            .post_json(
                &format!("/v1/tools/{}", tool),
                &json!({"sessionId": session, "args": args}),
            )
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}

impl Drop for AgentTest {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

/// Minimal generateContent endpoint answering with text plus `FAKE_PNG`
async fn spawn_fake_gemini() -> Result<String> {
    let app = Router::new().route(
        "/v1beta/models/{*rest}",
        post(|| async {
            Json(json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [
                            {"text": "Here is your LGTM image"},
                            {"inlineData": {"mimeType": "image/png", "data": BASE64.encode(FAKE_PNG)}}
                        ]
                    }
                }]
            }))
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok(format!("http://{}", addr))
}
