//! HTTP API module - image listing, tools, agent delegation

mod agent;
mod cors;
mod images;
mod tools;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{warn, Span};

use crate::agent::{AgentCard, AgentProxy, ProxyError};
use crate::artifacts::ArtifactSessions;
use crate::config::Config;
use crate::gemini::ModelConnector;
use crate::storage::StoreConnector;
use crate::tools::{GenerateImageTool, SaveImageTool, ToolRegistry};

pub use cors::CorsPolicy;
pub use images::{ImageInfo, ListImagesResponse, LIST_LIMIT};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tools: Arc<ToolRegistry>,
    pub card: Arc<AgentCard>,
    pub artifacts: Arc<ArtifactSessions>,
    pub storage: Arc<dyn StoreConnector>,
    pub agent: Option<Arc<AgentProxy>>,
}

impl AppState {
    /// State wired to Gemini and the configured S3 bucket
    pub fn from_config(config: Config) -> Result<Self, ProxyError> {
        let models = Arc::new(config.gemini());
        let storage = Arc::new(config.storage());
        Self::new(config, models, storage)
    }

    /// State with explicit model and storage connectors
    pub fn new(
        config: Config,
        models: Arc<dyn ModelConnector>,
        storage: Arc<dyn StoreConnector>,
    ) -> Result<Self, ProxyError> {
        let settings = config.storage();
        let tools = ToolRegistry::with_image_tools(
            GenerateImageTool::new(models, config.output_dir.clone()),
            SaveImageTool::new(storage.clone(), &settings),
        );
        let card = AgentCard::new(&config.gemini_model, &settings.public_base_url(), &tools);

        let agent = match &config.agent_runtime_url {
            Some(url) => Some(Arc::new(AgentProxy::new(url, config.request_timeout())?)),
            None => None,
        };

        if config.env.is_prod() && config.tools_token.is_none() {
            warn!("tools_token not set, tool endpoints accept unauthenticated calls");
        }

        let artifacts = Arc::new(ArtifactSessions::new(
            config.artifact_ttl(),
            config.artifact_max_sessions,
        ));

        Ok(Self {
            config: Arc::new(config),
            tools: Arc::new(tools),
            card: Arc::new(card),
            artifacts,
            storage,
            agent,
        })
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let cors = Arc::new(CorsPolicy::from_config(&state.config));

    let tool_routes = Router::new()
        .route("/v1/tools", get(tools::describe))
        .route("/v1/tools/{name}", post(tools::invoke))
        .route_layer(from_fn_with_state(state.clone(), tools::require_token));

    Router::new()
        .route("/v1/images", get(images::list_images))
        .route("/v1/agent/health", any(health_check))
        .route("/v1/agent/{*path}", any(agent::forward))
        .merge(tool_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(from_fn_with_state(cors, cors::apply)),
        )
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}


#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Method;

    use super::testing::{json, send, state};
    use super::*;
    use crate::tools::testing::FakeStores;

    #[tokio::test]
    async fn test_health_any_method() {
        let router = router(state("lgtm", Arc::new(FakeStores::default())));
        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH] {
            let response = send(router.clone(), method, "/v1/agent/health", Body::empty()).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json(response).await, serde_json::json!({"status": "ok"}));
        }
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let router = router(state("lgtm", Arc::new(FakeStores::default())));
        let response = send(router, Method::GET, "/v1/agent/health", Body::empty()).await;
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_from_config_builds_real_connectors() {
        let config = Config {
            agent_runtime_url: Some("http://runtime:8000".to_string()),
            ..Config::default()
        };
        let state = AppState::from_config(config).unwrap();
        assert!(state.agent.is_some());
        assert_eq!(state.tools.declarations().len(), 2);
        assert_eq!(state.card.tools.len(), 2);
        // no bucket configured
        assert!(state.storage.connect().is_err());
    }
}
