//! Tool endpoints used by the agent runtime
//!
//! GET  /v1/tools        - agent card with tool declarations
//! POST /v1/tools/{name} - invoke a tool within a session
//!
//! When a tools token is configured both require `Authorization: Bearer <token>`.

use axum::{
    extract::{Path, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::{error_response, AppState};
use crate::tools::{ToolContext, ToolError};

/// Tool invocation request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub session_id: String,
    #[serde(default)]
    pub args: Value,
}

/// Reject tool calls without the configured bearer token
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.tools_token.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented != Some(expected) {
        warn!("rejected tool call without a valid token");
        return error_response(StatusCode::UNAUTHORIZED, "missing or invalid tools token");
    }
    next.run(request).await
}

/// Describe the agent and its tools
pub async fn describe(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.card.as_ref().clone())
}

/// Invoke a tool by name
pub async fn invoke(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<InvokeRequest>,
) -> Response {
    let ctx = ToolContext::new(&req.session_id, state.artifacts.handle(&req.session_id));

    match state.tools.invoke(&name, &ctx, req.args).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e @ ToolError::UnknownTool(_)) => error_response(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ ToolError::InvalidArguments { .. }) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
