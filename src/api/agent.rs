//! Agent runtime delegation
//!
//! ANY /v1/agent/{*path} - forwarded to the external agent runtime

use axum::{
    body::{Body, Bytes},
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::Response,
};
use tracing::error;

use super::{error_response, AppState};

/// Response headers copied back from the runtime
const RETURNED_HEADERS: [header::HeaderName; 2] = [header::CONTENT_TYPE, header::CACHE_CONTROL];

/// Forward a request to the agent runtime, streaming the response back
pub async fn forward(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(proxy) = state.agent.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "agent runtime not configured",
        );
    };

    let upstream = match proxy
        .forward(method, &path, query.as_deref(), &headers, body)
        .await
    {
        Ok(upstream) => upstream,
        Err(e) => {
            error!("agent runtime request failed: {}", e);
            return error_response(StatusCode::BAD_GATEWAY, "agent runtime unavailable");
        }
    };

    let mut response = Response::builder().status(upstream.status());
    for name in RETURNED_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            response = response.header(name, value.clone());
        }
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .unwrap_or_else(|e| {
            error!("failed to build proxied response: {}", e);
            error_response(StatusCode::BAD_GATEWAY, "agent runtime unavailable")
        })
}
