//! CORS middleware
//!
//! Production echoes only allowed origins; other environments echo any
//! origin. Preflight requests are answered directly with 204.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{Config, Environment};

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With";
const MAX_AGE: &str = "3600";

/// Origin policy derived from configuration
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    env: Environment,
    allowed: Vec<String>,
}

impl CorsPolicy {
    pub fn new(env: Environment, allowed: Vec<String>) -> Self {
        Self { env, allowed }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.env, config.allowed_origins())
    }

    fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == "*" || allowed == origin)
    }

    /// Value for `Access-Control-Allow-Origin`, if any
    pub fn allow_origin(&self, origin: Option<&str>) -> Option<String> {
        match self.env {
            Environment::Prod => origin
                .filter(|o| !o.is_empty() && self.is_allowed(o))
                .map(str::to_string),
            Environment::Local => Some(origin.unwrap_or("*").to_string()),
        }
    }
}

/// Attach CORS headers, short-circuiting preflight requests
pub async fn apply(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    if let Some(value) = policy
        .allow_origin(origin.as_deref())
        .and_then(|o| HeaderValue::from_str(&o).ok())
    {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE));

    response
}
