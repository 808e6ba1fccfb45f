use axum::body::Bytes;
use axum::extract::{FromRef, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common_http_errors::ApiError;
use common_observability::AuthMetrics;
use oidc_auth::{ApiAuthorization, AuthContext, HealthCheckResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::instrumented::InstrumentedAuthorizer;

pub const MISSING_NAME_MESSAGE: &str = "Please pass a name in the request body.";

/// Header carrying the key that unlocks `/healthz` when one is configured.
pub const HEALTH_KEY_HEADER: &str = "x-health-key";

#[derive(Clone)]
pub struct AppState {
    pub authorizer: Arc<dyn ApiAuthorization>,
    pub metrics: Arc<AuthMetrics>,
    pub health_key: Option<Arc<str>>,
}

impl AppState {
    /// Wraps `authorizer` so every call is counted in `metrics`.
    pub fn new(authorizer: Arc<dyn ApiAuthorization>, metrics: Arc<AuthMetrics>) -> Self {
        let authorizer = Arc::new(InstrumentedAuthorizer::new(authorizer, Arc::clone(&metrics)));
        Self { authorizer, metrics, health_key: None }
    }

    /// Every `/healthz` hit refetches the issuer's keys, so deployments
    /// exposed to the internet should require a key.
    pub fn with_health_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.health_key = Some(key.into());
        self
    }
}

impl FromRef<AppState> for Arc<dyn ApiAuthorization> {
    fn from_ref(state: &AppState) -> Self {
        state.authorizer.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/hello", post(hello))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct HelloRequest {
    name: Option<String>,
}

pub async fn hello(auth: AuthContext, body: Bytes) -> Result<String, ApiError> {
    info!(subject = ?auth.subject(), "hello request is authorized");

    let name = serde_json::from_slice::<HelloRequest>(&body)
        .ok()
        .and_then(|request| request.name)
        .filter(|name| !name.trim().is_empty())
        .ok_or(ApiError::BadRequest {
            code: "missing_name",
            trace_id: None,
            message: Some(MISSING_NAME_MESSAGE.into()),
        })?;

    Ok(format!("Hello, {name}"))
}

/// 200 whenever the caller may ask; the body carries the verdict.
pub async fn healthz(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HealthCheckResult>, ApiError> {
    if let Some(expected) = state.health_key.as_deref() {
        let presented = headers.get(HEALTH_KEY_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            warn!("health check refused: missing or wrong health key");
            return Err(ApiError::unauthorized("invalid_health_key"));
        }
    }

    let result = state.authorizer.health_check().await;
    match result.bad_health_message() {
        None => info!("health check OK"),
        Some(message) => error!(reason = message, "health check failed"),
    }
    Ok(Json(result))
}

pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::internal(e, None))?;
    let mut resp = body.into_response();
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    Ok(resp)
}
