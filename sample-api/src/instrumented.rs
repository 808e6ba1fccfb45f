use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::http::HeaderMap;
use common_observability::AuthMetrics;
use oidc_auth::{ApiAuthorization, AuthorizationResult, HealthCheckResult};

/// Records the outcome and latency of every call to the wrapped authorizer.
pub struct InstrumentedAuthorizer {
    inner: Arc<dyn ApiAuthorization>,
    metrics: Arc<AuthMetrics>,
}

impl InstrumentedAuthorizer {
    pub fn new(inner: Arc<dyn ApiAuthorization>, metrics: Arc<AuthMetrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl ApiAuthorization for InstrumentedAuthorizer {
    async fn authorize(&self, headers: &HeaderMap) -> AuthorizationResult {
        let started = Instant::now();
        let result = self.inner.authorize(headers).await;
        let outcome = result.failure_reason().map_or("success", |reason| reason.code());
        self.metrics
            .record_authorization(outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn health_check(&self) -> HealthCheckResult {
        let result = self.inner.health_check().await;
        self.metrics.record_health_check(result.is_healthy());
        result
    }
}
