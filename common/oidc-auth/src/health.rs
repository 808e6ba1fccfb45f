use std::sync::Arc;

use serde::ser::{Serialize, Serializer};
use tracing::{info, warn};

use crate::config::AuthorizationSettings;
use crate::provider::SigningKeyProvider;

/// Result of [`HealthChecker::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckResult {
    Healthy,
    Unhealthy(String),
}

impl HealthCheckResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn bad_health_message(&self) -> Option<&str> {
        match self {
            Self::Healthy => None,
            Self::Unhealthy(message) => Some(message),
        }
    }
}

impl Serialize for HealthCheckResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            healthy: bool,
            bad_health_message: Option<&'a str>,
        }

        Body {
            healthy: self.is_healthy(),
            bad_health_message: self.bad_health_message(),
        }
        .serialize(serializer)
    }
}

/// Checks that settings are complete and that the issuer serves usable keys.
#[derive(Clone)]
pub struct HealthChecker {
    settings: Arc<AuthorizationSettings>,
    keys: Arc<dyn SigningKeyProvider>,
}

impl HealthChecker {
    pub fn new(settings: Arc<AuthorizationSettings>, keys: Arc<dyn SigningKeyProvider>) -> Self {
        Self { settings, keys }
    }

    pub async fn check(&self) -> HealthCheckResult {
        if let Err(err) = self.settings.validate() {
            warn!(error = %err, "health check failed: settings incomplete");
            return HealthCheckResult::Unhealthy(err.to_string());
        }

        match self.keys.force_refresh().await {
            Ok(keys) => {
                info!(keys = keys.len(), "health check passed");
                HealthCheckResult::Healthy
            }
            Err(err) => {
                warn!(error = %err, "health check failed: signing keys unavailable");
                HealthCheckResult::Unhealthy(format!(
                    "cannot obtain signing keys from the OpenID Connect issuer: {err}"
                ))
            }
        }
    }
}
