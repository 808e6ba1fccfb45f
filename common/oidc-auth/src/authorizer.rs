use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use serde::ser::{Serialize, Serializer};
use tracing::{debug, warn};

use crate::claims::Claims;
use crate::config::AuthorizationSettings;
use crate::error::{AuthorizationFailure, KeyFetchError, ValidationError};
use crate::extractors::bearer_token;
use crate::health::{HealthCheckResult, HealthChecker};
use crate::jwks::OidcDiscoveryClient;
use crate::provider::{CachingKeyProvider, RefreshPolicy, SigningKeyProvider};
use crate::verifier::{JwtTokenValidator, TokenValidator};

/// Authorization entry points exposed to request handlers.
#[async_trait]
pub trait ApiAuthorization: Send + Sync {
    /// Checks the request headers for a valid OIDC bearer token.
    async fn authorize(&self, headers: &HeaderMap) -> AuthorizationResult;

    /// Confirms settings are present and the issuer is reachable.
    async fn health_check(&self) -> HealthCheckResult;
}

/// Outcome of [`ApiAuthorization::authorize`].
#[derive(Debug, Clone)]
pub enum AuthorizationResult {
    Success { claims: Claims },
    Failure { reason: AuthorizationFailure },
}

impl AuthorizationResult {
    fn failure(reason: impl Into<AuthorizationFailure>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn failed(&self) -> bool {
        !self.is_success()
    }

    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Self::Success { claims } => Some(claims),
            Self::Failure { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&AuthorizationFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason } => Some(reason),
        }
    }
}

impl Serialize for AuthorizationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Body<'a> {
            success: bool,
            failure_reason: Option<String>,
            claims: Option<&'a Claims>,
        }

        Body {
            success: self.is_success(),
            failure_reason: self.failure_reason().map(ToString::to_string),
            claims: self.claims(),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Initial,
    AfterKeyRefresh,
}

/// Authorizes requests against the configured OpenID Connect issuer.
///
/// A `KeyNotFound` from the validator usually means the issuer rotated its
/// signing key after the cached set was fetched. The authorizer then requests
/// a key refresh and validates once more; any other validation failure is
/// final. At most one refresh is requested per call.
pub struct OidcApiAuthorizer {
    settings: Arc<AuthorizationSettings>,
    keys: Arc<dyn SigningKeyProvider>,
    validator: Arc<dyn TokenValidator>,
    health: HealthChecker,
}

impl OidcApiAuthorizer {
    pub fn new(
        settings: AuthorizationSettings,
        keys: Arc<dyn SigningKeyProvider>,
        validator: Arc<dyn TokenValidator>,
    ) -> Self {
        let settings = Arc::new(settings);
        let health = HealthChecker::new(Arc::clone(&settings), Arc::clone(&keys));
        Self {
            settings,
            keys,
            validator,
            health,
        }
    }

    /// Wires the production collaborators: OIDC discovery with a caching
    /// provider, and `jsonwebtoken` validation. Settings are not validated
    /// here; missing values surface from `authorize` and `health_check`.
    pub fn from_settings(settings: AuthorizationSettings) -> Result<Self, KeyFetchError> {
        let source = OidcDiscoveryClient::new(&settings)?;
        let keys = CachingKeyProvider::new(source, RefreshPolicy::from(&settings));
        let validator = JwtTokenValidator::new(settings.leeway_seconds);
        Ok(Self::new(settings, Arc::new(keys), Arc::new(validator)))
    }

    pub fn settings(&self) -> &AuthorizationSettings {
        &self.settings
    }

    async fn authorize_token(&self, token: &str) -> AuthorizationResult {
        let issuer = self.settings.issuer_url();
        let audience = self.settings.audience();

        let mut missing_key = ValidationError::KeyNotFound { kid: None };
        for attempt in [Attempt::Initial, Attempt::AfterKeyRefresh] {
            let keys = match self.keys.signing_keys().await {
                Ok(keys) => keys,
                Err(err) => {
                    warn!(error = %err, "authorization failed: signing keys unavailable");
                    return AuthorizationResult::failure(AuthorizationFailure::SigningKeys(err));
                }
            };

            match self.validator.validate(token, &keys, issuer, audience) {
                Ok(claims) => {
                    debug!(subject = ?claims.subject, ?attempt, "request authorized");
                    return AuthorizationResult::Success { claims };
                }
                Err(err @ ValidationError::KeyNotFound { .. }) => {
                    if attempt == Attempt::Initial {
                        warn!(error = %err, "signing key not found, refreshing keys and retrying");
                        self.keys.request_refresh();
                    } else {
                        warn!(error = %err, "signing key still not found after refresh");
                    }
                    missing_key = err;
                }
                Err(err) => {
                    warn!(error = %err, "authorization failed: token rejected");
                    return AuthorizationResult::failure(AuthorizationFailure::Validation(err));
                }
            }
        }

        AuthorizationResult::failure(AuthorizationFailure::KeyNotFoundAfterRefresh(missing_key))
    }
}

#[async_trait]
impl ApiAuthorization for OidcApiAuthorizer {
    async fn authorize(&self, headers: &HeaderMap) -> AuthorizationResult {
        if let Err(err) = self.settings.validate() {
            warn!(error = %err, "authorization refused: settings incomplete");
            return AuthorizationResult::failure(err);
        }

        let Some(token) = bearer_token(headers) else {
            warn!("authorization failed: missing or malformed bearer token");
            return AuthorizationResult::failure(AuthorizationFailure::MissingBearerToken);
        };

        self.authorize_token(&token).await
    }

    async fn health_check(&self) -> HealthCheckResult {
        self.health.check().await
    }
}
