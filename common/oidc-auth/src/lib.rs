pub mod authorizer;
pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod health;
pub mod jwks;
pub mod provider;
pub mod verifier;

#[cfg(test)]
mod test_support;

pub use authorizer::{ApiAuthorization, AuthorizationResult, OidcApiAuthorizer};
pub use claims::Claims;
pub use config::AuthorizationSettings;
pub use error::{AuthorizationFailure, KeyFetchError, SettingsError, ValidationError};
pub use extractors::{bearer_token, AuthContext, AuthRejection};
pub use health::{HealthCheckResult, HealthChecker};
pub use jwks::{OidcDiscoveryClient, SigningKey, SigningKeySet, SigningKeySource};
pub use provider::{CachingKeyProvider, RefreshPolicy, SigningKeyProvider};
pub use verifier::{JwtTokenValidator, TokenValidator};
