use std::env;
use std::time::Duration;

use crate::error::SettingsError;

pub const AUDIENCE_ENV: &str = "OIDC_AUDIENCE";
pub const ISSUER_URL_ENV: &str = "OIDC_ISSUER_URL";
pub const LEEWAY_ENV: &str = "OIDC_LEEWAY_SECONDS";
pub const MIN_REFRESH_ENV: &str = "OIDC_MIN_REFRESH_SECONDS";
pub const AUTO_REFRESH_ENV: &str = "OIDC_AUTO_REFRESH_SECONDS";
pub const HTTP_TIMEOUT_ENV: &str = "OIDC_HTTP_TIMEOUT_SECONDS";

/// Relative to the issuer URL, which always ends with `/`.
pub const OIDC_CONFIGURATION_PATH: &str = ".well-known/openid-configuration";

const DEFAULT_LEEWAY_SECONDS: u32 = 60;
const DEFAULT_MIN_REFRESH: Duration = Duration::from_secs(30);
const DEFAULT_AUTO_REFRESH: Duration = Duration::from_secs(12 * 60 * 60);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration for OpenID Connect bearer token authorization.
///
/// Settings are loaded once at startup and never mutated afterwards. Blank
/// values are accepted at construction time; [`AuthorizationSettings::validate`]
/// reports them, and both the authorizer and the health check refuse to proceed
/// while they are missing.
#[derive(Debug, Clone)]
pub struct AuthorizationSettings {
    audience: String,
    issuer_url: String,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub leeway_seconds: u32,
    /// Lower bound between two fetches triggered by refresh requests.
    pub min_refresh_interval: Duration,
    /// Age after which cached signing keys are refetched regardless of requests.
    pub automatic_refresh_interval: Duration,
    /// Timeout applied by the HTTP client fetching discovery metadata and keys.
    pub http_timeout: Duration,
}

impl AuthorizationSettings {
    pub fn new(audience: impl Into<String>, issuer_url: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            issuer_url: normalize_issuer_url(issuer_url.into()),
            leeway_seconds: DEFAULT_LEEWAY_SECONDS,
            min_refresh_interval: DEFAULT_MIN_REFRESH,
            automatic_refresh_interval: DEFAULT_AUTO_REFRESH,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Reads settings from the process environment. Missing required values
    /// come back blank so that validation can report them later.
    pub fn from_env() -> Self {
        let audience = env::var(AUDIENCE_ENV).unwrap_or_default();
        let issuer_url = env::var(ISSUER_URL_ENV).unwrap_or_default();

        let mut settings = Self::new(audience, issuer_url);
        if let Some(leeway) = parse_env::<u32>(LEEWAY_ENV) {
            settings.leeway_seconds = leeway;
        }
        if let Some(secs) = parse_env::<u64>(MIN_REFRESH_ENV) {
            settings.min_refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>(AUTO_REFRESH_ENV) {
            settings.automatic_refresh_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>(HTTP_TIMEOUT_ENV) {
            settings.http_timeout = Duration::from_secs(secs.max(1));
        }
        settings
    }

    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn with_automatic_refresh_interval(mut self, interval: Duration) -> Self {
        self.automatic_refresh_interval = interval;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Identifier of the protected API; expected `aud` claim.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Issuer URL, always ending with `/` when set; expected `iss` claim.
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    pub fn discovery_url(&self) -> String {
        format!("{}{}", self.issuer_url, OIDC_CONFIGURATION_PATH)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.audience.trim().is_empty() {
            return Err(SettingsError::Missing(AUDIENCE_ENV));
        }
        if self.issuer_url.trim().is_empty() {
            return Err(SettingsError::Missing(ISSUER_URL_ENV));
        }
        Ok(())
    }
}

fn normalize_issuer_url(value: String) -> String {
    if value.trim().is_empty() || value.ends_with('/') {
        value
    } else {
        format!("{value}/")
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse::<T>().ok())
}
