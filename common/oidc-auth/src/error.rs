use thiserror::Error;

/// A required setting is absent or blank. Treated as a deployment error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("missing application setting: {0} is not set")]
    Missing(&'static str),
}

/// Failure to obtain the issuer's signing keys.
#[derive(Debug, Clone, Error)]
pub enum KeyFetchError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("discovery document at {url} has an invalid jwks_uri '{jwks_uri}'")]
    InvalidJwksUri { url: String, jwks_uri: String },
    #[error("JWKS at {url} contains no usable signing keys")]
    NoUsableKeys { url: String },
}

/// Outcome of a failed token validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no signing key matches kid {}", .kid.as_deref().unwrap_or("<none>"))]
    KeyNotFound { kid: Option<String> },
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("token audience does not match")]
    BadAudience,
    #[error("token issuer does not match")]
    BadIssuer,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("malformed token: {0}")]
    Malformed(String),
}

impl From<jsonwebtoken::errors::Error> for ValidationError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match value.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidAudience => Self::BadAudience,
            ErrorKind::InvalidIssuer => Self::BadIssuer,
            ErrorKind::InvalidSignature => Self::BadSignature,
            _ => Self::Malformed(value.to_string()),
        }
    }
}

/// Reason attached to a failed [`crate::AuthorizationResult`].
#[derive(Debug, Clone, Error)]
pub enum AuthorizationFailure {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("Authorization header is missing, invalid format, or is not a Bearer token")]
    MissingBearerToken,
    #[error("cannot obtain signing keys from the OpenID Connect issuer: {0}")]
    SigningKeys(#[source] KeyFetchError),
    #[error("authorization failed after key refresh retry: {0}")]
    KeyNotFoundAfterRefresh(#[source] ValidationError),
    #[error("authorization failed: {0}")]
    Validation(#[source] ValidationError),
}

impl AuthorizationFailure {
    /// Stable label for metrics and error codes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Settings(_) => "misconfigured",
            Self::MissingBearerToken => "missing_token",
            Self::SigningKeys(_) => "signing_keys_unavailable",
            Self::KeyNotFoundAfterRefresh(_) => "signing_key_not_found",
            Self::Validation(_) => "invalid_token",
        }
    }

    /// True when the failure stems from the service rather than the caller.
    pub fn is_server_side(&self) -> bool {
        matches!(self, Self::Settings(_) | Self::SigningKeys(_))
    }
}
