use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;

use crate::authorizer::{ApiAuthorization, AuthorizationResult};
use crate::claims::Claims;
use crate::error::AuthorizationFailure;

/// Returns the credential of a single `Authorization: Bearer <token>` header.
///
/// Header names are case-insensitive in `http`, so lookup is by the canonical
/// name. Absent, repeated, or malformed headers and other schemes yield `None`.
/// An empty credential (`"Bearer"`) is returned as an empty string; rejecting
/// it is left to token validation.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let mut values = headers.get_all(AUTHORIZATION).iter();
    let value = values.next()?;
    if values.next().is_some() {
        return None;
    }

    let raw = value.to_str().ok()?.trim_matches(is_whitespace);
    let (scheme, credential) = parse_credentials(raw)?;
    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    Some(credential.to_owned())
}

/// Splits `<scheme> [parameter]`.
///
/// The parameter runs to the end of the value. Anything after its first
/// comma must be a list of `name=value` pairs.
fn parse_credentials(raw: &str) -> Option<(&str, &str)> {
    let (scheme, credential) = match raw.split_once(is_whitespace) {
        Some((scheme, rest)) => (scheme, rest.trim_start_matches(is_whitespace)),
        None => (raw, ""),
    };

    if scheme.is_empty() || !scheme.bytes().all(is_tchar) {
        return None;
    }
    if let Some((_, params)) = credential.split_once(',') {
        if !params.split(',').all(is_auth_param) {
            return None;
        }
    }
    Some((scheme, credential))
}

fn is_auth_param(param: &str) -> bool {
    let param = param.trim_matches(is_whitespace);
    if param.is_empty() {
        return true;
    }
    match param.split_once('=') {
        Some((name, value)) => {
            let name = name.trim_end_matches(is_whitespace);
            !name.is_empty()
                && name.bytes().all(is_tchar)
                && !value.trim_start_matches(is_whitespace).is_empty()
        }
        None => false,
    }
}

fn is_whitespace(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_tchar(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&byte)
}

/// Validated claims of the caller, extracted through the shared authorizer.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: Claims,
}

impl AuthContext {
    pub fn subject(&self) -> Option<&str> {
        self.claims.subject.as_deref()
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<dyn ApiAuthorization>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let authorizer = <Arc<dyn ApiAuthorization> as FromRef<S>>::from_ref(state);

        match authorizer.authorize(&parts.headers).await {
            AuthorizationResult::Success { claims } => Ok(Self { claims }),
            AuthorizationResult::Failure { reason } => Err(AuthRejection(reason)),
        }
    }
}

/// Rejection for [`AuthContext`]. The failure reason is kept for logging and
/// never written to the response body.
#[derive(Debug)]
pub struct AuthRejection(pub AuthorizationFailure);

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let error = if self.0.is_server_side() {
            ApiError::ServiceUnavailable {
                code,
                trace_id: None,
            }
        } else {
            ApiError::unauthorized(code)
        };
        error.into_response()
    }
}
