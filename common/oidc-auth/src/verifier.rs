use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::error::ValidationError;
use crate::jwks::{SigningKey, SigningKeySet};

/// Cryptographic token validation against a set of issuer keys.
pub trait TokenValidator: Send + Sync {
    fn validate(
        &self,
        token: &str,
        keys: &SigningKeySet,
        issuer: &str,
        audience: &str,
    ) -> Result<Claims, ValidationError>;
}

/// [`TokenValidator`] built on `jsonwebtoken`.
///
/// The token header's `kid` selects the key; without a `kid` every key that
/// supports the header algorithm is tried in order. `exp`, `iss` and `aud` are
/// required, `nbf` is honoured when present.
#[derive(Debug, Clone)]
pub struct JwtTokenValidator {
    leeway_seconds: u32,
}

impl JwtTokenValidator {
    pub fn new(leeway_seconds: u32) -> Self {
        Self { leeway_seconds }
    }

    fn validation(&self, algorithm: Algorithm, issuer: &str, audience: &str) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_nbf = true;
        validation.leeway = self.leeway_seconds.into();
        validation
    }

    fn decode_with(
        &self,
        token: &str,
        key: &SigningKey,
        validation: &Validation,
    ) -> Result<Claims, ValidationError> {
        let token_data = decode::<Value>(token, key.decoding_key(), validation)?;
        Claims::try_from(token_data.claims)
    }
}

impl Default for JwtTokenValidator {
    fn default() -> Self {
        Self::new(60)
    }
}

impl TokenValidator for JwtTokenValidator {
    fn validate(
        &self,
        token: &str,
        keys: &SigningKeySet,
        issuer: &str,
        audience: &str,
    ) -> Result<Claims, ValidationError> {
        let header = decode_header(token)
            .map_err(|err| ValidationError::Malformed(format!("token header: {err}")))?;
        let validation = self.validation(header.alg, issuer, audience);

        if let Some(kid) = header.kid {
            let key = keys
                .find(&kid)
                .filter(|key| key.supports(header.alg))
                .ok_or(ValidationError::KeyNotFound {
                    kid: Some(kid.clone()),
                })?;
            let claims = self.decode_with(token, key, &validation)?;
            debug!(kid, "validated bearer token");
            return Ok(claims);
        }

        let mut last_error = None;
        for key in keys.iter().filter(|key| key.supports(header.alg)) {
            match self.decode_with(token, key, &validation) {
                Ok(claims) => {
                    debug!("validated bearer token without kid");
                    return Ok(claims);
                }
                // Only a signature mismatch means "try the next key".
                Err(ValidationError::BadSignature) => {
                    last_error = Some(ValidationError::BadSignature);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or(ValidationError::KeyNotFound { kid: None }))
    }
}
