use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::AuthorizationSettings;
use crate::error::KeyFetchError;

/// Key type a decoding key can verify signatures for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec,
    Ed,
}

impl KeyFamily {
    pub fn of(algorithm: Algorithm) -> Option<Self> {
        match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(Self::Rsa),
            Algorithm::ES256 | Algorithm::ES384 => Some(Self::Ec),
            Algorithm::EdDSA => Some(Self::Ed),
            // Symmetric algorithms never verify against published keys.
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => None,
        }
    }
}

/// One public key published by the issuer.
#[derive(Clone)]
pub struct SigningKey {
    kid: Option<String>,
    algorithm: Option<Algorithm>,
    family: KeyFamily,
    key: DecodingKey,
}

impl SigningKey {
    pub fn new(kid: Option<String>, family: KeyFamily, key: DecodingKey) -> Self {
        Self {
            kid,
            algorithm: None,
            family,
            key,
        }
    }

    /// Pins the key to the algorithm declared by its JWK `alg` member.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn from_rsa_components(
        kid: impl Into<String>,
        modulus: &str,
        exponent: &str,
    ) -> Result<Self, jsonwebtoken::errors::Error> {
        let key = DecodingKey::from_rsa_components(modulus, exponent)?;
        Ok(Self::new(Some(kid.into()), KeyFamily::Rsa, key))
    }

    /// Converts a JWK into a signing key. Returns `None` for keys that are
    /// not meant for signature verification.
    pub fn from_jwk(jwk: &Jwk) -> Option<Result<Self, jsonwebtoken::errors::Error>> {
        if matches!(
            jwk.common.public_key_use,
            Some(PublicKeyUse::Encryption) | Some(PublicKeyUse::Other(_))
        ) {
            return None;
        }

        let family = match &jwk.algorithm {
            AlgorithmParameters::RSA(_) => KeyFamily::Rsa,
            AlgorithmParameters::EllipticCurve(_) => KeyFamily::Ec,
            AlgorithmParameters::OctetKeyPair(_) => KeyFamily::Ed,
            AlgorithmParameters::OctetKey(_) => return None,
        };

        let algorithm = match &jwk.common.key_algorithm {
            Some(declared) => Some(signing_algorithm(declared)?),
            None => None,
        };

        Some(DecodingKey::from_jwk(jwk).map(|key| Self {
            kid: jwk.common.key_id.clone(),
            algorithm,
            family,
            key,
        }))
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn family(&self) -> KeyFamily {
        self.family
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// Whether a token signed with `algorithm` can be verified by this key.
    pub fn supports(&self, algorithm: Algorithm) -> bool {
        match self.algorithm {
            Some(pinned) => pinned == algorithm,
            None => KeyFamily::of(algorithm) == Some(self.family),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("family", &self.family)
            .finish_non_exhaustive()
    }
}

fn signing_algorithm(declared: &KeyAlgorithm) -> Option<Algorithm> {
    match declared {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// Immutable snapshot of the issuer's keys at the time they were fetched.
#[derive(Debug, Clone)]
pub struct SigningKeySet {
    keys: Vec<SigningKey>,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
}

impl SigningKeySet {
    pub fn new(keys: Vec<SigningKey>) -> Self {
        Self {
            keys,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SigningKey> {
        self.keys.iter()
    }

    pub fn find(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|key| key.kid() == Some(kid))
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at_utc
    }
}

/// Produces the issuer's current signing keys, typically over the network.
#[async_trait]
pub trait SigningKeySource: Send + Sync {
    async fn fetch_signing_keys(&self) -> Result<SigningKeySet, KeyFetchError>;
}

#[async_trait]
impl<T: SigningKeySource + ?Sized> SigningKeySource for Arc<T> {
    async fn fetch_signing_keys(&self) -> Result<SigningKeySet, KeyFetchError> {
        (**self).fetch_signing_keys().await
    }
}

/// Retrieves signing keys through OpenID Connect discovery: the issuer's
/// `.well-known/openid-configuration` names the `jwks_uri`, which is then
/// fetched and decoded.
#[derive(Clone)]
pub struct OidcDiscoveryClient {
    client: Client,
    discovery_url: String,
}

impl OidcDiscoveryClient {
    pub fn new(settings: &AuthorizationSettings) -> Result<Self, KeyFetchError> {
        let client = Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|err| KeyFetchError::HttpClient(err.to_string()))?;
        Ok(Self::with_client(client, settings.discovery_url()))
    }

    pub fn with_client(client: Client, discovery_url: impl Into<String>) -> Self {
        Self {
            client,
            discovery_url: discovery_url.into(),
        }
    }

    pub fn discovery_url(&self) -> &str {
        &self.discovery_url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, KeyFetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| KeyFetchError::Request {
                url: url.to_owned(),
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(KeyFetchError::Status {
                url: url.to_owned(),
                status: response.status().as_u16(),
            });
        }

        response.json().await.map_err(|err| KeyFetchError::Decode {
            url: url.to_owned(),
            message: err.to_string(),
        })
    }

    fn check_jwks_uri(&self, jwks_uri: &str) -> Result<(), KeyFetchError> {
        let require_https = self.discovery_url.starts_with("https://");
        let acceptable = jwks_uri.starts_with("https://")
            || (!require_https && jwks_uri.starts_with("http://"));
        if acceptable {
            Ok(())
        } else {
            Err(KeyFetchError::InvalidJwksUri {
                url: self.discovery_url.clone(),
                jwks_uri: jwks_uri.to_owned(),
            })
        }
    }
}

#[async_trait]
impl SigningKeySource for OidcDiscoveryClient {
    async fn fetch_signing_keys(&self) -> Result<SigningKeySet, KeyFetchError> {
        let discovery: DiscoveryDocument = self.get_json(&self.discovery_url).await?;
        self.check_jwks_uri(&discovery.jwks_uri)?;
        debug!(jwks_uri = %discovery.jwks_uri, "resolved JWKS location from discovery document");

        let body: JwksResponse = self.get_json(&discovery.jwks_uri).await?;

        let mut keys = Vec::with_capacity(body.keys.len());
        for entry in body.keys {
            let jwk: Jwk = match serde_json::from_value(entry) {
                Ok(jwk) => jwk,
                Err(err) => {
                    warn!(error = %err, jwks_uri = %discovery.jwks_uri, "skipping unparseable JWK");
                    continue;
                }
            };
            match SigningKey::from_jwk(&jwk) {
                Some(Ok(key)) => keys.push(key),
                Some(Err(err)) => {
                    warn!(
                        kid = ?jwk.common.key_id,
                        error = %err,
                        "skipping JWK that cannot be used for verification"
                    );
                }
                None => {
                    debug!(kid = ?jwk.common.key_id, "ignoring non-signing JWK");
                }
            }
        }

        if keys.is_empty() {
            return Err(KeyFetchError::NoUsableKeys {
                url: discovery.jwks_uri,
            });
        }

        Ok(SigningKeySet::new(keys))
    }
}

/// Only the discovery fields needed to locate the signing keys.
#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<serde_json::Value>,
}
