#![allow(dead_code)]

use axum::http::{HeaderMap, HeaderValue};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use httpmock::prelude::*;
use httpmock::Mock;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde_json::{json, Value};

pub const AUDIENCE: &str = "api://hello";

/// An RSA signing key as an issuer would hold it.
pub struct IssuerKey {
    pub kid: String,
    encoding: EncodingKey,
    modulus: String,
    exponent: String,
}

impl IssuerKey {
    pub fn generate(kid: &str) -> Self {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("generate rsa key");
        let public_key = private_key.to_public_key();
        let pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("encode private key");

        Self {
            kid: kid.to_string(),
            encoding: EncodingKey::from_rsa_pem(pem.as_bytes()).expect("encoding key"),
            modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": self.kid,
            "n": self.modulus,
            "e": self.exponent
        })
    }

    pub fn token(&self, issuer: &str, audience: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = json!({
            "sub": "user-123",
            "iss": issuer,
            "aud": audience,
            "iat": now,
            "exp": now + 600,
            "scope": "hello.read hello.write"
        });
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        encode(&header, &claims, &self.encoding).expect("sign token")
    }
}

/// Mock OpenID Connect issuer publishing a replaceable JWKS.
pub struct MockIssuer {
    pub server: MockServer,
}

impl MockIssuer {
    pub fn start() -> Self {
        let server = MockServer::start();
        let jwks_uri = server.url("/discovery/keys");
        server.mock(|when, then| {
            when.method(GET).path("/.well-known/openid-configuration");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "issuer": server.url("/"),
                    "jwks_uri": jwks_uri
                }));
        });
        Self { server }
    }

    /// Issuer URL as configured by operators, without trailing slash.
    pub fn issuer_url(&self) -> String {
        self.server.base_url()
    }

    /// Value of the `iss` claim after normalization.
    pub fn issuer_claim(&self) -> String {
        format!("{}/", self.server.base_url())
    }

    pub fn publish(&self, keys: &[&IssuerKey]) -> Mock<'_> {
        let keys = keys.iter().map(|key| key.jwk()).collect::<Vec<_>>();
        self.server.mock(|when, then| {
            when.method(GET).path("/discovery/keys");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "keys": keys }));
        })
    }
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
    );
    headers
}
