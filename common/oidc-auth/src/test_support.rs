use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::rand_core::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::Serialize;
use serde_json::{json, Value};

pub(crate) struct KeyMaterial {
    pub encoding: EncodingKey,
    pub modulus: String,
    pub exponent: String,
}

impl KeyMaterial {
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let public_key = private_key.to_public_key();
        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("private pem");

        Self {
            encoding: EncodingKey::from_rsa_pem(private_pem.as_bytes()).expect("encoding key"),
            modulus: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            exponent: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    /// RSA key generation is slow in debug builds; share one key per test binary.
    pub fn shared() -> &'static Self {
        static MATERIAL: OnceLock<KeyMaterial> = OnceLock::new();
        MATERIAL.get_or_init(Self::generate)
    }

    pub fn jwk(&self, kid: &str) -> Value {
        json!({
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": kid,
            "n": self.modulus,
            "e": self.exponent
        })
    }

    pub fn sign<T: Serialize>(&self, kid: Option<&str>, claims: &T) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_owned);
        encode(&header, claims, &self.encoding).expect("sign token")
    }
}

#[derive(Serialize)]
pub(crate) struct TestClaims {
    sub: String,
    iss: String,
    aud: String,
    exp: i64,
    iat: i64,
}

impl TestClaims {
    pub fn valid(issuer: &str, audience: &str) -> Self {
        let issued_at = Utc::now().timestamp();
        Self {
            sub: "user-123".into(),
            iss: issuer.into(),
            aud: audience.into(),
            exp: issued_at + 600,
            iat: issued_at,
        }
    }

    pub fn expired(issuer: &str, audience: &str) -> Self {
        let issued_at = Utc::now().timestamp() - 3600;
        Self {
            exp: issued_at + 600,
            iat: issued_at,
            ..Self::valid(issuer, audience)
        }
    }
}
