use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Validated JWT claims handed to the protected endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub subject: Option<String>,
    pub issuer: String,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub raw: serde_json::Value,
}

impl Claims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|value| value == scope)
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    #[serde(default)]
    sub: Option<String>,
    iss: String,
    #[serde(default)]
    aud: Option<AudienceRepr>,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AudienceRepr {
    Single(String),
    Many(Vec<String>),
}

fn timestamp(claim: &'static str, value: i64) -> Result<DateTime<Utc>, ValidationError> {
    Utc.timestamp_opt(value, 0)
        .single()
        .ok_or_else(|| ValidationError::Malformed(format!("invalid {claim} claim '{value}'")))
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = ValidationError;

    fn try_from(value: ClaimsRepr) -> Result<Self, Self::Error> {
        let expires_at = timestamp("exp", value.exp)?;
        let issued_at = value.iat.map(|iat| timestamp("iat", iat)).transpose()?;
        let not_before = value.nbf.map(|nbf| timestamp("nbf", nbf)).transpose()?;

        let audience = match value.aud {
            Some(AudienceRepr::Single(item)) => vec![item],
            Some(AudienceRepr::Many(items)) => items,
            None => Vec::new(),
        };

        let scopes = value
            .scope
            .as_deref()
            .map(|scope| scope.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default();

        Ok(Self {
            subject: value.sub,
            issuer: value.iss,
            audience,
            expires_at,
            issued_at,
            not_before,
            scopes,
            raw: serde_json::Value::Null,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = ValidationError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        let repr: ClaimsRepr = serde_json::from_value(value.clone())
            .map_err(|err| ValidationError::Malformed(format!("claim payload: {err}")))?;
        let mut claims = Claims::try_from(repr)?;
        claims.raw = value;
        Ok(claims)
    }
}
