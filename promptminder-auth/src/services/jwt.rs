//! Hosted-provider bearer tokens.
//!
//! Two views of the same token: [`DisplayClaims`] are read without checking
//! the signature and only feed UI-facing fields. [`VerifiedClaims`] come out of
//! [`BearerVerifier`] and are the only bearer view an identity is built from.

use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

pub const DEFAULT_AUDIENCE: &str = "authenticated";

/// Provider-side profile metadata carried in the token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, alias = "full_name", alias = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, alias = "picture", skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Display only. Never consulted for authorization.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_admin: bool,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// Unverified claims, for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayClaims {
    pub sub: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Claims whose signature and expiry have been checked.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedClaims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Decode the payload segment without verifying the signature.
///
/// `None` when the token is malformed or lacks a non-empty `sub` or `email`.
pub fn decode_display_claims(token: &str) -> Option<DisplayClaims> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };

    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let mut claims: DisplayClaims = serde_json::from_slice(&bytes).ok()?;

    if claims.sub.is_empty() || claims.email.is_empty() {
        return None;
    }
    claims.email = claims.email.to_lowercase();
    Some(claims)
}

/// HS256 verifier for provider-issued bearer tokens.
#[derive(Clone)]
pub struct BearerVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl BearerVerifier {
    /// A verifier with no secret rejects every token.
    pub fn new(secret: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        if secret.is_none() {
            tracing::warn!("Bearer verification disabled: no JWT secret configured");
        }

        Self {
            key: secret.map(|s| DecodingKey::from_secret(s.as_bytes())),
            validation,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    pub fn verify(&self, token: &str) -> Option<VerifiedClaims> {
        let key = self.key.as_ref()?;

        match decode::<VerifiedClaims>(token, key, &self.validation) {
            Ok(data) if !data.claims.sub.is_empty() && !data.claims.email.is_empty() => {
                let mut claims = data.claims;
                claims.email = claims.email.to_lowercase();
                Some(claims)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "Bearer token rejected");
                None
            }
        }
    }
}
