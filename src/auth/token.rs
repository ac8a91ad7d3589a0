//! Bearer token verification and typed claim extraction.
//!
//! Tokens are HMAC-signed JWTs carrying the claims issued by the login flow:
//!
//! | Claim        | Type   | Meaning                                  |
//! |--------------|--------|------------------------------------------|
//! | `ID`         | string | User identifier                          |
//! | `sessionID`  | string | Session the token belongs to             |
//! | `provider`   | string | OAuth provider that authenticated a user |
//! | `providerID` | string | User identifier at the provider          |
//! | `isService`  | bool   | Token was issued to a service caller     |
//! | `sub`        | string | Service name for service tokens          |
//! | `exp`        | number | Expiry (Unix seconds), optional          |
//!
//! Claims are decoded once at verification time. A claim that is absent or has
//! the wrong JSON type decodes to `None` instead of failing the whole token, so
//! each accessor fails independently with [`AuthError::InvalidToken`].

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::bearer_token;

/// Authentication error kinds.
///
/// None of these reach a client verbatim: classification and gating resolve
/// them to an [`AuthType`](super::AuthType) or a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,

    #[error("empty token")]
    EmptyToken,

    #[error("unknown auth provider")]
    UnknownProvider,

    #[error("auth provider not initialized")]
    ProviderNotInitialized,

    #[error("database service not initialized")]
    DatabaseNotInitialized,

    #[error("auth secret is not set")]
    MissingAuthSecret,
}

/// Decoded payload of a verified bearer token.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Claims {
    #[serde(rename = "ID", default, deserialize_with = "lenient_string")]
    pub id: Option<String>,

    #[serde(rename = "sessionID", default, deserialize_with = "lenient_string")]
    pub session_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub provider: Option<String>,

    #[serde(rename = "providerID", default, deserialize_with = "lenient_string")]
    pub provider_id: Option<String>,

    #[serde(rename = "isService", default, deserialize_with = "lenient_bool")]
    pub is_service: Option<bool>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub sub: Option<String>,

    #[serde(default, deserialize_with = "lenient_i64")]
    pub exp: Option<i64>,
}

impl Claims {
    /// User identifier (`ID` claim).
    pub fn id(&self) -> Result<&str, AuthError> {
        required(&self.id)
    }

    /// Session identifier (`sessionID` claim).
    pub fn session_id(&self) -> Result<&str, AuthError> {
        required(&self.session_id)
    }

    /// OAuth provider name (`provider` claim).
    pub fn provider(&self) -> Result<&str, AuthError> {
        required(&self.provider)
    }

    /// User identifier at the OAuth provider (`providerID` claim).
    pub fn provider_id(&self) -> Result<&str, AuthError> {
        required(&self.provider_id)
    }

    /// Whether the token was issued to a service. Absent or mistyped is `false`.
    pub fn is_service_token(&self) -> bool {
        self.is_service.unwrap_or(false)
    }
}

fn required(claim: &Option<String>) -> Result<&str, AuthError> {
    claim.as_deref().ok_or(AuthError::InvalidToken)
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        _ => None,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        _ => None,
    })
}

/// Verifies bearer tokens and decodes their claims.
///
/// The classifier and the auth gate only depend on this trait; the HMAC
/// implementation is [`JwtVerifier`].
pub trait TokenVerifier: Send + Sync {
    /// Verify signature and expiry, returning the decoded claims.
    fn verify(&self, token: &str) -> Result<Claims, AuthError>;

    /// Validate a raw `Authorization` value of the form `Bearer <token>`.
    ///
    /// Agrees with the classifier: a value it would not read as a bearer
    /// credential is never valid here.
    fn validate_authorization(&self, header: &str) -> bool {
        bearer_token(Some(header)).is_some_and(|token| self.verify(token).is_ok())
    }
}

/// HMAC-signed JWT verifier with a cached decoding key.
///
/// Accepts HS256, HS384 and HS512. Expiry is checked with zero leeway when the
/// token carries `exp`; tokens without `exp` are accepted.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl JwtVerifier {
    /// Build a verifier from the shared signing secret.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingAuthSecret`] if the secret is empty.
    pub fn new(secret: &SecretString) -> Result<Self, AuthError> {
        let secret = secret.expose_secret();
        if secret.is_empty() {
            return Err(AuthError::MissingAuthSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = 0;

        Ok(Self {
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation: Arc::new(validation),
        })
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Bearer token rejected");
                AuthError::InvalidToken
            })
    }
}
