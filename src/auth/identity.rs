//! Caller identity classification from the `Authorization` header.
//!
//! Classification never decides admission and never fails: anything that is
//! not a recognisable credential degrades to [`AuthType::None`].

use std::fmt;
use std::sync::Arc;

use axum::http::Request;
use axum::http::header::AUTHORIZATION;

use super::token::TokenVerifier;
use super::{API_KEY_PREFIX, BEARER_PREFIX};

/// Number of API key characters used to bucket rate limits.
const API_KEY_IDENTIFIER_CHARS: usize = 16;

/// How the caller authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthType {
    #[default]
    None,
    Bearer,
    ApiKey,
}

impl AuthType {
    pub const fn as_str(self) -> &'static str {
        match self {
            AuthType::None => "none",
            AuthType::Bearer => "bearer",
            AuthType::ApiKey => "api_key",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request authentication summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInfo {
    pub auth_type: AuthType,
    pub user_id: Option<String>,
    pub service_name: Option<String>,
    pub is_service: bool,
}

impl AuthInfo {
    /// Anonymous caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Non-service caller holding a verified bearer token.
    pub fn is_user_session(&self) -> bool {
        self.auth_type == AuthType::Bearer && !self.is_service
    }
}

/// Rate-limit bucket for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitIdentity {
    pub identifier: String,
    pub is_service: bool,
    /// Label for logs: `user`, `api_key` or `service`.
    pub client_type: &'static str,
}

/// Classifies callers by inspecting their bearer credential.
#[derive(Clone)]
pub struct IdentityClassifier {
    verifier: Arc<dyn TokenVerifier>,
}

impl IdentityClassifier {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// The verifier used for bearer tokens.
    pub fn verifier(&self) -> &Arc<dyn TokenVerifier> {
        &self.verifier
    }

    /// Classify a raw `Authorization` header value.
    pub fn classify(&self, header: Option<&str>) -> AuthInfo {
        let Some(token) = bearer_token(header) else {
            return AuthInfo::anonymous();
        };

        if is_api_key(token) {
            // Key owner lookup belongs to the key store
            return AuthInfo {
                auth_type: AuthType::ApiKey,
                is_service: true,
                ..AuthInfo::default()
            };
        }

        let Ok(claims) = self.verifier.verify(token) else {
            return AuthInfo::anonymous();
        };

        if claims.is_service_token() {
            AuthInfo {
                auth_type: AuthType::Bearer,
                service_name: claims.sub,
                is_service: true,
                ..AuthInfo::default()
            }
        } else {
            AuthInfo {
                auth_type: AuthType::Bearer,
                user_id: claims.id,
                ..AuthInfo::default()
            }
        }
    }

    /// Classify the `Authorization` header of a request.
    pub fn classify_request<B>(&self, req: &Request<B>) -> AuthInfo {
        self.classify(authorization_header(req))
    }

    /// Derive the rate-limit bucket for a request.
    ///
    /// API keys bucket on their prefix, verified service tokens on their
    /// subject, and everything else on the client address.
    pub fn rate_limit_identity(
        &self,
        header: Option<&str>,
        info: &AuthInfo,
        client_ip: &str,
    ) -> RateLimitIdentity {
        match (info.auth_type, bearer_token(header)) {
            (AuthType::ApiKey, Some(token)) => RateLimitIdentity {
                identifier: api_key_identifier(token),
                is_service: true,
                client_type: "api_key",
            },
            (AuthType::Bearer, _) if info.is_service => match info.service_name.as_deref() {
                Some(name) if !name.is_empty() => RateLimitIdentity {
                    identifier: name.to_string(),
                    is_service: true,
                    client_type: "service",
                },
                _ => ip_identity(client_ip),
            },
            _ => ip_identity(client_ip),
        }
    }
}

fn ip_identity(client_ip: &str) -> RateLimitIdentity {
    RateLimitIdentity {
        identifier: client_ip.to_string(),
        is_service: false,
        client_type: "user",
    }
}

/// Extract the raw `Authorization` header as a string, if valid UTF-8.
pub fn authorization_header<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Extract the token from a `Bearer <token>` header.
///
/// Returns `None` for a missing header, another scheme, or an empty token.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .filter(|token| !token.is_empty())
}

fn is_api_key(token: &str) -> bool {
    token
        .strip_prefix(API_KEY_PREFIX)
        .is_some_and(|rest| !rest.is_empty())
}

fn api_key_identifier(token: &str) -> String {
    let prefix: String = token.chars().take(API_KEY_IDENTIFIER_CHARS).collect();
    format!("api-key-{prefix}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Claims};

    /// Verifier that accepts exactly one token and returns fixed claims.
    struct FixedVerifier {
        token: &'static str,
        claims: Claims,
    }

    impl TokenVerifier for FixedVerifier {
        fn verify(&self, token: &str) -> Result<Claims, AuthError> {
            if token == self.token {
                Ok(self.claims.clone())
            } else {
                Err(AuthError::InvalidToken)
            }
        }
    }

    fn classifier(claims: Claims) -> IdentityClassifier {
        IdentityClassifier::new(Arc::new(FixedVerifier {
            token: "good-token",
            claims,
        }))
    }

    #[test]
    fn test_classify_missing_header() {
        let info = classifier(Claims::default()).classify(None);
        assert_eq!(info, AuthInfo::anonymous());
    }

    #[test]
    fn test_classify_non_bearer_scheme() {
        let info = classifier(Claims::default()).classify(Some("Basic dXNlcjpwYXNz"));
        assert_eq!(info.auth_type, AuthType::None);
    }

    #[test]
    fn test_classify_api_key() {
        let info = classifier(Claims::default()).classify(Some("Bearer pk_abc123def456ghi789"));

        assert_eq!(info.auth_type, AuthType::ApiKey);
        assert!(info.is_service);
        assert_eq!(info.user_id, None);
        assert_eq!(info.service_name, None);
    }

    #[test]
    fn test_classify_invalid_token_is_anonymous() {
        let info = classifier(Claims::default()).classify(Some("Bearer forged"));
        assert_eq!(info, AuthInfo::anonymous());
    }

    #[test]
    fn test_classify_service_token() {
        let claims = Claims {
            is_service: Some(true),
            sub: Some("billing".to_string()),
            ..Claims::default()
        };

        let info = classifier(claims).classify(Some("Bearer good-token"));

        assert_eq!(info.auth_type, AuthType::Bearer);
        assert!(info.is_service);
        assert_eq!(info.service_name.as_deref(), Some("billing"));
        assert_eq!(info.user_id, None);
    }

    #[test]
    fn test_classify_user_token() {
        let claims = Claims {
            id: Some("user-42".to_string()),
            ..Claims::default()
        };

        let info = classifier(claims).classify(Some("Bearer good-token"));

        assert_eq!(info.auth_type, AuthType::Bearer);
        assert!(!info.is_service);
        assert_eq!(info.user_id.as_deref(), Some("user-42"));
        assert!(info.is_user_session());
    }

    #[test]
    fn test_classify_user_token_without_id_degrades() {
        let info = classifier(Claims::default()).classify(Some("Bearer good-token"));

        assert_eq!(info.auth_type, AuthType::Bearer);
        assert_eq!(info.user_id, None);
    }

    #[test]
    fn test_rate_limit_identity_for_api_key() {
        let c = classifier(Claims::default());
        let header = Some("Bearer pk_0123456789abcdefXYZ");
        let info = c.classify(header);

        let identity = c.rate_limit_identity(header, &info, "10.0.0.1");

        assert_eq!(identity.identifier, "api-key-pk_0123456789abc");
        assert!(identity.is_service);
        assert_eq!(identity.client_type, "api_key");
    }

    #[test]
    fn test_rate_limit_identity_for_short_api_key() {
        let c = classifier(Claims::default());
        let header = Some("Bearer pk_x");
        let info = c.classify(header);

        assert_eq!(
            c.rate_limit_identity(header, &info, "10.0.0.1").identifier,
            "api-key-pk_x"
        );
    }

    #[test]
    fn test_rate_limit_identity_for_service_token() {
        let c = classifier(Claims {
            is_service: Some(true),
            sub: Some("billing".to_string()),
            ..Claims::default()
        });
        let header = Some("Bearer good-token");
        let info = c.classify(header);

        let identity = c.rate_limit_identity(header, &info, "10.0.0.1");
        assert_eq!(identity.identifier, "billing");
        assert!(identity.is_service);
    }

    #[test]
    fn test_rate_limit_identity_service_without_subject_uses_ip() {
        let c = classifier(Claims {
            is_service: Some(true),
            ..Claims::default()
        });
        let header = Some("Bearer good-token");
        let info = c.classify(header);

        let identity = c.rate_limit_identity(header, &info, "10.0.0.1");
        assert_eq!(identity.identifier, "10.0.0.1");
        assert!(!identity.is_service);
    }

    #[test]
    fn test_rate_limit_identity_for_user_uses_ip() {
        let c = classifier(Claims {
            id: Some("user-42".to_string()),
            ..Claims::default()
        });
        let header = Some("Bearer good-token");
        let info = c.classify(header);

        let identity = c.rate_limit_identity(header, &info, "192.168.1.7");
        assert_eq!(identity.identifier, "192.168.1.7");
        assert_eq!(identity.client_type, "user");
    }

    #[test]
    fn test_bearer_token_requires_content() {
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("bearer abc")), None);
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
    }
}
