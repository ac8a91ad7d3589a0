//! Caller authentication: token verification and identity classification.

pub mod identity;
pub mod token;

pub use identity::{
    AuthInfo, AuthType, IdentityClassifier, RateLimitIdentity, authorization_header, bearer_token,
};
pub use token::{AuthError, Claims, JwtVerifier, TokenVerifier};

/// Scheme prefix of the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Prefix that marks a bearer token as an API key.
pub const API_KEY_PREFIX: &str = "pk_";
