//! Shared fixtures for the integration test binaries.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use secrecy::SecretString;
use serde_json::{Value, json};

use gatekeeper::{AppState, Config, IdentityClassifier, InMemoryDatabase, JwtVerifier};

pub const TEST_SECRET: &str = "test_secret_key_minimum_32_chars!";

/// Config with a signing secret and the default limits.
pub fn test_config() -> Config {
    Config {
        auth_secret: Some(SecretString::from(TEST_SECRET)),
        metrics_port: 0,
        ..Config::default()
    }
}

/// Config with small rate limits for exhaustion tests.
pub fn limited_config(ip_max: u32, service_max: u32) -> Config {
    Config {
        rate_limit_ip_max: ip_max,
        rate_limit_ip_window: Duration::from_secs(60),
        rate_limit_service_max: service_max,
        rate_limit_service_window: Duration::from_secs(60),
        ..test_config()
    }
}

pub fn test_state(config: Config) -> AppState {
    let secret = config.require_auth_secret().expect("secret configured").clone();
    let verifier = JwtVerifier::new(&secret).expect("valid secret");
    let classifier = IdentityClassifier::new(Arc::new(verifier));
    AppState::new(config, Arc::new(InMemoryDatabase::default()), classifier)
}

pub fn sign(claims: &Value) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("token signs")
}

/// A user session token valid for an hour.
pub fn user_token(user_id: &str) -> String {
    sign(&json!({
        "ID": user_id,
        "sessionID": "sess-1",
        "provider": "google",
        "providerID": "g-42",
        "exp": Utc::now().timestamp() + 3600,
    }))
}

/// A service token valid for an hour.
pub fn service_token(service: &str) -> String {
    sign(&json!({
        "sub": service,
        "isService": true,
        "exp": Utc::now().timestamp() + 3600,
    }))
}

pub fn expired_token() -> String {
    sign(&json!({
        "ID": "user-1",
        "exp": Utc::now().timestamp() - 3600,
    }))
}
