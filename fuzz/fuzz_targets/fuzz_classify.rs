//! Fuzz testing for caller classification and header parsing.
//!
//! Every function here runs on untrusted header values, so none of them may
//! panic on any input.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the classification fuzz target
//! cargo +nightly fuzz run fuzz_classify
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_classify -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `bearer_token`: `Authorization` prefix stripping
//! - `IdentityClassifier::classify`: API key detection and token verification
//! - `IdentityClassifier::rate_limit_identity`: bucket derivation
//! - `TokenVerifier::validate_authorization`: the auth gate check
//! - `TraceContext::from_traceparent`: W3C trace header parsing

#![no_main]

use std::sync::{Arc, LazyLock};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use secrecy::SecretString;

use gatekeeper::auth::bearer_token;
use gatekeeper::middleware::TraceContext;
use gatekeeper::{IdentityClassifier, JwtVerifier, TokenVerifier};

static CLASSIFIER: LazyLock<IdentityClassifier> = LazyLock::new(|| {
    let secret = SecretString::from("fuzz_secret_key_minimum_32_chars!");
    match JwtVerifier::new(&secret) {
        Ok(verifier) => IdentityClassifier::new(Arc::new(verifier)),
        Err(e) => panic!("fuzz verifier: {e}"),
    }
});

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    authorization: Option<&'a str>,
    client_ip: &'a str,
    traceparent: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let _ = bearer_token(input.authorization);

    let info = CLASSIFIER.classify(input.authorization);
    let identity = CLASSIFIER.rate_limit_identity(input.authorization, &info, input.client_ip);
    assert!(!identity.identifier.is_empty() || input.client_ip.is_empty());

    if let Some(header) = input.authorization {
        let _ = CLASSIFIER.verifier().validate_authorization(header);
    }

    if let Some(ctx) = TraceContext::from_traceparent(input.traceparent) {
        assert_eq!(ctx.trace_id.len(), 32);
        assert_eq!(ctx.parent_id.map(|id| id.len()), Some(16));
    }
});
