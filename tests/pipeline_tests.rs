//! In-process tests of the full router and middleware pipeline.
//!
//! Requests are driven through `tower::ServiceExt::oneshot`, so no socket is
//! bound. Tests that need a client address attach `ConnectInfo` themselves.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::net::SocketAddr;

use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Method, Request, Response, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use gatekeeper::{AuthType, Config, DatabaseService, LimitClass, build_router};
use gatekeeper::middleware::REQUEST_ID_HEADER;
use gatekeeper::middleware::cors::ALLOW_ORIGIN;
use gatekeeper::middleware::rate_limit::{RATE_LIMITED_MESSAGE, RETRY_AFTER_SECS};

use common::{expired_token, limited_config, service_token, test_config, test_state, user_token};

fn request(method: Method, path: &str) -> axum::http::request::Builder {
    Request::builder().method(method).uri(path)
}

/// Request arriving from socket peer `peer` (`ip:port`).
fn from_peer(method: Method, path: &str, peer: &str) -> axum::http::request::Builder {
    let addr: SocketAddr = peer.parse().unwrap();
    request(method, path).extension(ConnectInfo(addr))
}

async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

// =============================================================================
// Routing and auth gate
// =============================================================================

#[tokio::test]
async fn test_health_is_open_and_decorated() {
    let app = build_router(test_state(test_config()));

    let response = send(&app, request(Method::GET, "/api/v1/health").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], ALLOW_ORIGIN);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));

    let body = body_json(response).await;
    assert_eq!(body["status"], "up");
}

#[tokio::test]
async fn test_protected_route_without_token_is_rejected() {
    let app = build_router(test_state(test_config()));

    let response = send(&app, request(Method::GET, "/api/v1/auth/health").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], ALLOW_ORIGIN);
    assert_eq!(body_text(response).await, "Unauthorized");
}

#[tokio::test]
async fn test_protected_route_with_valid_token_is_admitted() {
    let app = build_router(test_state(test_config()));

    let response = send(
        &app,
        request(Method::GET, "/api/v1/auth/health")
            .header(header::AUTHORIZATION, format!("Bearer {}", user_token("user-1")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "up");
    assert_eq!(body["components"]["database"]["status"], "up");
    assert_eq!(body["components"]["google_oauth"]["status"], "up");
    assert_eq!(body["components"]["microsoft_oauth"]["status"], "up");
}

#[tokio::test]
async fn test_auth_health_degraded_when_database_down() {
    let state = test_state(test_config());
    let app = build_router(state.clone());
    state.db.close().unwrap();

    let response = send(
        &app,
        request(Method::GET, "/api/v1/auth/health")
            .header(header::AUTHORIZATION, format!("Bearer {}", user_token("user-1")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["components"]["database"]["status"], "down");
    assert_eq!(body["components"]["google_oauth"]["status"], "up");
}

#[tokio::test]
async fn test_token_without_bearer_prefix_is_rejected() {
    let state = test_state(test_config());
    let app = build_router(state.clone());
    let bare = user_token("user-1");

    // The classifier reads a bare token as anonymous, and the gate agrees
    assert_eq!(state.classifier.classify(Some(&bare)).auth_type, AuthType::None);

    let response = send(
        &app,
        request(Method::GET, "/api/v1/auth/health")
            .header(header::AUTHORIZATION, bare)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_tokens_classify_end_to_end() {
    let state = test_state(test_config());

    let user = state
        .classifier
        .classify(Some(&format!("Bearer {}", user_token("user-1"))));
    assert_eq!(user.auth_type, AuthType::Bearer);
    assert_eq!(user.user_id.as_deref(), Some("user-1"));
    assert!(!user.is_service);
    assert!(user.is_user_session());

    let service = state
        .classifier
        .classify(Some(&format!("Bearer {}", service_token("billing"))));
    assert_eq!(service.auth_type, AuthType::Bearer);
    assert_eq!(service.service_name.as_deref(), Some("billing"));
    assert!(service.is_service);
    assert!(!service.is_user_session());
}

#[tokio::test]
async fn test_expired_and_api_key_credentials_are_rejected() {
    let app = build_router(test_state(test_config()));

    for credential in [format!("Bearer {}", expired_token()), "Bearer pk_live_123".to_string()] {
        let response = send(
            &app,
            request(Method::GET, "/api/v1/auth/health")
                .header(header::AUTHORIZATION, credential)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_unknown_api_path_is_gated_before_fallback() {
    let app = build_router(test_state(test_config()));

    let response = send(&app, request(Method::GET, "/api/v1/missing").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        request(Method::GET, "/api/v1/missing")
            .header(header::AUTHORIZATION, format!("Bearer {}", user_token("user-1")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_api_path_falls_through_to_not_found() {
    let app = build_router(test_state(test_config()));

    let response = send(&app, request(Method::GET, "/dashboard").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], ALLOW_ORIGIN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "not_found");
}

// =============================================================================
// CORS
// =============================================================================

#[tokio::test]
async fn test_preflight_short_circuits_before_auth() {
    let app = build_router(test_state(test_config()));

    let response = send(&app, request(Method::OPTIONS, "/api/v1/auth/health").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], ALLOW_ORIGIN);
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
    assert!(headers.contains_key(header::ACCESS_CONTROL_ALLOW_HEADERS));
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "false");
    assert!(body_text(response).await.is_empty());
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_ip_bucket_rejects_request_over_limit() {
    let app = build_router(test_state(test_config()));

    let logout = || {
        from_peer(Method::POST, "/api/v1/logout", "203.0.113.9:40000")
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..100 {
        assert_eq!(send(&app, logout()).await.status(), StatusCode::OK);
    }

    let response = send(&app, logout()).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], RETRY_AFTER_SECS);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], ALLOW_ORIGIN);
    assert_eq!(body_text(response).await, RATE_LIMITED_MESSAGE);

    // Another port on the same address shares the bucket
    let same_host = from_peer(Method::POST, "/api/v1/logout", "203.0.113.9:40001")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, same_host).await.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different client address has its own bucket
    let other = from_peer(Method::POST, "/api/v1/logout", "198.51.100.7:40000")
        .body(Body::empty())
        .unwrap();
    assert_eq!(send(&app, other).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_spoofed_forwarded_for_shares_peer_bucket() {
    let app = build_router(test_state(limited_config(2, 10)));

    let mut statuses = Vec::new();
    for i in 0..10 {
        let req = from_peer(Method::POST, "/api/v1/logout", "1.2.3.4:5555")
            .header("x-forwarded-for", format!("10.9.9.{i}"))
            .body(Body::empty())
            .unwrap();
        statuses.push(send(&app, req).await.status());
    }

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 2);
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::TOO_MANY_REQUESTS).count(),
        8
    );
}

#[tokio::test]
async fn test_trusted_proxy_reports_client_address() {
    let config = Config {
        trusted_proxies: vec!["10.0.0.0/8".to_string()],
        ..limited_config(1, 10)
    };
    let state = test_state(config);
    let app = build_router(state.clone());

    let via_proxy = |client: &str| {
        from_peer(Method::POST, "/api/v1/logout", "10.0.0.2:8080")
            .header("x-forwarded-for", format!("{client}, 10.0.0.2"))
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&app, via_proxy("203.0.113.1")).await.status(), StatusCode::OK);
    assert_eq!(send(&app, via_proxy("203.0.113.2")).await.status(), StatusCode::OK);
    assert_eq!(
        send(&app, via_proxy("203.0.113.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(state.limiter.request_count("10.0.0.2", LimitClass::Ip), None);
}

#[tokio::test]
async fn test_health_is_exempt_from_rate_limit() {
    let app = build_router(test_state(limited_config(2, 2)));

    for _ in 0..5 {
        let response = send(&app, request(Method::GET, "/api/v1/health").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_service_token_uses_service_bucket() {
    let state = test_state(limited_config(1, 3));
    let app = build_router(state.clone());
    let token = format!("Bearer {}", service_token("billing"));

    let call = || {
        request(Method::GET, "/api/v1/auth/health")
            .header(header::AUTHORIZATION, token.clone())
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..3 {
        assert_eq!(send(&app, call()).await.status(), StatusCode::OK);
    }
    assert_eq!(state.limiter.request_count("billing", LimitClass::Service), Some(3));
    assert_eq!(send(&app, call()).await.status(), StatusCode::TOO_MANY_REQUESTS);

    // The address bucket was never touched by the service calls
    assert_eq!(state.limiter.len(LimitClass::Ip), 0);
    let anonymous = request(Method::POST, "/api/v1/logout").body(Body::empty()).unwrap();
    assert_eq!(send(&app, anonymous).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_runs_before_auth_gate() {
    let app = build_router(test_state(limited_config(1, 1)));

    let first = send(&app, request(Method::GET, "/api/v1/auth/health").body(Body::empty()).unwrap()).await;
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    let second = send(&app, request(Method::GET, "/api/v1/auth/health").body(Body::empty()).unwrap()).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

// =============================================================================
// Audit and sessions
// =============================================================================

#[tokio::test]
async fn test_request_ids_are_unique_and_replace_incoming() {
    let app = build_router(test_state(test_config()));

    let first = send(
        &app,
        request(Method::GET, "/api/v1/health")
            .header(REQUEST_ID_HEADER, "client-chosen")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let second = send(&app, request(Method::GET, "/api/v1/health").body(Body::empty()).unwrap()).await;

    let first_id = first.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
    let second_id = second.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();

    assert_ne!(first_id, "client-chosen");
    assert_ne!(first_id, second_id);
    assert!(uuid::Uuid::parse_str(&first_id).is_ok());
}

#[tokio::test]
async fn test_user_logout_nets_session_gauge_to_zero() {
    let state = test_state(test_config());
    let app = build_router(state.clone());

    let response = send(
        &app,
        request(Method::POST, "/api/v1/logout")
            .header(header::AUTHORIZATION, format!("Bearer {}", user_token("user-1")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "logged_out");
    assert_eq!(state.sessions.current(), 0);
}

#[tokio::test]
async fn test_user_call_to_auth_endpoint_without_logout_opens_session() {
    let state = test_state(test_config());
    let app = build_router(state.clone());

    // /api/v1/renew is an auth endpoint with no handler here
    let response = send(
        &app,
        request(Method::POST, "/api/v1/renew")
            .header(header::AUTHORIZATION, format!("Bearer {}", user_token("user-1")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(state.sessions.current(), 1);
}

#[tokio::test]
async fn test_service_logout_does_not_touch_sessions() {
    let state = test_state(test_config());
    let app = build_router(state.clone());

    let response = send(
        &app,
        request(Method::POST, "/api/v1/logout")
            .header(header::AUTHORIZATION, format!("Bearer {}", service_token("billing")))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.sessions.current(), 0);
}
