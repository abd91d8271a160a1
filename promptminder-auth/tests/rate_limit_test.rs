mod common;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, StatusCode},
};
use common::{request, TestApp};
use serde_json::json;
use std::net::SocketAddr;

fn from_ip(method: Method, uri: &str, body: serde_json::Value, ip: &str) -> axum::http::Request<Body> {
    let mut req = request(method, uri, Some(body), None);
    let addr: SocketAddr = format!("{ip}:40000").parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

#[tokio::test]
async fn test_login_is_rate_limited_per_ip() {
    let mut config = common::test_config();
    config.rate_limit.login_attempts = 2;
    let app = TestApp::with_config(config);
    let body = json!({ "email": "nobody@dev.zo", "password": "whatever-password" });

    for _ in 0..2 {
        let response = app
            .send(from_ip(Method::POST, "/api/auth/login", body.clone(), "10.0.0.1"))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let limited = app
        .send(from_ip(Method::POST, "/api/auth/login", body.clone(), "10.0.0.1"))
        .await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key(header::RETRY_AFTER));

    // Another client is unaffected.
    let other = app
        .send(from_ip(Method::POST, "/api/auth/login", body, "10.0.0.2"))
        .await;
    assert_eq!(other.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_email_routes_share_a_limiter() {
    let mut config = common::test_config();
    config.rate_limit.email_attempts = 1;
    let app = TestApp::with_config(config);
    let body = json!({ "email": "hosted@dev.zo" });

    let first = app
        .send(from_ip(Method::POST, "/api/auth/magic-link", body.clone(), "10.0.0.3"))
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .send(from_ip(Method::POST, "/api/auth/password-reset", body, "10.0.0.3"))
        .await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_forwarded_for_header_does_not_bypass_login_limit() {
    let mut config = common::test_config();
    config.rate_limit.login_attempts = 2;
    let app = TestApp::with_config(config);
    let body = json!({ "email": "nobody@dev.zo", "password": "whatever-password" });

    let mut limited = 0;
    for i in 0..20 {
        let mut req = from_ip(Method::POST, "/api/auth/login", body.clone(), "10.0.0.4");
        req.headers_mut()
            .insert("x-forwarded-for", format!("192.0.2.{i}").parse().unwrap());
        if app.send(req).await.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }

    assert_eq!(limited, 18);
}
