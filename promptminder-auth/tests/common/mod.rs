//! Test harness for promptminder-auth integration tests.
//!
//! Builds the real router over the in-memory store, a manual clock and the
//! mock email and hosted-provider backends. Requests go through
//! `tower::ServiceExt::oneshot`; no sockets are opened.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use promptminder_auth::{
    build_router,
    config::AuthConfig,
    models::User,
    services::{
        HostedAuthProvider, ManualClock, MemoryStore, MockEmailService, MockHostedAuth, UserStore,
    },
    utils::{hash_password, Password},
    AppState, Backends,
};
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-provider-jwt-secret";
pub const TEST_PASSWORD: &str = "correct-horse-battery";
pub const SUPER_ADMIN_EMAIL: &str = "root@dev.zo";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryStore,
    pub email: MockEmailService,
    pub hosted: MockHostedAuth,
    pub clock: ManualClock,
}

pub fn test_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.log_level = "error".to_string();
    config.jwt_secret = Some(Secret::new(TEST_JWT_SECRET.to_string()));
    config.access.admin_usernames = vec!["root".to_string()];
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AuthConfig) -> Self {
        Self::build(config, true)
    }

    /// No hosted provider wired in.
    pub fn without_hosted() -> Self {
        Self::build(test_config(), false)
    }

    fn build(config: AuthConfig, with_hosted: bool) -> Self {
        let store = MemoryStore::new();
        let email = MockEmailService::new();
        let hosted = MockHostedAuth::new(TEST_JWT_SECRET)
            .with_account("hosted@dev.zo", TEST_PASSWORD);
        let clock = ManualClock::new(Utc::now());

        let provider: Option<Arc<dyn HostedAuthProvider>> = if with_hosted {
            Some(Arc::new(hosted.clone()))
        } else {
            None
        };

        let backends = Backends::from_store(
            store.clone(),
            Arc::new(email.clone()),
            provider,
            Arc::new(clock.clone()),
        );
        let state = AppState::new(config, backends);
        let router = build_router(state.clone()).expect("Failed to build router");

        Self {
            router,
            state,
            store,
            email,
            hosted,
            clock,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        self.send(request(Method::GET, uri, None, cookie)).await
    }

    pub async fn post(&self, uri: &str, body: Value, cookie: Option<&str>) -> Response<Body> {
        self.send(request(Method::POST, uri, Some(body), cookie))
            .await
    }

    pub async fn patch(&self, uri: &str, body: Value, cookie: Option<&str>) -> Response<Body> {
        self.send(request(Method::PATCH, uri, Some(body), cookie))
            .await
    }

    pub async fn delete(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        self.send(request(Method::DELETE, uri, None, cookie)).await
    }

    /// Register through the API and return the `Cookie` header value for
    /// the new session.
    pub async fn register(&self, email: &str) -> String {
        let response = self
            .post(
                "/api/auth/register",
                json!({ "email": email, "password": TEST_PASSWORD }),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED, "register {email}");
        session_cookie_header(&response)
    }

    /// Insert a user directly, bypassing the domain policy.
    pub async fn seed_user(&self, email: &str, is_admin: bool) -> User {
        let hash = hash_password(&Password::new(TEST_PASSWORD.to_string()));
        let mut user = User::new(email, None, None, Some(hash.into_string()), Utc::now());
        user.is_admin = is_admin;
        self.store
            .insert_user(&user)
            .await
            .expect("Failed to seed user");
        user
    }

    /// Seed a user and log in, returning the `Cookie` header value.
    pub async fn login_as(&self, email: &str, is_admin: bool) -> (User, String) {
        let user = self.seed_user(email, is_admin).await;
        let response = self
            .post(
                "/api/auth/login",
                json!({ "email": email, "password": TEST_PASSWORD }),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "login {email}");
        (user, session_cookie_header(&response))
    }
}

pub fn request(
    method: Method,
    uri: &str,
    body: Option<Value>,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// Every `Set-Cookie` header whose cookie is called `name`.
pub fn set_cookies(response: &Response<Body>, name: &str) -> Vec<String> {
    let prefix = format!("{name}=");
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| v.starts_with(&prefix))
        .map(str::to_string)
        .collect()
}

/// Value of the cookie called `name` set by the response.
pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookies(response, name).first().and_then(|raw| {
        raw.split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value.to_string())
    })
}

pub fn session_cookie_header(response: &Response<Body>) -> String {
    let token = cookie_value(response, "session_token").expect("No session cookie set");
    format!("session_token={token}")
}
