mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{body_json, TestApp, SUPER_ADMIN_EMAIL, TEST_PASSWORD};
use serde_json::{json, Value};

/// Invite `email` as the caller behind `cookie`; returns the emailed token
/// and the response body.
async fn invite(app: &TestApp, cookie: &str, email: &str) -> (String, Value) {
    let response = app
        .post("/api/invitations", json!({ "email": email }), Some(cookie))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;

    let sent = app.email.sent();
    let last = sent.last().expect("No invitation email sent");
    assert_eq!(last.to, email.to_lowercase());
    let token = last
        .link
        .rsplit('/')
        .next()
        .expect("Link has no token")
        .to_string();
    (token, body)
}

#[tokio::test]
async fn test_create_invitation_requires_identity() {
    let app = TestApp::new();

    let response = app
        .post("/api/invitations", json!({ "email": "new@dev.zo" }), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.email.sent().is_empty());
}

#[tokio::test]
async fn test_invitation_round_trip_through_registration() {
    let app = TestApp::new();
    let (inviter, cookie) = app.login_as("owner@dev.zo", false).await;

    let (token, created) = invite(&app, &cookie, "New@dev.zo").await;
    assert_eq!(created["status"], "pending");
    assert_eq!(created["email"], "new@dev.zo");
    assert!(app.email.sent()[0]
        .link
        .starts_with("http://localhost:3000/invite/"));

    let details = app.get(&format!("/api/invitations/{token}"), None).await;
    assert_eq!(details.status(), StatusCode::OK);
    let details = body_json(details).await;
    assert_eq!(details["email"], "new@dev.zo");
    assert_eq!(details["inviter"]["user_id"], inviter.user_id.to_string());

    let registered = app
        .post(
            "/api/auth/register",
            json!({
                "email": "new@dev.zo",
                "password": TEST_PASSWORD,
                "invitation_token": token
            }),
            None,
        )
        .await;
    assert_eq!(registered.status(), StatusCode::CREATED);

    let reused = app.get(&format!("/api/invitations/{token}"), None).await;
    assert_eq!(reused.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_invitation_cannot_be_accepted_twice() {
    let mut config = common::test_config();
    config.access.invite_only = true;
    let app = TestApp::with_config(config);
    let (_, cookie) = app.login_as("owner@dev.zo", false).await;
    let (token, _) = invite(&app, &cookie, "twice@dev.zo").await;

    let first = app
        .post(
            "/api/auth/register",
            json!({ "email": "twice@dev.zo", "password": TEST_PASSWORD, "invitation_token": token }),
            None,
        )
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .post(
            "/api/auth/register",
            json!({ "email": "twice@dev.zo", "password": TEST_PASSWORD, "invitation_token": token }),
            None,
        )
        .await;
    assert_eq!(second.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_registration_with_mismatched_email_is_rejected() {
    let app = TestApp::new();
    let (_, cookie) = app.login_as("owner@dev.zo", false).await;
    let (token, _) = invite(&app, &cookie, "intended@dev.zo").await;

    let response = app
        .post(
            "/api/auth/register",
            json!({ "email": "other@dev.zo", "password": TEST_PASSWORD, "invitation_token": token }),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing was consumed.
    let details = app.get(&format!("/api/invitations/{token}"), None).await;
    assert_eq!(details.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let app = TestApp::new();

    let response = app.get("/api/invitations/does-not-exist", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_expired_invitation_is_gone() {
    let app = TestApp::new();
    let (_, cookie) = app.login_as("owner@dev.zo", false).await;
    let (token, _) = invite(&app, &cookie, "late@dev.zo").await;

    app.clock.advance(Duration::days(8));

    let response = app.get(&format!("/api/invitations/{token}"), None).await;
    assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_revoke_rules() {
    let app = TestApp::new();
    let (_, owner) = app.login_as("owner@dev.zo", false).await;
    let (_, stranger) = app.login_as("stranger@dev.zo", false).await;
    let (token, created) = invite(&app, &owner, "target@dev.zo").await;
    let id = created["invitation_id"].as_str().unwrap().to_string();
    let uri = format!("/api/invitations/{id}");

    assert_eq!(app.delete(&uri, None).await.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        app.delete(&uri, Some(&stranger)).await.status(),
        StatusCode::FORBIDDEN
    );

    let revoked = app.delete(&uri, Some(&owner)).await;
    assert_eq!(revoked.status(), StatusCode::OK);
    assert_eq!(body_json(revoked).await["status"], "revoked");

    // Revoking again changes nothing.
    let again = app.delete(&uri, Some(&owner)).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(body_json(again).await["status"], "revoked");

    let details = app.get(&format!("/api/invitations/{token}"), None).await;
    assert_eq!(details.status(), StatusCode::GONE);
}

#[tokio::test]
async fn test_admin_may_revoke_any_invitation() {
    let app = TestApp::new();
    let (_, owner) = app.login_as("owner@dev.zo", false).await;
    let (_, admin) = app.login_as(SUPER_ADMIN_EMAIL, false).await;
    let (_, created) = invite(&app, &owner, "target@dev.zo").await;
    let id = created["invitation_id"].as_str().unwrap();

    let response = app
        .delete(&format!("/api/invitations/{id}"), Some(&admin))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_revoke_unknown_invitation_is_not_found() {
    let app = TestApp::new();
    let (_, owner) = app.login_as("owner@dev.zo", false).await;

    let response = app
        .delete(
            &format!("/api/invitations/{}", uuid::Uuid::new_v4()),
            Some(&owner),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
