use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{LoginRequest, MeResponse, SessionResponse},
        ErrorResponse, MessageResponse,
    },
    middleware::RequireIdentity,
    services::identity::IdentitySource,
    utils::{
        cookies::{clear_auth_cookies, non_empty_cookie, session_cookie, SESSION_COOKIE},
        Password, ValidatedJson,
    },
    AppState,
};

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; session cookie set", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, session) = state
        .auth
        .login(&req.email, &Password::new(req.password))
        .await?;

    let jar = jar.add(session_cookie(session.token, state.config.secure_cookies()));

    Ok((
        StatusCode::OK,
        jar,
        Json(SessionResponse {
            user: user.sanitized(),
            expiry_utc: session.record.expiry_utc,
        }),
    ))
}

/// Logout and clear all auth cookies
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let token = non_empty_cookie(&jar, SESSION_COOKIE);

    // Cookies are cleared even if the session row could not be removed.
    if let Err(e) = state.auth.logout(token.as_deref()).await {
        tracing::error!(error = %e, "Failed to invalidate session on logout");
    }

    (
        StatusCode::OK,
        clear_auth_cookies(jar),
        Json(MessageResponse::new("Logged out successfully")),
    )
}

/// Current identity
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Authenticated identity", body = MeResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn me(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: identity.user_id(),
        email: identity.email().to_string(),
        display_name: identity.display_name().map(str::to_string),
        avatar_url: identity.avatar_url().map(str::to_string),
        source: match identity.source() {
            IdentitySource::OpaqueSession => "opaque_session",
            IdentitySource::Bearer => "bearer",
        }
        .to_string(),
        is_admin: state.admin.is_admin(&identity),
    })
}
