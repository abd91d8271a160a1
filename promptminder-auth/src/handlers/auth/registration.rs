use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{RegisterRequest, SessionResponse},
        ErrorResponse,
    },
    services::NewAccount,
    utils::{cookies::session_cookie, Password, ValidatedJson},
    AppState,
};

/// Register a local account
///
/// With `invitation_token` the invitation is accepted in the same step.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created; session cookie set", body = SessionResponse),
        (status = 400, description = "Invitation email mismatch", body = ErrorResponse),
        (status = 403, description = "Email domain not allowed or invitation required", body = ErrorResponse),
        (status = 404, description = "Invitation not found", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 410, description = "Invitation used, revoked or expired", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, session) = state
        .auth
        .register(NewAccount {
            email: req.email,
            password: Password::new(req.password),
            username: req.username,
            display_name: req.display_name,
            invitation_token: req.invitation_token.filter(|t| !t.trim().is_empty()),
        })
        .await?;

    let jar = jar.add(session_cookie(session.token, state.config.secure_cookies()));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(SessionResponse {
            user: user.sanitized(),
            expiry_utc: session.record.expiry_utc,
        }),
    ))
}
