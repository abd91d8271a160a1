use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{DisplayUser, EmailRequest, LoginRequest, SignInResponse},
        ErrorResponse, MessageResponse,
    },
    services::decode_display_claims,
    utils::{
        cookies::{access_token_cookie, refresh_token_cookie},
        Password, ValidatedJson,
    },
    AppState,
};

/// Same body for known and unknown accounts.
pub const EMAIL_SENT_MESSAGE: &str =
    "If an account exists for this email, you will receive a link shortly.";

/// Sign in through the hosted provider
#[utoipa::path(
    post,
    path = "/api/auth/sign-in",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in; provider cookies set", body = SignInResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse),
        (status = 503, description = "Provider not configured", body = ErrorResponse)
    ),
    tag = "Hosted Authentication"
)]
pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .auth
        .hosted_sign_in(&req.email, &Password::new(req.password))
        .await?;

    let secure = state.config.secure_cookies();
    let user = decode_display_claims(&session.access_token).map(|claims| DisplayUser {
        id: claims.sub,
        email: claims.email,
        display_name: claims.user_metadata.display_name,
        avatar_url: claims.user_metadata.avatar_url,
    });

    let jar = jar
        .add(access_token_cookie(
            session.access_token,
            session.expires_in,
            secure,
        ))
        .add(refresh_token_cookie(session.refresh_token, secure));

    Ok((
        StatusCode::OK,
        jar,
        Json(SignInResponse {
            user,
            expires_in: session.expires_in,
        }),
    ))
}

/// Email a magic sign-in link
#[utoipa::path(
    post,
    path = "/api/auth/magic-link",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Request accepted", body = MessageResponse),
        (status = 403, description = "Email domain not allowed", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse)
    ),
    tag = "Hosted Authentication"
)]
pub async fn request_magic_link(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.request_magic_link(&req.email).await?;
    Ok((StatusCode::OK, Json(MessageResponse::new(EMAIL_SENT_MESSAGE))))
}

/// Email a password reset link
#[utoipa::path(
    post,
    path = "/api/auth/password-reset",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Request accepted", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 502, description = "Provider failure", body = ErrorResponse)
    ),
    tag = "Hosted Authentication"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.request_password_reset(&req.email).await?;
    Ok((StatusCode::OK, Json(MessageResponse::new(EMAIL_SENT_MESSAGE))))
}
