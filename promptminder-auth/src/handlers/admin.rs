use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        admin::{
            AdminCheckResponse, InvalidateSessionsResponse, SetAdminRequest, SetAdminResponse,
            UserListResponse,
        },
        ErrorResponse,
    },
    middleware::CurrentIdentity,
    services::AuthzError,
    utils::ValidatedJson,
    AppState,
};

/// Admin status of the caller
#[utoipa::path(
    get,
    path = "/api/admin/check",
    responses(
        (status = 200, description = "Admin flags for the caller", body = AdminCheckResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse)
    ),
    tag = "Admin",
    security(
        ("session_cookie" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn check(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<impl IntoResponse, AppError> {
    let identity = identity.ok_or(AuthzError::Unauthenticated)?;

    Ok(Json(AdminCheckResponse {
        is_admin: state.admin.is_admin(&identity),
        is_super_admin: state.admin.verify_super_admin(&identity),
    }))
}

/// List users
#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All users", body = UserListResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 403, description = "Admin required", body = ErrorResponse)
    ),
    tag = "Admin",
    security(
        ("session_cookie" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<impl IntoResponse, AppError> {
    state.admin.require_admin(identity.as_ref())?;

    let users = state.users.list_users().await?;

    Ok(Json(UserListResponse {
        users: users.into_iter().map(|u| u.sanitized()).collect(),
    }))
}

/// Grant or revoke the persisted admin flag
#[utoipa::path(
    patch,
    path = "/api/admin/users/{user_id}/admin",
    params(
        ("user_id" = Uuid, Path, description = "Target user")
    ),
    request_body = SetAdminRequest,
    responses(
        (status = 200, description = "Flag updated", body = SetAdminResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 403, description = "Super-admin required", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    tag = "Admin",
    security(
        ("session_cookie" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn set_admin(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(user_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<SetAdminRequest>,
) -> Result<impl IntoResponse, AppError> {
    let actor = state.admin.require_super_admin(identity.as_ref())?;

    if !state.users.set_admin_flag(user_id, req.is_admin).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
    }

    tracing::info!(
        actor_user_id = %actor.user_id(),
        target_user_id = %user_id,
        is_admin = req.is_admin,
        "Admin flag updated"
    );

    Ok(Json(SetAdminResponse {
        user_id,
        is_admin: req.is_admin,
    }))
}

/// Invalidate every session of a user
#[utoipa::path(
    post,
    path = "/api/admin/users/{user_id}/sessions/invalidate",
    params(
        ("user_id" = Uuid, Path, description = "Target user")
    ),
    responses(
        (status = 200, description = "Sessions removed", body = InvalidateSessionsResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 403, description = "Super-admin required", body = ErrorResponse)
    ),
    tag = "Admin",
    security(
        ("session_cookie" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn invalidate_sessions(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let actor = state.admin.require_super_admin(identity.as_ref())?;

    let removed = state.sessions.invalidate_all_for_user(user_id).await?;

    tracing::info!(
        actor_user_id = %actor.user_id(),
        target_user_id = %user_id,
        removed,
        "User sessions invalidated"
    );

    Ok(Json(InvalidateSessionsResponse { user_id, removed }))
}
