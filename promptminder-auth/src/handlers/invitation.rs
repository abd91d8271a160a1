use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        invitation::{
            CreateInvitationRequest, InvitationDetailsResponse, InvitationResponse,
            InviterSummary,
        },
        ErrorResponse,
    },
    middleware::RequireIdentity,
    utils::ValidatedJson,
    AppState,
};

/// Invite someone by email
#[utoipa::path(
    post,
    path = "/api/invitations",
    request_body = CreateInvitationRequest,
    responses(
        (status = 201, description = "Invitation created and emailed", body = InvitationResponse),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 502, description = "Invitation stored but email delivery failed", body = ErrorResponse)
    ),
    tag = "Invitations",
    security(
        ("session_cookie" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn create_invitation(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    ValidatedJson(req): ValidatedJson<CreateInvitationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let issued = state.invitations.issue(&identity, &req.email).await?;

    Ok((
        StatusCode::CREATED,
        Json(InvitationResponse::from(&issued.invitation)),
    ))
}

/// Check an invitation token
#[utoipa::path(
    get,
    path = "/api/invitations/{token}",
    params(
        ("token" = String, Path, description = "Invitation token from the emailed link")
    ),
    responses(
        (status = 200, description = "Invitation is pending", body = InvitationDetailsResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse),
        (status = 410, description = "Invitation used, revoked or expired", body = ErrorResponse)
    ),
    tag = "Invitations"
)]
pub async fn get_invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = state.invitations.verify(&token).await?;

    let display_name = match state.users.find_user_by_id(invitation.inviter_user_id).await {
        Ok(Some(inviter)) => inviter.display_name,
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(error = %e, invitation_id = %invitation.invitation_id, "Inviter lookup failed");
            None
        }
    };

    Ok(Json(InvitationDetailsResponse {
        invitation_id: invitation.invitation_id,
        email: invitation.email,
        inviter: InviterSummary {
            user_id: invitation.inviter_user_id,
            display_name,
        },
        created_utc: invitation.created_utc,
        expiry_utc: invitation.expiry_utc,
    }))
}

/// Revoke an invitation
#[utoipa::path(
    delete,
    path = "/api/invitations/{invitation_id}",
    params(
        ("invitation_id" = Uuid, Path, description = "Invitation to revoke")
    ),
    responses(
        (status = 200, description = "Invitation revoked (or already terminal)", body = InvitationResponse),
        (status = 401, description = "Authentication required", body = ErrorResponse),
        (status = 403, description = "Only the inviter or an admin may revoke", body = ErrorResponse),
        (status = 404, description = "Invitation not found", body = ErrorResponse)
    ),
    tag = "Invitations",
    security(
        ("session_cookie" = []),
        ("bearer_auth" = [])
    )
)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    RequireIdentity(identity): RequireIdentity,
    Path(invitation_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = state.invitations.revoke(invitation_id, &identity).await?;
    Ok(Json(InvitationResponse::from(&invitation)))
}
