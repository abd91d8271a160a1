use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Invitation, InvitationStatus};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateInvitationRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "bob@dev.zo")]
    pub email: String,
}

/// Invitation as seen by its inviter. Never includes the token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvitationResponse {
    pub invitation_id: Uuid,
    #[schema(example = "bob@dev.zo")]
    pub email: String,
    pub status: InvitationStatus,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
}

impl From<&Invitation> for InvitationResponse {
    fn from(invitation: &Invitation) -> Self {
        Self {
            invitation_id: invitation.invitation_id,
            email: invitation.email.clone(),
            status: invitation.status,
            created_utc: invitation.created_utc,
            expiry_utc: invitation.expiry_utc,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InviterSummary {
    pub user_id: Uuid,
    pub display_name: Option<String>,
}

/// Public view of a pending invitation, shown on the invite landing page.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvitationDetailsResponse {
    pub invitation_id: Uuid,
    #[schema(example = "bob@dev.zo")]
    pub email: String,
    pub inviter: InviterSummary,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
}
