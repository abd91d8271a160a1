use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::UserResponse;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@dev.zo")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "correct horse battery", min_length = 8)]
    pub password: String,

    #[validate(length(min = 1, max = 64, message = "Username must be 1-64 characters"))]
    #[schema(example = "alice")]
    pub username: Option<String>,

    #[validate(length(max = 128, message = "Display name is too long"))]
    #[schema(example = "Alice Liddell")]
    pub display_name: Option<String>,

    /// Token from an invitation link.
    pub invitation_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@dev.zo")]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "correct horse battery")]
    pub password: String,
}

/// Local session established; the token itself is only in the cookie.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: UserResponse,
    pub expiry_utc: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EmailRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "alice@dev.zo")]
    pub email: String,
}

/// Display-only view of a hosted session; not authoritative.
#[derive(Debug, Serialize, ToSchema)]
pub struct DisplayUser {
    pub id: String,
    #[schema(example = "alice@dev.zo")]
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SignInResponse {
    pub user: Option<DisplayUser>,
    #[schema(example = 3600)]
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MeResponse {
    pub user_id: Uuid,
    #[schema(example = "alice@dev.zo")]
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// `opaque_session` or `bearer`
    #[schema(example = "opaque_session")]
    pub source: String,
    pub is_admin: bool,
}
