use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::UserResponse;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminCheckResponse {
    pub is_admin: bool,
    pub is_super_admin: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SetAdminResponse {
    pub user_id: Uuid,
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InvalidateSessionsResponse {
    pub user_id: Uuid,
    #[schema(example = 2)]
    pub removed: u64,
}
