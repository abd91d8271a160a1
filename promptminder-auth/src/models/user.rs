//! User model - application accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// User entity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    /// Always lowercased.
    pub email: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// `None` for accounts that only sign in through the hosted provider.
    pub password_hash: Option<String>,
    pub is_admin: bool,
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Create a new non-admin user.
    pub fn new(
        email: &str,
        username: Option<String>,
        display_name: Option<String>,
        password_hash: Option<String>,
        created_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            username,
            display_name,
            avatar_url: None,
            password_hash,
            is_admin: false,
            created_utc,
        }
    }

    /// Convert to sanitized response (no password hash).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    #[schema(example = "alice@dev.zo")]
    pub email: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            username: u.username,
            display_name: u.display_name,
            avatar_url: u.avatar_url,
            is_admin: u.is_admin,
            created_utc: u.created_utc,
        }
    }
}
