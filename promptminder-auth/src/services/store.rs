//! Persistence seams: user, session and invitation stores.
//!
//! Implemented by [`Database`](super::Database) for PostgreSQL and by
//! [`MemoryStore`](super::MemoryStore) for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Invitation, InvitationStatus, SessionRecord, TransitionError, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Record not found")]
    NotFound,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            StoreError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            StoreError::NotFound => AppError::NotFound(anyhow::anyhow!("Not found")),
            StoreError::Transition(e) => AppError::Gone(anyhow::anyhow!(e.to_string())),
            StoreError::Unavailable(msg) => AppError::DatabaseError(anyhow::anyhow!(msg)),
        }
    }
}

/// Result of looking up a session by token hash.
#[derive(Debug, Clone)]
pub enum SessionLookup {
    Active(User),
    /// The session row exists but its user row is gone.
    Orphaned { user_id: Uuid },
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive match.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Returns `false` when no such user exists.
    async fn set_admin_flag(&self, user_id: Uuid, is_admin: bool) -> Result<bool, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Non-expired session joined to its user.
    async fn find_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionLookup>, StoreError>;

    async fn delete_session(&self, token_hash: &str) -> Result<u64, StoreError>;

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StoreError>;

    async fn find_invitation_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, StoreError>;

    async fn find_invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, StoreError>;

    /// Move a pending invitation to `status`.
    ///
    /// Returns `false` without writing when the stored invitation is no
    /// longer pending or does not exist.
    async fn update_pending_invitation_status(
        &self,
        invitation_id: Uuid,
        status: InvitationStatus,
    ) -> Result<bool, StoreError>;

    /// Accept the invitation and create the user atomically.
    ///
    /// Fails with [`StoreError::Transition`] when the invitation is not
    /// pending at `now`, and with [`StoreError::Conflict`] when the email is
    /// already registered; neither side effect happens in that case.
    async fn accept_with_user(
        &self,
        token_hash: &str,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Invitation, StoreError>;
}
