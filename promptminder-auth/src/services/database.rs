//! PostgreSQL store.
//!
//! Expected tables (migrations are managed outside this service):
//!
//! ```sql
//! CREATE TABLE users (
//!     user_id UUID PRIMARY KEY,
//!     email TEXT NOT NULL UNIQUE,
//!     username TEXT,
//!     display_name TEXT,
//!     avatar_url TEXT,
//!     password_hash TEXT,
//!     is_admin BOOLEAN NOT NULL DEFAULT FALSE,
//!     created_utc TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE sessions (
//!     token_hash TEXT PRIMARY KEY,
//!     user_id UUID NOT NULL,
//!     created_utc TIMESTAMPTZ NOT NULL,
//!     expiry_utc TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE invitations (
//!     invitation_id UUID PRIMARY KEY,
//!     email TEXT NOT NULL,
//!     inviter_user_id UUID NOT NULL,
//!     status_code TEXT NOT NULL,
//!     token_hash TEXT NOT NULL UNIQUE,
//!     created_utc TIMESTAMPTZ NOT NULL,
//!     expiry_utc TIMESTAMPTZ NOT NULL,
//!     accepted_utc TIMESTAMPTZ
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::store::{InvitationStore, SessionLookup, SessionStore, StoreError, UserStore};
use crate::models::{Invitation, InvitationEvent, InvitationRow, InvitationStatus, SessionRecord, User};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Session joined to a possibly missing user row.
#[derive(FromRow)]
struct SessionUserRow {
    session_user_id: Uuid,
    user_id: Option<Uuid>,
    email: Option<String>,
    username: Option<String>,
    display_name: Option<String>,
    avatar_url: Option<String>,
    password_hash: Option<String>,
    is_admin: Option<bool>,
    created_utc: Option<DateTime<Utc>>,
}

impl SessionUserRow {
    fn into_lookup(self) -> SessionLookup {
        match (self.user_id, self.email, self.is_admin, self.created_utc) {
            (Some(user_id), Some(email), Some(is_admin), Some(created_utc)) => {
                SessionLookup::Active(User {
                    user_id,
                    email,
                    username: self.username,
                    display_name: self.display_name,
                    avatar_url: self.avatar_url,
                    password_hash: self.password_hash,
                    is_admin,
                    created_utc,
                })
            }
            _ => SessionLookup::Orphaned {
                user_id: self.session_user_id,
            },
        }
    }
}

fn map_unique(e: sqlx::Error, what: &str) -> StoreError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(format!("{} already exists", what))
        }
        _ => StoreError::Database(e),
    }
}

fn invitation_from_row(row: InvitationRow) -> Result<Invitation, StoreError> {
    Invitation::try_from(row).map_err(|e| StoreError::Database(sqlx::Error::Decode(e.into())))
}

const USER_COLUMNS: &str =
    "user_id, email, username, display_name, avatar_url, password_hash, is_admin, created_utc";

const INVITATION_COLUMNS: &str = "invitation_id, email, inviter_user_id, status_code, token_hash, created_utc, expiry_utc, accepted_utc";

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url))]
    pub async fn connect(
        database_url: &Secret<String>,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        info!(max_connections = max_connections, "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url.expose_secret())
            .await?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for Database {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, username, display_name, avatar_url, password_hash, is_admin, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(user.created_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "User"))?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(
            sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_utc, email",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn set_admin_flag(&self, user_id: Uuid, is_admin: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE users SET is_admin = $1 WHERE user_id = $2")
            .bind(is_admin)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            StoreError::Database(e)
        })?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, created_utc, expiry_utc)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(record.created_utc)
        .bind(record.expiry_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "Session"))?;
        Ok(())
    }

    async fn find_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionLookup>, StoreError> {
        let row = sqlx::query_as::<_, SessionUserRow>(
            r#"
            SELECT s.user_id AS session_user_id,
                   u.user_id, u.email, u.username, u.display_name, u.avatar_url,
                   u.password_hash, u.is_admin, u.created_utc
            FROM sessions s
            LEFT JOIN users u ON u.user_id = s.user_id
            WHERE s.token_hash = $1 AND s.expiry_utc > $2
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SessionUserRow::into_lookup))
    }

    async fn delete_session(&self, token_hash: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expiry_utc <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl InvitationStore for Database {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invitations (invitation_id, email, inviter_user_id, status_code, token_hash, created_utc, expiry_utc, accepted_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(invitation.invitation_id)
        .bind(&invitation.email)
        .bind(invitation.inviter_user_id)
        .bind(invitation.status.as_str())
        .bind(&invitation.token_hash)
        .bind(invitation.created_utc)
        .bind(invitation.expiry_utc)
        .bind(invitation.accepted_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "Invitation"))?;
        Ok(())
    }

    async fn find_invitation_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {} FROM invitations WHERE token_hash = $1",
            INVITATION_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?
        .map(invitation_from_row)
        .transpose()
    }

    async fn find_invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, StoreError> {
        sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {} FROM invitations WHERE invitation_id = $1",
            INVITATION_COLUMNS
        ))
        .bind(invitation_id)
        .fetch_optional(&self.pool)
        .await?
        .map(invitation_from_row)
        .transpose()
    }

    async fn update_pending_invitation_status(
        &self,
        invitation_id: Uuid,
        status: InvitationStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE invitations SET status_code = $1 WHERE invitation_id = $2 AND status_code = $3",
        )
        .bind(status.as_str())
        .bind(invitation_id)
        .bind(InvitationStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn accept_with_user(
        &self,
        token_hash: &str,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Invitation, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, InvitationRow>(&format!(
            "SELECT {} FROM invitations WHERE token_hash = $1 FOR UPDATE",
            INVITATION_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        let mut invitation = invitation_from_row(row)?;
        invitation.transition(InvitationEvent::Accept, now)?;

        sqlx::query(
            r#"
            INSERT INTO users (user_id, email, username, display_name, avatar_url, password_hash, is_admin, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.avatar_url)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(user.created_utc)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "User"))?;

        sqlx::query(
            "UPDATE invitations SET status_code = $1, accepted_utc = $2 WHERE invitation_id = $3",
        )
        .bind(invitation.status.as_str())
        .bind(invitation.accepted_utc)
        .bind(invitation.invitation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(invitation_id = %invitation.invitation_id, user_id = %user.user_id, "Invitation accepted");
        Ok(invitation)
    }
}
