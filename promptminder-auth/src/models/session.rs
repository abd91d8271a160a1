//! Session model - opaque local sessions.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted session. Only the hash of the token is stored.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(token_hash: String, user_id: Uuid, now: DateTime<Utc>, ttl_days: i64) -> Self {
        Self {
            token_hash,
            user_id,
            created_utc: now,
            expiry_utc: now + Duration::days(ttl_days),
        }
    }

    /// Valid strictly before the expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expiry_utc
    }
}

/// A freshly issued session: the raw token goes to the client exactly once.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub record: SessionRecord,
}
