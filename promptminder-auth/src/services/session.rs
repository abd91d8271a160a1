//! Opaque local sessions.

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use super::clock::Clock;
use super::store::{SessionLookup, SessionStore, StoreError};
use crate::models::{IssuedSession, SessionRecord, User};
use crate::utils::{create_token, hash_token};

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ttl_days: i64,
}

impl SessionService {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, ttl_days: i64) -> Self {
        Self {
            store,
            clock,
            ttl_days,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::days(self.ttl_days)
    }

    /// Create and persist a session for `user_id`.
    pub async fn issue(&self, user_id: Uuid) -> Result<IssuedSession, StoreError> {
        let token = create_token();
        let record = SessionRecord::new(hash_token(&token), user_id, self.clock.now(), self.ttl_days);

        self.store.insert_session(&record).await?;

        tracing::info!(user_id = %user_id, expiry_utc = %record.expiry_utc, "Session issued");
        Ok(IssuedSession { token, record })
    }

    /// The user owning a live session, or `None`.
    ///
    /// Never errors: store failures and sessions whose user row is missing
    /// are logged and resolve to `None`.
    pub async fn resolve(&self, token: &str) -> Option<User> {
        if token.is_empty() {
            return None;
        }

        match self
            .store
            .find_session_user(&hash_token(token), self.clock.now())
            .await
        {
            Ok(Some(SessionLookup::Active(user))) => Some(user),
            Ok(Some(SessionLookup::Orphaned { user_id })) => {
                tracing::warn!(user_id = %user_id, "Session references a missing user");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!(error = %e, "Session lookup failed");
                None
            }
        }
    }

    /// Remove one session. Unknown tokens remove nothing.
    pub async fn invalidate(&self, token: &str) -> Result<u64, StoreError> {
        self.store.delete_session(&hash_token(token)).await
    }

    /// Remove every session of a user.
    pub async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let removed = self.store.delete_sessions_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, removed = removed, "Sessions invalidated");
        Ok(removed)
    }

    /// Best-effort removal of expired sessions.
    pub async fn purge_expired(&self) -> u64 {
        match self.store.delete_expired_sessions(self.clock.now()).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::debug!(removed = removed, "Expired sessions purged");
                }
                removed
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to purge expired sessions");
                0
            }
        }
    }
}
