//! In-memory store for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::store::{InvitationStore, SessionLookup, SessionStore, StoreError, UserStore};
use crate::models::{Invitation, InvitationEvent, InvitationStatus, SessionRecord, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<String, SessionRecord>,
    invitations: HashMap<Uuid, Invitation>,
}

/// All tables behind one mutex, so every operation is serialized.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail, as if the database went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Remove a user row directly, leaving its sessions behind.
    pub fn remove_user_row(&self, user_id: Uuid) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.users.remove(&user_id);
        }
    }

    pub fn session_count(&self) -> usize {
        self.tables.lock().map(|t| t.sessions.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".to_string()))
    }
}

fn email_taken(tables: &Tables, email: &str) -> bool {
    tables
        .users
        .values()
        .any(|u| u.email.eq_ignore_ascii_case(email))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if email_taken(&tables, &user.email) {
            return Err(StoreError::Conflict("Email already registered".to_string()));
        }
        tables.users.insert(user.user_id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.lock()?.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_utc.cmp(&b.created_utc).then(a.email.cmp(&b.email)));
        Ok(users)
    }

    async fn set_admin_flag(&self, user_id: Uuid, is_admin: bool) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.users.get_mut(&user_id) {
            Some(user) => {
                user.is_admin = is_admin;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.sessions.contains_key(&record.token_hash) {
            return Err(StoreError::Conflict("Session token collision".to_string()));
        }
        tables
            .sessions
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SessionLookup>, StoreError> {
        let tables = self.lock()?;
        let Some(record) = tables
            .sessions
            .get(token_hash)
            .filter(|r| r.is_valid_at(now))
        else {
            return Ok(None);
        };

        Ok(Some(match tables.users.get(&record.user_id) {
            Some(user) => SessionLookup::Active(user.clone()),
            None => SessionLookup::Orphaned {
                user_id: record.user_id,
            },
        }))
    }

    async fn delete_session(&self, token_hash: &str) -> Result<u64, StoreError> {
        Ok(self.lock()?.sessions.remove(token_hash).map_or(0, |_| 1))
    }

    async fn delete_sessions_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, r| r.user_id != user_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.sessions.len();
        tables.sessions.retain(|_, r| r.is_valid_at(now));
        Ok((before - tables.sessions.len()) as u64)
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StoreError> {
        self.lock()?
            .invitations
            .insert(invitation.invitation_id, invitation.clone());
        Ok(())
    }

    async fn find_invitation_by_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<Invitation>, StoreError> {
        Ok(self
            .lock()?
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    async fn find_invitation_by_id(
        &self,
        invitation_id: Uuid,
    ) -> Result<Option<Invitation>, StoreError> {
        Ok(self.lock()?.invitations.get(&invitation_id).cloned())
    }

    async fn update_pending_invitation_status(
        &self,
        invitation_id: Uuid,
        status: InvitationStatus,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        match tables.invitations.get_mut(&invitation_id) {
            Some(invitation) if invitation.status == InvitationStatus::Pending => {
                invitation.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn accept_with_user(
        &self,
        token_hash: &str,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<Invitation, StoreError> {
        let mut tables = self.lock()?;

        let mut invitation = tables
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash)
            .cloned()
            .ok_or(StoreError::NotFound)?;

        invitation.transition(InvitationEvent::Accept, now)?;

        if email_taken(&tables, &user.email) {
            return Err(StoreError::Conflict("Email already registered".to_string()));
        }

        tables.users.insert(user.user_id, user.clone());
        tables
            .invitations
            .insert(invitation.invitation_id, invitation.clone());

        Ok(invitation)
    }
}
