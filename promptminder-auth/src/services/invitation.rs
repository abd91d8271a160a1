//! Invitation lifecycle: issue, verify, revoke, accept.

use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::admin::AdminResolver;
use super::clock::Clock;
use super::email::EmailProvider;
use super::identity::Identity;
use super::store::{InvitationStore, StoreError};
use crate::models::{Invitation, InvitationEvent, InvitationStatus, TransitionError, User};
use crate::utils::{create_token, hash_token};

#[derive(Debug, Error)]
pub enum InvitationError {
    #[error("Invitation not found")]
    NotFound,

    #[error("Invitation has already been used")]
    AlreadyUsed,

    #[error("Invitation has been revoked")]
    Revoked,

    #[error("Invitation has expired")]
    Expired,

    #[error("Only the inviter or an admin can revoke this invitation")]
    Forbidden,

    #[error("Email does not match the invitation")]
    EmailMismatch,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error(transparent)]
    Store(StoreError),

    #[error("Invitation email failed: {0}")]
    Upstream(String),
}

impl From<TransitionError> for InvitationError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::AlreadyUsed => InvitationError::AlreadyUsed,
            TransitionError::Revoked => InvitationError::Revoked,
            TransitionError::Expired => InvitationError::Expired,
        }
    }
}

impl From<StoreError> for InvitationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => InvitationError::NotFound,
            StoreError::Transition(t) => t.into(),
            other => InvitationError::Store(other),
        }
    }
}

impl From<InvitationError> for AppError {
    fn from(err: InvitationError) -> Self {
        match err {
            InvitationError::NotFound => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            InvitationError::AlreadyUsed | InvitationError::Revoked | InvitationError::Expired => {
                AppError::Gone(anyhow::anyhow!(err.to_string()))
            }
            InvitationError::Forbidden => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
            InvitationError::EmailMismatch | InvitationError::InvalidEmail => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            InvitationError::Store(e) => e.into(),
            InvitationError::Upstream(msg) => AppError::EmailError(msg),
        }
    }
}

/// A new invitation plus the raw token, which is only ever sent by email.
#[derive(Debug, Clone)]
pub struct IssuedInvitation {
    pub invitation: Invitation,
    pub token: String,
    pub invite_link: String,
}

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn InvitationStore>,
    email: Arc<dyn EmailProvider>,
    admin: AdminResolver,
    clock: Arc<dyn Clock>,
    ttl_days: i64,
    base_url: String,
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn InvitationStore>,
        email: Arc<dyn EmailProvider>,
        admin: AdminResolver,
        clock: Arc<dyn Clock>,
        ttl_days: i64,
        base_url: String,
    ) -> Self {
        Self {
            store,
            email,
            admin,
            clock,
            ttl_days,
            base_url,
        }
    }

    pub fn invite_link(&self, token: &str) -> String {
        format!("{}/invite/{}", self.base_url, token)
    }

    /// Persist a pending invitation, then email the link.
    ///
    /// Duplicate invitations for the same email are allowed. An email
    /// failure leaves the invitation in place and is reported as upstream.
    pub async fn issue(
        &self,
        inviter: &Identity,
        email: &str,
    ) -> Result<IssuedInvitation, InvitationError> {
        let email = email.trim().to_lowercase();
        if !looks_like_email(&email) {
            return Err(InvitationError::InvalidEmail);
        }

        let token = create_token();
        let invitation = Invitation::new(
            &email,
            inviter.user_id(),
            hash_token(&token),
            self.clock.now(),
            self.ttl_days,
        );
        self.store.insert_invitation(&invitation).await?;

        tracing::info!(
            invitation_id = %invitation.invitation_id,
            inviter_user_id = %inviter.user_id(),
            "Invitation issued"
        );

        let invite_link = self.invite_link(&token);
        self.email
            .send_invitation_email(&invitation.email, &invite_link, inviter.email())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, invitation_id = %invitation.invitation_id, "Invitation email failed");
                InvitationError::Upstream(e.to_string())
            })?;

        Ok(IssuedInvitation {
            invitation,
            token,
            invite_link,
        })
    }

    /// Look up an invitation by token and require it to be pending.
    pub async fn verify(&self, token: &str) -> Result<Invitation, InvitationError> {
        let mut invitation = self
            .store
            .find_invitation_by_token(&hash_token(token))
            .await?
            .ok_or(InvitationError::NotFound)?;

        match invitation.effective_status(self.clock.now()) {
            InvitationStatus::Pending => Ok(invitation),
            InvitationStatus::Accepted => Err(InvitationError::AlreadyUsed),
            InvitationStatus::Revoked => Err(InvitationError::Revoked),
            InvitationStatus::Expired => {
                if invitation.status == InvitationStatus::Pending {
                    self.record_expiry(&mut invitation).await;
                }
                Err(match invitation.status {
                    InvitationStatus::Accepted => InvitationError::AlreadyUsed,
                    InvitationStatus::Revoked => InvitationError::Revoked,
                    _ => InvitationError::Expired,
                })
            }
        }
    }

    async fn record_expiry(&self, invitation: &mut Invitation) {
        if invitation
            .transition(InvitationEvent::Expire, self.clock.now())
            .is_err()
        {
            return;
        }

        match self
            .store
            .update_pending_invitation_status(invitation.invitation_id, InvitationStatus::Expired)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                if let Ok(Some(stored)) = self
                    .store
                    .find_invitation_by_id(invitation.invitation_id)
                    .await
                {
                    *invitation = stored;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, invitation_id = %invitation.invitation_id, "Failed to record invitation expiry");
            }
        }
    }

    /// Re-read an invitation whose pending status changed under us.
    async fn reload(&self, invitation_id: Uuid) -> Result<Invitation, InvitationError> {
        self.store
            .find_invitation_by_id(invitation_id)
            .await?
            .ok_or(InvitationError::NotFound)
    }

    /// Revoke an invitation. Only the inviter or an admin may do so;
    /// revoking a terminal invitation changes nothing.
    pub async fn revoke(
        &self,
        invitation_id: Uuid,
        actor: &Identity,
    ) -> Result<Invitation, InvitationError> {
        let mut invitation = self
            .store
            .find_invitation_by_id(invitation_id)
            .await?
            .ok_or(InvitationError::NotFound)?;

        if invitation.inviter_user_id != actor.user_id() && !self.admin.is_admin(actor) {
            tracing::warn!(
                invitation_id = %invitation_id,
                user_id = %actor.user_id(),
                "Invitation revoke denied"
            );
            return Err(InvitationError::Forbidden);
        }

        let before = invitation.status;
        let after = invitation.transition(InvitationEvent::Revoke, self.clock.now())?;
        if after == before {
            return Ok(invitation);
        }

        if self
            .store
            .update_pending_invitation_status(invitation_id, after)
            .await?
        {
            tracing::info!(invitation_id = %invitation_id, status = after.as_str(), "Invitation updated");
            Ok(invitation)
        } else {
            // Accepted or revoked concurrently; the stored terminal state wins.
            let stored = self.reload(invitation_id).await?;
            tracing::info!(
                invitation_id = %invitation_id,
                status = stored.status.as_str(),
                "Invitation already settled"
            );
            Ok(stored)
        }
    }

    /// Accept the invitation and create `new_user` in one transaction.
    pub async fn accept(&self, token: &str, new_user: User) -> Result<User, InvitationError> {
        let invitation = self.verify(token).await?;

        if !invitation.email.eq_ignore_ascii_case(&new_user.email) {
            return Err(InvitationError::EmailMismatch);
        }

        self.store
            .accept_with_user(&hash_token(token), &new_user, self.clock.now())
            .await?;

        Ok(new_user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::admin::AdminAllowList;
    use crate::services::clock::ManualClock;
    use crate::services::email::MockEmailService;
    use crate::services::memory::MemoryStore;
    use crate::services::store::UserStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Accepts the invitation right after it is read by id, so the caller's
    /// follow-up write races a committed accept.
    struct AcceptAfterRead {
        inner: MemoryStore,
        fired: AtomicBool,
    }

    #[async_trait]
    impl InvitationStore for AcceptAfterRead {
        async fn insert_invitation(&self, invitation: &Invitation) -> Result<(), StoreError> {
            self.inner.insert_invitation(invitation).await
        }

        async fn find_invitation_by_token(
            &self,
            token_hash: &str,
        ) -> Result<Option<Invitation>, StoreError> {
            self.inner.find_invitation_by_token(token_hash).await
        }

        async fn find_invitation_by_id(
            &self,
            invitation_id: Uuid,
        ) -> Result<Option<Invitation>, StoreError> {
            let found = self.inner.find_invitation_by_id(invitation_id).await?;
            if let Some(invitation) = &found {
                if !self.fired.swap(true, Ordering::SeqCst) {
                    let user = User::new(&invitation.email, None, None, None, invitation.created_utc);
                    self.inner
                        .accept_with_user(&invitation.token_hash, &user, invitation.created_utc)
                        .await?;
                }
            }
            Ok(found)
        }

        async fn update_pending_invitation_status(
            &self,
            invitation_id: Uuid,
            status: InvitationStatus,
        ) -> Result<bool, StoreError> {
            self.inner
                .update_pending_invitation_status(invitation_id, status)
                .await
        }

        async fn accept_with_user(
            &self,
            token_hash: &str,
            user: &User,
            now: DateTime<Utc>,
        ) -> Result<Invitation, StoreError> {
            self.inner.accept_with_user(token_hash, user, now).await
        }
    }

    struct Fixture {
        service: InvitationService,
        store: MemoryStore,
        clock: ManualClock,
        email: MockEmailService,
        inviter: Identity,
    }

    fn identity(email: &str, is_admin: bool) -> Identity {
        let mut user = User::new(email, None, None, None, Utc::now());
        user.is_admin = is_admin;
        Identity::from_user(&user)
    }

    fn fixture_with_email(email: MockEmailService) -> Fixture {
        let store = MemoryStore::new();
        let clock = ManualClock::new(Utc::now());
        let service = InvitationService::new(
            Arc::new(store.clone()),
            Arc::new(email.clone()),
            AdminResolver::new(AdminAllowList::from_csv("root")),
            Arc::new(clock.clone()),
            7,
            "http://localhost:3000".to_string(),
        );
        Fixture {
            service,
            store,
            clock,
            email,
            inviter: identity("alice@dev.zo", false),
        }
    }

    fn fixture() -> Fixture {
        fixture_with_email(MockEmailService::new())
    }

    #[tokio::test]
    async fn test_issue_sends_link_and_verify_pending() {
        let f = fixture();
        let issued = f.service.issue(&f.inviter, "Bob@Dev.zo").await.unwrap();

        let sent = f.email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "bob@dev.zo");
        assert!(sent[0].link.ends_with(&issued.token));

        let invitation = f.service.verify(&issued.token).await.unwrap();
        assert_eq!(invitation.status, InvitationStatus::Pending);
    }

    #[tokio::test]
    async fn test_verify_unknown_token() {
        let f = fixture();
        assert!(matches!(
            f.service.verify("nope").await,
            Err(InvitationError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_verify_after_expiry() {
        let f = fixture();
        let issued = f.service.issue(&f.inviter, "bob@dev.zo").await.unwrap();

        f.clock.advance(Duration::days(8));

        assert!(matches!(
            f.service.verify(&issued.token).await,
            Err(InvitationError::Expired)
        ));
        let stored = f
            .store
            .find_invitation_by_id(issued.invitation.invitation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvitationStatus::Expired);
    }

    #[tokio::test]
    async fn test_accept_once_then_already_used() {
        let f = fixture();
        let issued = f.service.issue(&f.inviter, "bob@dev.zo").await.unwrap();
        let bob = User::new("bob@dev.zo", None, None, None, f.clock.now());

        let created = f.service.accept(&issued.token, bob.clone()).await.unwrap();
        assert_eq!(created.user_id, bob.user_id);
        assert!(f.store.find_user_by_email("bob@dev.zo").await.unwrap().is_some());

        let again = User::new("bob@dev.zo", None, None, None, f.clock.now());
        assert!(matches!(
            f.service.accept(&issued.token, again).await,
            Err(InvitationError::AlreadyUsed)
        ));
        assert!(matches!(
            f.service.verify(&issued.token).await,
            Err(InvitationError::AlreadyUsed)
        ));
    }

    #[tokio::test]
    async fn test_accept_requires_matching_email() {
        let f = fixture();
        let issued = f.service.issue(&f.inviter, "bob@dev.zo").await.unwrap();
        let mallory = User::new("mallory@dev.zo", None, None, None, f.clock.now());

        assert!(matches!(
            f.service.accept(&issued.token, mallory).await,
            Err(InvitationError::EmailMismatch)
        ));
    }

    #[tokio::test]
    async fn test_revoke_permissions() {
        let f = fixture();
        let issued = f.service.issue(&f.inviter, "bob@dev.zo").await.unwrap();
        let id = issued.invitation.invitation_id;

        let stranger = identity("eve@dev.zo", false);
        assert!(matches!(
            f.service.revoke(id, &stranger).await,
            Err(InvitationError::Forbidden)
        ));

        let admin = identity("carol@dev.zo", true);
        let revoked = f.service.revoke(id, &admin).await.unwrap();
        assert_eq!(revoked.status, InvitationStatus::Revoked);

        // terminal: no-op
        let again = f.service.revoke(id, &f.inviter).await.unwrap();
        assert_eq!(again.status, InvitationStatus::Revoked);

        assert!(matches!(
            f.service.verify(&issued.token).await,
            Err(InvitationError::Revoked)
        ));
    }

    #[tokio::test]
    async fn test_revoke_does_not_overwrite_concurrent_accept() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let inviter = identity("alice@dev.zo", false);
        let invitation = Invitation::new("bob@dev.zo", inviter.user_id(), "t".to_string(), now, 7);
        store.insert_invitation(&invitation).await.unwrap();

        let service = InvitationService::new(
            Arc::new(AcceptAfterRead {
                inner: store.clone(),
                fired: AtomicBool::new(false),
            }),
            Arc::new(MockEmailService::new()),
            AdminResolver::new(AdminAllowList::from_csv("root")),
            Arc::new(ManualClock::new(now)),
            7,
            "http://localhost:3000".to_string(),
        );

        let result = service
            .revoke(invitation.invitation_id, &inviter)
            .await
            .unwrap();
        assert_eq!(result.status, InvitationStatus::Accepted);

        let stored = store
            .find_invitation_by_id(invitation.invitation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvitationStatus::Accepted);
        assert_eq!(stored.accepted_utc, Some(now));
        assert!(store.find_user_by_email("bob@dev.zo").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_revoke_unknown_id() {
        let f = fixture();
        assert!(matches!(
            f.service.revoke(Uuid::new_v4(), &f.inviter).await,
            Err(InvitationError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_issue_rejects_invalid_email() {
        let f = fixture();
        assert!(matches!(
            f.service.issue(&f.inviter, "not-an-email").await,
            Err(InvitationError::InvalidEmail)
        ));
    }

    #[tokio::test]
    async fn test_email_failure_is_upstream_error() {
        let f = fixture_with_email(MockEmailService::failing());
        let err = f.service.issue(&f.inviter, "bob@dev.zo").await.unwrap_err();
        assert!(matches!(err, InvitationError::Upstream(_)));
        assert!(matches!(AppError::from(err), AppError::EmailError(_)));
    }
}
