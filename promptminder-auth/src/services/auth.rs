//! Account flows: local registration and login, hosted sign-in and emails.

use std::sync::Arc;

use super::clock::Clock;
use super::email_policy::EmailDomainPolicy;
use super::error::ServiceError;
use super::hosted::{HostedAuthProvider, ProviderError, ProviderSession};
use super::invitation::InvitationService;
use super::session::SessionService;
use super::store::{StoreError, UserStore};
use crate::models::{IssuedSession, User};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

/// Input to [`AuthService::register`].
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: Password,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub invitation_token: Option<String>,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: SessionService,
    invitations: InvitationService,
    email_policy: EmailDomainPolicy,
    hosted: Option<Arc<dyn HostedAuthProvider>>,
    clock: Arc<dyn Clock>,
    invite_only: bool,
    base_url: String,
}

#[allow(clippy::too_many_arguments)]
impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: SessionService,
        invitations: InvitationService,
        email_policy: EmailDomainPolicy,
        hosted: Option<Arc<dyn HostedAuthProvider>>,
        clock: Arc<dyn Clock>,
        invite_only: bool,
        base_url: String,
    ) -> Self {
        Self {
            users,
            sessions,
            invitations,
            email_policy,
            hosted,
            clock,
            invite_only,
            base_url,
        }
    }

    fn check_domain(&self, email: &str) -> Result<(), ServiceError> {
        if self.email_policy.is_allowed(email) {
            Ok(())
        } else {
            Err(ServiceError::DomainNotAllowed(
                self.email_policy.restriction_message(),
            ))
        }
    }

    fn hosted(&self) -> Result<&Arc<dyn HostedAuthProvider>, ServiceError> {
        self.hosted.as_ref().ok_or(ServiceError::ProviderNotConfigured)
    }

    /// Create a local account and sign it in.
    ///
    /// With an invitation token the invitation is accepted and the user row
    /// created in one transaction.
    pub async fn register(
        &self,
        account: NewAccount,
    ) -> Result<(User, IssuedSession), ServiceError> {
        let email = account.email.trim().to_lowercase();
        self.check_domain(&email)?;

        if self.invite_only && account.invitation_token.is_none() {
            return Err(ServiceError::InvitationRequired);
        }

        let password_hash = hash_password(&account.password).into_string();
        let user = User::new(
            &email,
            account.username,
            account.display_name,
            Some(password_hash),
            self.clock.now(),
        );

        let user = match account.invitation_token {
            Some(token) => self
                .invitations
                .accept(&token, user)
                .await
                .map_err(|e| match e {
                    super::invitation::InvitationError::Store(StoreError::Conflict(_)) => {
                        ServiceError::EmailAlreadyRegistered
                    }
                    other => ServiceError::Invitation(other),
                })?,
            None => {
                self.users.insert_user(&user).await.map_err(|e| match e {
                    StoreError::Conflict(_) => ServiceError::EmailAlreadyRegistered,
                    other => ServiceError::Store(other),
                })?;
                user
            }
        };

        tracing::info!(user_id = %user.user_id, "User registered");

        let session = self.sessions.issue(user.user_id).await?;
        Ok((user, session))
    }

    /// Password login against the local user store.
    pub async fn login(
        &self,
        email: &str,
        password: &Password,
    ) -> Result<(User, IssuedSession), ServiceError> {
        let user = self.users.find_user_by_email(email).await?;

        let Some(user) = user else {
            // Same work as a real check so response timing does not reveal accounts.
            let _ = verify_password(password, &PasswordHashString::new(timing_dummy_hash()));
            return Err(ServiceError::InvalidCredentials);
        };

        let verified = user
            .password_hash
            .as_ref()
            .map(|hash| verify_password(password, &PasswordHashString::new(hash.clone())))
            .unwrap_or(false);

        if !verified {
            tracing::warn!(user_id = %user.user_id, "Failed login attempt");
            return Err(ServiceError::InvalidCredentials);
        }

        let session = self.sessions.issue(user.user_id).await?;
        tracing::info!(user_id = %user.user_id, "User logged in");
        Ok((user, session))
    }

    /// Drop the local session if one was presented, then purge expired ones.
    pub async fn logout(&self, session_token: Option<&str>) -> Result<(), ServiceError> {
        if let Some(token) = session_token {
            self.sessions.invalidate(token).await?;
        }
        self.sessions.purge_expired().await;
        Ok(())
    }

    pub async fn hosted_sign_in(
        &self,
        email: &str,
        password: &Password,
    ) -> Result<ProviderSession, ServiceError> {
        let provider = self.hosted()?;
        match provider
            .sign_in_with_password(&email.trim().to_lowercase(), password.as_str())
            .await
        {
            Ok(session) => Ok(session),
            Err(ProviderError::Rejected { .. }) => Err(ServiceError::InvalidCredentials),
            Err(e) => Err(e.into()),
        }
    }

    /// Ask the provider to email a magic link. Unknown accounts get the same
    /// outcome as known ones.
    pub async fn request_magic_link(&self, email: &str) -> Result<(), ServiceError> {
        let email = email.trim().to_lowercase();
        self.check_domain(&email)?;

        let provider = self.hosted()?;
        let redirect_to = format!("{}/auth/callback", self.base_url);
        swallow_rejection(provider.send_magic_link(&email, &redirect_to).await, "magic link")
    }

    /// Ask the provider to email a reset link. Unknown accounts get the same
    /// outcome as known ones.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let email = email.trim().to_lowercase();
        let provider = self.hosted()?;
        let redirect_to = format!("{}/reset-password", self.base_url);
        swallow_rejection(
            provider.send_password_reset(&email, &redirect_to).await,
            "password reset",
        )
    }
}

fn swallow_rejection(result: Result<(), ProviderError>, what: &str) -> Result<(), ServiceError> {
    match result {
        Ok(()) => Ok(()),
        Err(ProviderError::Rejected { status, message }) => {
            tracing::debug!(status = status, message = %message, "Provider declined {} request", what);
            Ok(())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Provider {} request failed", what);
            Err(e.into())
        }
    }
}

fn timing_dummy_hash() -> String {
    format!("{}:{}", "0".repeat(32), "0".repeat(128))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::admin::AdminResolver;
    use crate::services::clock::ManualClock;
    use crate::services::email::MockEmailService;
    use crate::services::hosted::MockHostedAuth;
    use crate::services::memory::MemoryStore;
    use chrono::Utc;

    fn service(invite_only: bool, hosted: Option<MockHostedAuth>) -> (AuthService, MemoryStore) {
        let store = MemoryStore::new();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let sessions = SessionService::new(Arc::new(store.clone()), clock.clone(), 7);
        let invitations = InvitationService::new(
            Arc::new(store.clone()),
            Arc::new(MockEmailService::new()),
            AdminResolver::default(),
            clock.clone(),
            7,
            "http://localhost:3000".to_string(),
        );
        let service = AuthService::new(
            Arc::new(store.clone()),
            sessions,
            invitations,
            EmailDomainPolicy::default(),
            hosted.map(|h| Arc::new(h) as Arc<dyn HostedAuthProvider>),
            clock,
            invite_only,
            "http://localhost:3000".to_string(),
        );
        (service, store)
    }

    fn account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password: Password::new("correct horse".to_string()),
            username: None,
            display_name: None,
            invitation_token: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (service, _) = service(false, None);
        let (user, _) = service.register(account("Alice@dev.zo")).await.unwrap();
        assert_eq!(user.email, "alice@dev.zo");

        let (logged_in, session) = service
            .login("alice@dev.zo", &Password::new("correct horse".to_string()))
            .await
            .unwrap();
        assert_eq!(logged_in.user_id, user.user_id);
        assert_eq!(session.token.len(), 64);
    }

    #[tokio::test]
    async fn test_register_rejects_foreign_domain() {
        let (service, _) = service(false, None);
        let err = service.register(account("a@evil.com")).await.unwrap_err();
        assert!(matches!(err, ServiceError::DomainNotAllowed(_)));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let (service, _) = service(false, None);
        service.register(account("a@dev.zo")).await.unwrap();
        assert!(matches!(
            service.register(account("A@dev.zo")).await.unwrap_err(),
            ServiceError::EmailAlreadyRegistered
        ));
    }

    #[tokio::test]
    async fn test_invite_only_requires_token() {
        let (service, _) = service(true, None);
        assert!(matches!(
            service.register(account("a@dev.zo")).await.unwrap_err(),
            ServiceError::InvitationRequired
        ));
    }

    #[tokio::test]
    async fn test_login_wrong_password_and_unknown_user() {
        let (service, _) = service(false, None);
        service.register(account("a@dev.zo")).await.unwrap();

        let wrong = Password::new("nope".to_string());
        assert!(matches!(
            service.login("a@dev.zo", &wrong).await.unwrap_err(),
            ServiceError::InvalidCredentials
        ));
        assert!(matches!(
            service.login("ghost@dev.zo", &wrong).await.unwrap_err(),
            ServiceError::InvalidCredentials
        ));
    }

    #[tokio::test]
    async fn test_hosted_flows_without_provider() {
        let (service, _) = service(false, None);
        assert!(matches!(
            service.request_password_reset("a@dev.zo").await.unwrap_err(),
            ServiceError::ProviderNotConfigured
        ));
    }

    #[tokio::test]
    async fn test_reset_outcome_same_for_known_and_unknown() {
        let mock = MockHostedAuth::new("s").with_account("known@dev.zo", "pw");
        let (service, _) = service(false, Some(mock.clone()));

        assert!(service.request_password_reset("known@dev.zo").await.is_ok());
        assert!(service.request_password_reset("ghost@dev.zo").await.is_ok());
        assert_eq!(mock.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_magic_link_rate_limit_surfaces() {
        let mock = MockHostedAuth::new("s");
        mock.set_rate_limited(true);
        let (service, _) = service(false, Some(mock));

        assert!(matches!(
            service.request_magic_link("a@dev.zo").await.unwrap_err(),
            ServiceError::Provider(ProviderError::RateLimited(_))
        ));
    }
}
