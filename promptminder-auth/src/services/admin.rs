//! Admin authorization.
//!
//! A user is an admin when their persisted flag is set or their email
//! matches the configured allow-list. Super-admin is the allow-list alone.

use service_core::error::AppError;
use thiserror::Error;

use super::identity::Identity;

/// Entries from `ADMIN_USERNAMES`, lowercased.
///
/// An entry containing `@` matches that exact address. A bare entry matches
/// any address whose local part equals it, on any domain.
#[derive(Debug, Clone, Default)]
pub struct AdminAllowList {
    entries: Vec<String>,
}

impl AdminAllowList {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn from_csv(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn matches(&self, email: &str) -> bool {
        let candidate = email.trim().to_lowercase();
        if candidate.is_empty() {
            return false;
        }

        self.entries.iter().any(|entry| {
            if entry.contains('@') {
                *entry == candidate
            } else {
                candidate
                    .strip_prefix(entry.as_str())
                    .is_some_and(|rest| rest.starts_with('@'))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthzError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Admin privileges required")]
    Forbidden,
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => AppError::unauthenticated(),
            AuthzError::Forbidden => AppError::Forbidden(anyhow::anyhow!(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminResolver {
    allow_list: AdminAllowList,
}

impl AdminResolver {
    pub fn new(allow_list: AdminAllowList) -> Self {
        Self { allow_list }
    }

    pub fn is_admin(&self, identity: &Identity) -> bool {
        identity.persisted_admin() || self.allow_list.matches(identity.email())
    }

    pub fn verify_super_admin(&self, identity: &Identity) -> bool {
        self.allow_list.matches(identity.email())
    }

    pub fn require_admin<'a>(
        &self,
        identity: Option<&'a Identity>,
    ) -> Result<&'a Identity, AuthzError> {
        let identity = identity.ok_or(AuthzError::Unauthenticated)?;
        if self.is_admin(identity) {
            Ok(identity)
        } else {
            tracing::warn!(user_id = %identity.user_id(), "Admin access denied");
            Err(AuthzError::Forbidden)
        }
    }

    pub fn require_super_admin<'a>(
        &self,
        identity: Option<&'a Identity>,
    ) -> Result<&'a Identity, AuthzError> {
        let identity = identity.ok_or(AuthzError::Unauthenticated)?;
        if self.verify_super_admin(identity) {
            Ok(identity)
        } else {
            tracing::warn!(user_id = %identity.user_id(), "Super-admin access denied");
            Err(AuthzError::Forbidden)
        }
    }
}
