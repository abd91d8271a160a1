//! Request identity resolution.
//!
//! An [`Identity`] is built only from a persisted user (opaque session path)
//! or from [`VerifiedClaims`] (bearer path). The resolver tries each
//! configured strategy in order and returns the first identity found.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::{BearerVerifier, VerifiedClaims};
use super::session::SessionService;
use super::store::UserStore;
use crate::models::User;
use crate::utils::cookies::{non_empty_cookie, ACCESS_TOKEN_COOKIE, SESSION_COOKIE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    OpaqueSession,
    Bearer,
}

/// An authenticated principal.
#[derive(Debug, Clone)]
pub struct Identity {
    user_id: Uuid,
    email: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    persisted_admin: bool,
    source: IdentitySource,
}

impl Identity {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email.to_lowercase(),
            display_name: user.display_name.clone(),
            avatar_url: user.avatar_url.clone(),
            persisted_admin: user.is_admin,
            source: IdentitySource::OpaqueSession,
        }
    }

    /// Bearer identity. The admin flag comes only from the matching user row;
    /// token metadata contributes display fields.
    ///
    /// `None` when there is no local user and the subject is not a UUID.
    pub fn from_verified(claims: &VerifiedClaims, user: Option<&User>) -> Option<Self> {
        let user_id = match user {
            Some(user) => user.user_id,
            None => Uuid::parse_str(&claims.sub).ok()?,
        };

        Some(Self {
            user_id,
            email: claims.email.to_lowercase(),
            display_name: claims
                .user_metadata
                .display_name
                .clone()
                .or_else(|| user.and_then(|u| u.display_name.clone())),
            avatar_url: claims
                .user_metadata
                .avatar_url
                .clone()
                .or_else(|| user.and_then(|u| u.avatar_url.clone())),
            persisted_admin: user.map(|u| u.is_admin).unwrap_or(false),
            source: IdentitySource::Bearer,
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }

    pub fn persisted_admin(&self) -> bool {
        self.persisted_admin
    }

    pub fn source(&self) -> IdentitySource {
        self.source
    }
}

/// Credentials a request may carry.
#[derive(Debug, Clone, Default)]
pub struct RequestCredentials {
    pub session_token: Option<String>,
    pub access_token: Option<String>,
}

impl RequestCredentials {
    /// Cookies plus an `Authorization: Bearer` header, which wins over the
    /// access-token cookie.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let jar = CookieJar::from_headers(headers);

        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Self {
            session_token: non_empty_cookie(&jar, SESSION_COOKIE),
            access_token: bearer.or_else(|| non_empty_cookie(&jar, ACCESS_TOKEN_COOKIE)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.session_token.is_none() && self.access_token.is_none()
    }
}

#[async_trait]
pub trait IdentityStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, credentials: &RequestCredentials) -> Option<Identity>;
}

/// Opaque `session_token` cookie backed by the session store.
pub struct OpaqueSessionStrategy {
    sessions: SessionService,
}

impl OpaqueSessionStrategy {
    pub fn new(sessions: SessionService) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl IdentityStrategy for OpaqueSessionStrategy {
    fn name(&self) -> &'static str {
        "opaque_session"
    }

    async fn resolve(&self, credentials: &RequestCredentials) -> Option<Identity> {
        let token = credentials.session_token.as_deref()?;
        let user = self.sessions.resolve(token).await?;
        Some(Identity::from_user(&user))
    }
}

/// Verified hosted-provider bearer token.
pub struct BearerCookieStrategy {
    verifier: BearerVerifier,
    users: Arc<dyn UserStore>,
}

impl BearerCookieStrategy {
    pub fn new(verifier: BearerVerifier, users: Arc<dyn UserStore>) -> Self {
        Self { verifier, users }
    }
}

#[async_trait]
impl IdentityStrategy for BearerCookieStrategy {
    fn name(&self) -> &'static str {
        "bearer"
    }

    async fn resolve(&self, credentials: &RequestCredentials) -> Option<Identity> {
        let token = credentials.access_token.as_deref()?;
        let claims = self.verifier.verify(token)?;

        let user = match self.users.find_user_by_email(&claims.email).await {
            Ok(user) => user,
            Err(e) => {
                tracing::error!(error = %e, "User lookup for bearer identity failed");
                return None;
            }
        };

        Identity::from_verified(&claims, user.as_ref())
    }
}

/// Ordered list of strategies; first match wins.
#[derive(Clone)]
pub struct IdentityResolver {
    strategies: Arc<Vec<Box<dyn IdentityStrategy>>>,
}

impl IdentityResolver {
    pub fn new(strategies: Vec<Box<dyn IdentityStrategy>>) -> Self {
        Self {
            strategies: Arc::new(strategies),
        }
    }

    pub async fn resolve(&self, credentials: &RequestCredentials) -> Option<Identity> {
        if credentials.is_empty() {
            return None;
        }

        for strategy in self.strategies.iter() {
            if let Some(identity) = strategy.resolve(credentials).await {
                tracing::debug!(strategy = strategy.name(), user_id = %identity.user_id(), "Identity resolved");
                return Some(identity);
            }
        }
        None
    }
}
