//! Hosted auth provider (GoTrue-compatible API).

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::HostedProviderConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Rate limited by provider")]
    RateLimited(Option<u64>),

    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Provider request failed: {0}")]
    Upstream(String),
}

/// Tokens returned by a successful password sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[async_trait]
pub trait HostedAuthProvider: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, ProviderError>;

    /// Send a magic link to an existing account; never creates users.
    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<(), ProviderError>;

    async fn send_password_reset(&self, email: &str, redirect_to: &str)
        -> Result<(), ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default, alias = "error_description", alias = "message")]
    msg: Option<String>,
}

pub struct SupabaseAuthClient {
    base_url: String,
    anon_key: Secret<String>,
    client: Client,
}

impl SupabaseAuthClient {
    pub fn new(config: &HostedProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Upstream(format!("Failed to build HTTP client: {}", e)))?;

        tracing::info!(url = %config.url, "Hosted auth provider client initialized");

        Ok(Self {
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            client,
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let key = self.anon_key.expose_secret();
        self.client
            .post(format!("{}/auth/v1/{}", self.base_url, path))
            .header("apikey", key)
            .bearer_auth(key)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited(retry_after));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(ProviderError::Upstream(format!(
                "Provider returned {}: {}",
                status, body
            )));
        }

        let message = serde_json::from_str::<ProviderErrorBody>(&body)
            .ok()
            .and_then(|b| b.msg)
            .unwrap_or_else(|| status.to_string());

        Err(ProviderError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl HostedAuthProvider for SupabaseAuthClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, ProviderError> {
        let response = self
            .post("token")
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Sign-in request failed: {}", e)))?;

        Self::check(response)
            .await?
            .json::<ProviderSession>()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Failed to parse sign-in response: {}", e)))
    }

    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> Result<(), ProviderError> {
        let response = self
            .post("otp")
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email, "create_user": false }))
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Magic link request failed: {}", e)))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn send_password_reset(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .post("recover")
            .query(&[("redirect_to", redirect_to)])
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(format!("Password reset request failed: {}", e)))?;

        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedEmailKind {
    MagicLink,
    PasswordReset,
}

/// In-process provider for tests and local runs.
///
/// Known accounts sign in with their password and receive an HS256 token
/// signed with `signing_secret`. Email requests for unknown accounts are
/// rejected the way the real provider rejects them.
#[derive(Clone)]
pub struct MockHostedAuth {
    accounts: Arc<HashMap<String, (Uuid, String)>>,
    signing_secret: String,
    expires_in: i64,
    sent: Arc<Mutex<Vec<(HostedEmailKind, String)>>>,
    rate_limited: Arc<AtomicBool>,
    offline: Arc<AtomicBool>,
}

impl MockHostedAuth {
    pub fn new(signing_secret: &str) -> Self {
        Self {
            accounts: Arc::new(HashMap::new()),
            signing_secret: signing_secret.to_string(),
            expires_in: 3600,
            sent: Arc::new(Mutex::new(Vec::new())),
            rate_limited: Arc::new(AtomicBool::new(false)),
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_account(mut self, email: &str, password: &str) -> Self {
        let mut accounts = (*self.accounts).clone();
        accounts.insert(email.to_lowercase(), (Uuid::new_v4(), password.to_string()));
        self.accounts = Arc::new(accounts);
        self
    }

    pub fn set_rate_limited(&self, limited: bool) {
        self.rate_limited.store(limited, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(HostedEmailKind, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn precheck(&self) -> Result<(), ProviderError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::Upstream("mock provider offline".to_string()));
        }
        if self.rate_limited.load(Ordering::SeqCst) {
            return Err(ProviderError::RateLimited(Some(60)));
        }
        Ok(())
    }

    fn send(&self, kind: HostedEmailKind, email: &str) -> Result<(), ProviderError> {
        self.precheck()?;
        if !self.accounts.contains_key(&email.to_lowercase()) {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "User not found".to_string(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((kind, email.to_lowercase()));
        }
        Ok(())
    }
}

#[async_trait]
impl HostedAuthProvider for MockHostedAuth {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, ProviderError> {
        self.precheck()?;

        let email = email.to_lowercase();
        let Some((user_id, expected)) = self.accounts.get(&email) else {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "Invalid login credentials".to_string(),
            });
        };
        if expected != password {
            return Err(ProviderError::Rejected {
                status: 400,
                message: "Invalid login credentials".to_string(),
            });
        }

        let claims = json!({
            "sub": user_id,
            "email": email,
            "aud": "authenticated",
            "role": "authenticated",
            "exp": Utc::now().timestamp() + self.expires_in,
            "user_metadata": {},
        });
        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.signing_secret.as_bytes()),
        )
        .map_err(|e| ProviderError::Upstream(e.to_string()))?;

        Ok(ProviderSession {
            access_token,
            refresh_token: crate::utils::create_token(),
            expires_in: self.expires_in,
            token_type: default_token_type(),
        })
    }

    async fn send_magic_link(&self, email: &str, _redirect_to: &str) -> Result<(), ProviderError> {
        self.send(HostedEmailKind::MagicLink, email)
    }

    async fn send_password_reset(
        &self,
        email: &str,
        _redirect_to: &str,
    ) -> Result<(), ProviderError> {
        self.send(HostedEmailKind::PasswordReset, email)
    }
}
