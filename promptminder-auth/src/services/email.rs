use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SmtpConfig;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_invitation_email(
        &self,
        to_email: &str,
        invite_link: &str,
        inviter_email: &str,
    ) -> Result<(), AppError>;
}

fn invitation_body(invite_link: &str, inviter_email: &str) -> String {
    format!(
        "{} invited you to join PromptMinder.\n\nAccept the invitation by visiting:\n\n{}\n\nIf you were not expecting this, you can ignore this email.",
        inviter_email, invite_link
    )
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(
            config.user.clone(),
            config.password.expose_secret().clone(),
        );

        let mailer = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized with SMTP");

        Ok(Self {
            mailer,
            from_email: config.from.clone(),
        })
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_invitation_email(
        &self,
        to_email: &str,
        invite_link: &str,
        inviter_email: &str,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from_email.parse().map_err(|e: lettre::address::AddressError| AppError::ConfigError(e.into()))?)
            .to(to_email.parse().map_err(|e: lettre::address::AddressError| AppError::BadRequest(e.into()))?)
            .subject("You're invited to PromptMinder")
            .header(ContentType::TEXT_PLAIN)
            .body(invitation_body(invite_link, inviter_email))
            .map_err(|e| AppError::InternalError(e.into()))?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, "Invitation email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send invitation email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

/// Used when SMTP is not configured: the link is written to the log.
#[derive(Clone, Default)]
pub struct LoggingEmailService;

#[async_trait]
impl EmailProvider for LoggingEmailService {
    async fn send_invitation_email(
        &self,
        to_email: &str,
        invite_link: &str,
        inviter_email: &str,
    ) -> Result<(), AppError> {
        tracing::info!(
            to = %to_email,
            inviter = %inviter_email,
            invite_link = %invite_link,
            "SMTP not configured; invitation email not sent"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub to: String,
    pub link: String,
}

/// Records sends for assertions.
#[derive(Clone, Default)]
pub struct MockEmailService {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    fail: bool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_invitation_email(
        &self,
        to_email: &str,
        invite_link: &str,
        _inviter_email: &str,
    ) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::EmailError("mock SMTP failure".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentEmail {
                to: to_email.to_string(),
                link: invite_link.to_string(),
            });
        }
        Ok(())
    }
}
