use service_core::error::AppError;
use thiserror::Error;

use super::hosted::ProviderError;
use super::invitation::InvitationError;
use super::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("{0}")]
    DomainNotAllowed(String),

    #[error("An invitation is required to register")]
    InvitationRequired,

    #[error(transparent)]
    Invitation(#[from] InvitationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Hosted auth provider is not configured")]
    ProviderNotConfigured,
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::DomainNotAllowed(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::InvitationRequired => {
                AppError::Forbidden(anyhow::anyhow!("An invitation is required to register"))
            }
            ServiceError::Invitation(e) => e.into(),
            ServiceError::Store(e) => e.into(),
            ServiceError::Provider(ProviderError::RateLimited(retry)) => AppError::TooManyRequests(
                "Too many requests. Please try again later.".to_string(),
                retry,
            ),
            ServiceError::Provider(ProviderError::Rejected { status, message }) => {
                tracing::warn!(status, message = %message, "Hosted provider rejected request");
                AppError::BadRequest(anyhow::anyhow!(
                    "Request rejected by the authentication provider"
                ))
            }
            ServiceError::Provider(ProviderError::Upstream(msg)) => AppError::BadGateway(msg),
            ServiceError::ProviderNotConfigured => AppError::ServiceUnavailable,
        }
    }
}
