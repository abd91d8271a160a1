use axum::{extract::FromRequestParts, http::request::Parts};
use service_core::error::AppError;

use crate::{
    services::{Identity, RequestCredentials},
    AppState,
};

/// Identity of the caller, if any. Resolution failures yield `None`.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub Option<Identity>);

/// Identity of the caller; 401 when there is none.
#[derive(Debug, Clone)]
pub struct RequireIdentity(pub Identity);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Resolved at most once per request.
        if let Some(resolved) = parts.extensions.get::<CurrentIdentity>() {
            return Ok(resolved.clone());
        }

        let credentials = RequestCredentials::from_headers(&parts.headers);
        let resolved = CurrentIdentity(state.identity.resolve(&credentials).await);
        parts.extensions.insert(resolved.clone());
        Ok(resolved)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for RequireIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentIdentity(identity) = CurrentIdentity::from_request_parts(parts, state).await?;
        identity.map(RequireIdentity).ok_or_else(AppError::unauthenticated)
    }
}
