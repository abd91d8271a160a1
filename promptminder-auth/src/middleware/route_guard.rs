//! Cookie-presence gate over protected page prefixes.
//!
//! Only checks that a session cookie is present. Whether it is still valid
//! is decided later by the handlers through the identity resolver.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::config::RouteGuardConfig;
use crate::utils::cookies::{non_empty_cookie, ACCESS_TOKEN_COOKIE, SESSION_COOKIE};
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allowed,
    Blocked { redirect_to: String },
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    protected_prefixes: Vec<String>,
    sign_in_path: String,
}

impl RouteGuard {
    pub fn new(protected_prefixes: Vec<String>, sign_in_path: String) -> Self {
        Self {
            protected_prefixes: protected_prefixes
                .into_iter()
                .map(|p| p.trim_end_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            sign_in_path,
        }
    }

    pub fn from_config(config: &RouteGuardConfig) -> Self {
        Self::new(
            config.protected_prefixes.clone(),
            config.sign_in_path.clone(),
        )
    }

    /// Equal to a prefix, or below it at a segment boundary.
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn evaluate(&self, path: &str, headers: &HeaderMap) -> GuardDecision {
        if !self.is_protected(path) {
            return GuardDecision::Allowed;
        }

        let jar = CookieJar::from_headers(headers);
        let has_session = non_empty_cookie(&jar, SESSION_COOKIE).is_some()
            || non_empty_cookie(&jar, ACCESS_TOKEN_COOKIE).is_some();

        if has_session {
            GuardDecision::Allowed
        } else {
            GuardDecision::Blocked {
                redirect_to: format!(
                    "{}?redirect_url={}",
                    self.sign_in_path,
                    urlencoding::encode(path).replace("%2F", "/")
                ),
            }
        }
    }
}

pub async fn route_guard_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    match state.route_guard.evaluate(req.uri().path(), req.headers()) {
        GuardDecision::Allowed => next.run(req).await,
        GuardDecision::Blocked { redirect_to } => {
            tracing::debug!(path = %req.uri().path(), "Redirecting unauthenticated request to sign-in");
            Redirect::temporary(&redirect_to).into_response()
        }
    }
}
