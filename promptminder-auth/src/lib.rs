pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::AuthConfig;
use crate::middleware::{route_guard_middleware, RouteGuard};
use crate::services::{
    jwt::DEFAULT_AUDIENCE, AdminAllowList, AdminResolver, AuthService, BearerCookieStrategy,
    BearerVerifier, Clock, EmailDomainPolicy, EmailProvider, HostedAuthProvider,
    IdentityResolver, InvitationService, InvitationStore, OpaqueSessionStrategy, SessionService,
    SessionStore, UserStore,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::registration::register,
        handlers::auth::session::login,
        handlers::auth::session::logout,
        handlers::auth::session::me,
        handlers::auth::hosted::sign_in,
        handlers::auth::hosted::request_magic_link,
        handlers::auth::hosted::request_password_reset,
        handlers::invitation::create_invitation,
        handlers::invitation::get_invitation,
        handlers::invitation::revoke_invitation,
        handlers::admin::check,
        handlers::admin::list_users,
        handlers::admin::set_admin,
        handlers::admin::invalidate_sessions,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::EmailRequest,
            dtos::auth::SessionResponse,
            dtos::auth::DisplayUser,
            dtos::auth::SignInResponse,
            dtos::auth::MeResponse,
            dtos::invitation::CreateInvitationRequest,
            dtos::invitation::InvitationResponse,
            dtos::invitation::InviterSummary,
            dtos::invitation::InvitationDetailsResponse,
            dtos::admin::AdminCheckResponse,
            dtos::admin::UserListResponse,
            dtos::admin::SetAdminRequest,
            dtos::admin::SetAdminResponse,
            dtos::admin::InvalidateSessionsResponse,
            models::UserResponse,
            models::InvitationStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Local accounts and opaque sessions"),
        (name = "Hosted Authentication", description = "Sign-in, magic links and password reset through the hosted provider"),
        (name = "Invitations", description = "Invitation lifecycle"),
        (name = "Admin", description = "Administrative operations"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(
                    utils::cookies::SESSION_COOKIE,
                ))),
            );
        }
    }
}

/// Storage and outbound integrations the service is wired against.
///
/// Production uses [`services::Database`] and the SMTP/hosted clients; tests
/// plug in [`services::MemoryStore`] and the mocks.
#[derive(Clone)]
pub struct Backends {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub invitations: Arc<dyn InvitationStore>,
    pub email: Arc<dyn EmailProvider>,
    pub hosted: Option<Arc<dyn HostedAuthProvider>>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// One store serving all three tables.
    pub fn from_store<S>(
        store: S,
        email: Arc<dyn EmailProvider>,
        hosted: Option<Arc<dyn HostedAuthProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: UserStore + SessionStore + InvitationStore + Clone + 'static,
    {
        Self {
            users: Arc::new(store.clone()),
            sessions: Arc::new(store.clone()),
            invitations: Arc::new(store),
            email,
            hosted,
            clock,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub users: Arc<dyn UserStore>,
    pub sessions: SessionService,
    pub auth: AuthService,
    pub identity: IdentityResolver,
    pub admin: AdminResolver,
    pub invitations: InvitationService,
    pub route_guard: RouteGuard,
    pub login_rate_limiter: IpRateLimiter,
    pub email_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(config: AuthConfig, backends: Backends) -> Self {
        let Backends {
            users,
            sessions,
            invitations,
            email,
            hosted,
            clock,
        } = backends;

        let admin = AdminResolver::new(AdminAllowList::new(&config.access.admin_usernames));
        let email_policy = EmailDomainPolicy::new(&config.access.allowed_email_domains);

        let session_service =
            SessionService::new(sessions, clock.clone(), config.lifetimes.session_ttl_days);

        let invitation_service = InvitationService::new(
            invitations,
            email,
            admin.clone(),
            clock.clone(),
            config.lifetimes.invitation_ttl_days,
            config.base_url.clone(),
        );

        let auth = AuthService::new(
            users.clone(),
            session_service.clone(),
            invitation_service.clone(),
            email_policy,
            hosted,
            clock,
            config.access.invite_only,
            config.base_url.clone(),
        );

        let verifier = BearerVerifier::new(config.bearer_secret(), Some(DEFAULT_AUDIENCE));
        if !verifier.is_enabled() {
            tracing::warn!("No bearer secret configured; bearer tokens will be ignored");
        }

        // Opaque session first, then the provider bearer token.
        let identity = IdentityResolver::new(vec![
            Box::new(OpaqueSessionStrategy::new(session_service.clone())),
            Box::new(BearerCookieStrategy::new(verifier, users.clone())),
        ]);

        let route_guard = RouteGuard::from_config(&config.route_guard);

        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let email_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.email_attempts,
            config.rate_limit.email_window_seconds,
        );

        Self {
            config,
            users,
            sessions: session_service,
            auth,
            identity,
            admin,
            invitations: invitation_service,
            route_guard,
            login_rate_limiter,
            email_rate_limiter,
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Store unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.users.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "service": state.config.service_name,
                "version": state.config.service_version,
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "service": state.config.service_name,
                })),
            )
        }
    }
}

async fn not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Not found"))
}

/// Request path safe for logging: invitation tokens are replaced with `:key`.
fn redacted_path(path: &str) -> String {
    match path.strip_prefix("/api/invitations/") {
        Some(rest) if !rest.is_empty() => match rest.split_once('/') {
            Some((_, tail)) => format!("/api/invitations/:key/{}", tail),
            None => "/api/invitations/:key".to_string(),
        },
        _ => path.to_string(),
    }
}

fn cors_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|o| {
            if o == "*" {
                tracing::error!("Wildcard CORS origin is not allowed with credentials; skipping");
                return None;
            }
            o.parse::<HeaderValue>()
                .map_err(|e| tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e))
                .ok()
        })
        .collect()
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    // Credential routes share the login limiter
    let login_limiter = state.login_rate_limiter.clone();
    let credential_routes = Router::new()
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/sign-in", post(handlers::auth::sign_in))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    // Routes that trigger outbound email
    let email_limiter = state.email_rate_limiter.clone();
    let email_routes = Router::new()
        .route(
            "/api/auth/magic-link",
            post(handlers::auth::request_magic_link),
        )
        .route(
            "/api/auth/password-reset",
            post(handlers::auth::request_password_reset),
        )
        .layer(from_fn_with_state(email_limiter, ip_rate_limit_middleware));

    let admin_routes = Router::new()
        .route("/api/admin/check", get(handlers::admin::check))
        .route("/api/admin/users", get(handlers::admin::list_users))
        .route(
            "/api/admin/users/:user_id/admin",
            patch(handlers::admin::set_admin),
        )
        .route(
            "/api/admin/users/:user_id/sessions/invalidate",
            post(handlers::admin::invalidate_sessions),
        );

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route(
            "/api/invitations",
            post(handlers::invitation::create_invitation),
        )
        // GET takes the emailed token, DELETE the invitation id
        .route(
            "/api/invitations/:key",
            get(handlers::invitation::get_invitation)
                .delete(handlers::invitation::revoke_invitation),
        )
        .merge(credential_routes)
        .merge(email_routes)
        .merge(admin_routes)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), route_guard_middleware))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %redacted_path(request.uri().path()),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origins(&state.config.security.allowed_origins))
                .allow_credentials(true)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}
