pub mod auth;
pub mod route_guard;

pub use auth::{CurrentIdentity, RequireIdentity};
pub use route_guard::{route_guard_middleware, GuardDecision, RouteGuard};
