//! Services layer for promptminder-auth.
//!
//! Business logic for sessions, identity, admin authorization and
//! invitations, plus the persistence and outbound-provider seams.

pub mod admin;
pub mod auth;
pub mod clock;
mod database;
pub mod email;
pub mod email_policy;
pub mod error;
pub mod hosted;
pub mod identity;
pub mod invitation;
pub mod jwt;
mod memory;
pub mod session;
pub mod store;

pub use admin::{AdminAllowList, AdminResolver, AuthzError};
pub use auth::{AuthService, NewAccount};
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::Database;
pub use email::{EmailProvider, EmailService, LoggingEmailService, MockEmailService};
pub use email_policy::EmailDomainPolicy;
pub use error::ServiceError;
pub use hosted::{HostedAuthProvider, MockHostedAuth, ProviderError, SupabaseAuthClient};
pub use identity::{
    BearerCookieStrategy, Identity, IdentityResolver, IdentityStrategy, OpaqueSessionStrategy,
    RequestCredentials,
};
pub use invitation::{InvitationError, InvitationService};
pub use jwt::{decode_display_claims, BearerVerifier, DisplayClaims, VerifiedClaims};
pub use memory::MemoryStore;
pub use session::SessionService;
pub use store::{InvitationStore, SessionStore, StoreError, UserStore};
