pub mod invitation;
pub mod session;
pub mod user;

pub use invitation::{Invitation, InvitationEvent, InvitationRow, InvitationStatus, TransitionError};
pub use session::{IssuedSession, SessionRecord};
pub use user::{User, UserResponse};
