//! Invitation model - time-bounded registration invites.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Invitation status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
    Expired,
}

/// Events that drive an invitation through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationEvent {
    Accept,
    Revoke,
    Expire,
}

/// Rejected transition out of a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invitation has already been used")]
    AlreadyUsed,
    #[error("Invitation has been revoked")]
    Revoked,
    #[error("Invitation has expired")]
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Revoked => "revoked",
            InvitationStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }

    /// Transition table.
    ///
    /// | from \ event | Accept      | Revoke  | Expire  |
    /// |--------------|-------------|---------|---------|
    /// | Pending      | Accepted    | Revoked | Expired |
    /// | Accepted     | AlreadyUsed | no-op   | no-op   |
    /// | Revoked      | Revoked     | no-op   | no-op   |
    /// | Expired      | Expired     | no-op   | no-op   |
    pub fn apply(self, event: InvitationEvent) -> Result<InvitationStatus, TransitionError> {
        use InvitationEvent as E;
        use InvitationStatus as S;

        match (self, event) {
            (S::Pending, E::Accept) => Ok(S::Accepted),
            (S::Pending, E::Revoke) => Ok(S::Revoked),
            (S::Pending, E::Expire) => Ok(S::Expired),
            (S::Accepted, E::Accept) => Err(TransitionError::AlreadyUsed),
            (S::Revoked, E::Accept) => Err(TransitionError::Revoked),
            (S::Expired, E::Accept) => Err(TransitionError::Expired),
            (terminal, E::Revoke | E::Expire) => Ok(terminal),
        }
    }
}

impl std::str::FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "revoked" => Ok(InvitationStatus::Revoked),
            "expired" => Ok(InvitationStatus::Expired),
            _ => Err(format!("Invalid invitation status: {}", s)),
        }
    }
}

/// Invitation entity.
#[derive(Debug, Clone)]
pub struct Invitation {
    pub invitation_id: Uuid,
    /// Always lowercased.
    pub email: String,
    pub inviter_user_id: Uuid,
    /// Stored status; see [`Invitation::effective_status`] for the one to act on.
    pub status: InvitationStatus,
    pub token_hash: String,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Create a new pending invitation.
    pub fn new(
        email: &str,
        inviter_user_id: Uuid,
        token_hash: String,
        now: DateTime<Utc>,
        ttl_days: i64,
    ) -> Self {
        Self {
            invitation_id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            inviter_user_id,
            status: InvitationStatus::Pending,
            token_hash,
            created_utc: now,
            expiry_utc: now + Duration::days(ttl_days),
            accepted_utc: None,
        }
    }

    /// Status with expiry applied: a pending invitation past its expiry is expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvitationStatus {
        if self.status == InvitationStatus::Pending && self.expiry_utc <= now {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }

    /// Apply an event against the effective status and record the result.
    pub fn transition(
        &mut self,
        event: InvitationEvent,
        now: DateTime<Utc>,
    ) -> Result<InvitationStatus, TransitionError> {
        let next = self.effective_status(now).apply(event)?;
        if next == InvitationStatus::Accepted && self.status != InvitationStatus::Accepted {
            self.accepted_utc = Some(now);
        }
        self.status = next;
        Ok(next)
    }
}

/// Database row shape; status is stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct InvitationRow {
    pub invitation_id: Uuid,
    pub email: String,
    pub inviter_user_id: Uuid,
    pub status_code: String,
    pub token_hash: String,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = String;

    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            invitation_id: row.invitation_id,
            email: row.email,
            inviter_user_id: row.inviter_user_id,
            status: row.status_code.parse()?,
            token_hash: row.token_hash,
            created_utc: row.created_utc,
            expiry_utc: row.expiry_utc,
            accepted_utc: row.accepted_utc,
        })
    }
}
