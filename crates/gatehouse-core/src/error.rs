//! Error types for `gatehouse-core`.
//!
//! Every verification outcome carries a human-readable reason (the `Display`
//! impl) and a stable machine-readable kind ([`Error::kind`]) so gate
//! hardware and the guard console can react without parsing prose.

use thiserror::Error;
use uuid::Uuid;

use crate::{invitation::InvitationStatus, visitor::VisitorStatus};

#[derive(Debug, Error)]
pub enum Error {
  // ── Credential errors ─────────────────────────────────────────────────
  #[error("malformed credential: {0}")]
  MalformedCredential(String),

  /// The signature may well be valid; expiry is checked first so callers
  /// can distinguish "too late" from "forged".
  #[error("credential expired {expired_minutes_ago} minutes ago")]
  Expired { expired_minutes_ago: i64 },

  #[error("credential signature is invalid")]
  InvalidSignature,

  #[error("presented identity does not match the invitation")]
  IdentityMismatch,

  // ── Lookups ───────────────────────────────────────────────────────────
  #[error("invitation not found: {0}")]
  InvitationNotFound(Uuid),

  #[error("visitor not found: {0}")]
  VisitorNotFound(Uuid),

  #[error("resident not found: {0}")]
  ResidentNotFound(Uuid),

  #[error("frequent visitor not found: {0}")]
  FrequentVisitorNotFound(Uuid),

  // ── Invitation state machine ──────────────────────────────────────────
  #[error("invitation {0} is still pending approval")]
  InvitationPending(Uuid),

  #[error("invitation {0} has already been used")]
  AlreadyUsed(Uuid),

  #[error("invitation {0} was rejected")]
  InvitationRejected(Uuid),

  #[error("invitation {0} was cancelled")]
  InvitationCancelled(Uuid),

  #[error("invitation {0} has expired")]
  InvitationExpired(Uuid),

  #[error("cannot {attempted} an invitation in state {from}")]
  InvalidInvitationTransition {
    from:      InvitationStatus,
    attempted: &'static str,
  },

  // ── Visitor state machine ─────────────────────────────────────────────
  #[error("cannot {attempted} a visitor in state {from}")]
  InvalidVisitorTransition {
    from:      VisitorStatus,
    attempted: &'static str,
  },

  #[error("visitor {0} is already checked in")]
  AlreadyCheckedIn(Uuid),

  #[error("visitor {0} is not checked in")]
  NotCheckedIn(Uuid),

  // ── Frequent-visitor roster ───────────────────────────────────────────
  #[error("a frequent visitor with document {0} is already registered")]
  DuplicateFrequentVisitor(String),

  #[error("frequent visitor {0} has been deactivated")]
  InactiveFrequentVisitor(Uuid),

  // ── Ledger ────────────────────────────────────────────────────────────
  #[error("entry must reference at least one subject")]
  EmptyEntryRefs,

  // ── Configuration ─────────────────────────────────────────────────────
  #[error("signing secret must not be empty")]
  EmptySecret,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Backend failure surfaced through the store traits. Not a domain
  /// outcome; transport layers map this to an internal error.
  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Stable machine-readable discriminant, surfaced next to the reason
  /// string in every denial.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::MalformedCredential(_) => "malformed_credential",
      Self::Expired { .. } => "expired",
      Self::InvalidSignature => "invalid_signature",
      Self::IdentityMismatch => "identity_mismatch",
      Self::InvitationNotFound(_) => "invitation_not_found",
      Self::VisitorNotFound(_) => "visitor_not_found",
      Self::ResidentNotFound(_) => "resident_not_found",
      Self::FrequentVisitorNotFound(_) => "frequent_visitor_not_found",
      Self::InvitationPending(_) => "invitation_pending",
      Self::AlreadyUsed(_) => "already_used",
      Self::InvitationRejected(_) => "invitation_rejected",
      Self::InvitationCancelled(_) => "invitation_cancelled",
      Self::InvitationExpired(_) => "invitation_expired",
      Self::InvalidInvitationTransition { .. } => "invalid_transition",
      Self::InvalidVisitorTransition { .. } => "invalid_transition",
      Self::AlreadyCheckedIn(_) => "already_checked_in",
      Self::NotCheckedIn(_) => "not_checked_in",
      Self::DuplicateFrequentVisitor(_) => "duplicate_frequent_visitor",
      Self::InactiveFrequentVisitor(_) => "inactive_frequent_visitor",
      Self::EmptyEntryRefs => "empty_entry_refs",
      Self::EmptySecret => "empty_secret",
      Self::Serialization(_) => "serialization",
      Self::Storage(_) => "storage",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
