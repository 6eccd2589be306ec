//! Invitation — a resident-issued pre-authorization for a specific visitor
//! and date.
//!
//! Invitations are mutated only through the state-machine transitions on
//! [`crate::store::AccessStore`] and are never hard-deleted (audit
//! requirement). Expiry is lazy: there is no background sweep, the status is
//! re-derived from the clock on every read path.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Identity, VehicleInfo};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Invitation lifecycle states. `Pending → Approved → Used`, with side exits
/// to `Rejected`, `Cancelled`, and `Expired`. Terminal states admit no
/// further transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
  Pending,
  Approved,
  Used,
  Rejected,
  Expired,
  Cancelled,
}

impl InvitationStatus {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      Self::Used | Self::Rejected | Self::Expired | Self::Cancelled
    )
  }

  /// The discriminant string stored in the `status` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Approved => "approved",
      Self::Used => "used",
      Self::Rejected => "rejected",
      Self::Expired => "expired",
      Self::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for InvitationStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Lazy expiry, as a pure function of the row and the clock: an `Approved`
/// invitation whose expiration has passed reads as `Expired`. The verifier
/// persists the flip when it observes it; everything else just consults
/// this.
pub fn effective_status(
  status: InvitationStatus,
  expiration_date: DateTime<Utc>,
  now: DateTime<Utc>,
) -> InvitationStatus {
  if status == InvitationStatus::Approved && now > expiration_date {
    InvitationStatus::Expired
  } else {
    status
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
  pub invitation_id:       Uuid,
  pub resident_id:         Uuid,
  pub visitor:             Identity,
  pub scheduled_date:      DateTime<Utc>,
  /// End of validity. Defaults to `scheduled_date` at creation.
  pub expiration_date:     DateTime<Utc>,
  pub status:              InvitationStatus,
  /// Hex HMAC the approved pass carries; set on approval, never before.
  pub qr_signature:        Option<String>,
  /// Pass issuance time in ms since the epoch; set on approval.
  pub qr_issued_at_ms:     Option<i64>,
  pub vehicle:             Option<VehicleInfo>,
  pub notes:               Option<String>,
  pub check_in_time:       Option<DateTime<Utc>>,
  pub check_out_time:      Option<DateTime<Utc>>,
  pub rejection_reason:    Option<String>,
  pub cancellation_reason: Option<String>,
  /// The visitor record created or linked at check-in.
  pub visitor_id:          Option<Uuid>,
  pub created_at:          DateTime<Utc>,
}

impl Invitation {
  /// Stored status with lazy expiry applied.
  pub fn effective_status(&self, now: DateTime<Utc>) -> InvitationStatus {
    effective_status(self.status, self.expiration_date, now)
  }
}

/// Input to [`crate::store::AccessStore::create_invitation`].
/// Every invitation starts `Pending`; approval is a separate transition.
#[derive(Debug, Clone)]
pub struct NewInvitation {
  pub resident_id:     Uuid,
  pub visitor:         Identity,
  pub scheduled_date:  DateTime<Utc>,
  /// Defaults to `scheduled_date` when absent.
  pub expiration_date: Option<DateTime<Utc>>,
  pub vehicle:         Option<VehicleInfo>,
  pub notes:           Option<String>,
  /// Pre-registered visitor to link at check-in, if any.
  pub visitor_id:      Option<Uuid>,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// Per-resident lifecycle counts for the invitations dashboard.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct InvitationStats {
  pub total:     u64,
  pub pending:   u64,
  pub approved:  u64,
  pub used:      u64,
  pub rejected:  u64,
  pub expired:   u64,
  pub cancelled: u64,
  /// Scheduled today.
  pub today:     u64,
  /// Approved with a scheduled date still in the future.
  pub upcoming:  u64,
}
