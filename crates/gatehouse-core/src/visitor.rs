//! Visitor — the record of an actual (or in-progress) visit, distinct from
//! the invitation that may have authorized it.
//!
//! Created at first successful invitation check-in, or directly by a
//! resident. Owned exclusively by the resident who registered it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::Identity;

/// Visitor lifecycle states.
/// `Pending → Approved → InProperty → Completed`, with `Rejected` as an
/// alternate terminal from `Pending` or `Approved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitorStatus {
  Pending,
  Approved,
  InProperty,
  Completed,
  Rejected,
}

impl VisitorStatus {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Completed | Self::Rejected)
  }

  /// The discriminant string stored in the `status` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Approved => "approved",
      Self::InProperty => "in_property",
      Self::Completed => "completed",
      Self::Rejected => "rejected",
    }
  }
}

impl fmt::Display for VisitorStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visitor {
  pub visitor_id:     Uuid,
  pub resident_id:    Uuid,
  pub identity:       Identity,
  pub status:         VisitorStatus,
  pub visit_purpose:  Option<String>,
  pub scheduled_date: DateTime<Utc>,
  /// Set exactly once, by the check-in transition.
  pub check_in_time:  Option<DateTime<Utc>>,
  pub check_out_time: Option<DateTime<Utc>>,
  pub created_at:     DateTime<Utc>,
}

/// Input to [`crate::store::AccessStore::create_visitor`].
#[derive(Debug, Clone)]
pub struct NewVisitor {
  pub resident_id:    Uuid,
  pub identity:       Identity,
  pub scheduled_date: DateTime<Utc>,
  pub visit_purpose:  Option<String>,
  /// Skip the approval step and start `Approved`.
  pub auto_approve:   bool,
}
