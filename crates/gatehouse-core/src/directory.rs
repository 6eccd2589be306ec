//! Directory records and the lookup interface the gate depends on.
//!
//! The directory proper (profiles, photos, vehicles, credentials for the
//! resident app) lives outside this core. What lives here is the flat,
//! role-tagged identity record the verifier resolves tokens against, and
//! the trait any directory backend implements.

use std::{fmt, future::Future};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{identity::Identity, invitation::InvitationStatus};

/// Role tag for a directory record. One flat record type for all roles; no
/// subtype tables, no runtime type sniffing to decide which fields exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
  Resident,
  Guard,
  Admin,
}

impl PartyRole {
  /// The discriminant string stored in the `role` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Resident => "resident",
      Self::Guard => "guard",
      Self::Admin => "admin",
    }
  }
}

impl fmt::Display for PartyRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A person known to the community.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
  pub party_id:    Uuid,
  pub role:        PartyRole,
  pub name:        String,
  pub document_id: Option<String>,
  /// Free-form residence label, e.g. "A-12" or "T2-504".
  pub unit:        Option<String>,
  pub active:      bool,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::AccessStore::add_party`].
#[derive(Debug, Clone)]
pub struct NewParty {
  pub role:        PartyRole,
  pub name:        String,
  pub document_id: Option<String>,
  pub unit:        Option<String>,
}

/// Slim invitation projection for external consumers that only need to know
/// who is expected and whether the invitation still stands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationSummary {
  pub invitation_id:  Uuid,
  pub resident_id:    Uuid,
  pub visitor:        Identity,
  /// Effective status, lazy expiry already applied.
  pub status:         InvitationStatus,
  pub scheduled_date: DateTime<Utc>,
}

/// Identity lookup consumed by the verifier.
///
/// Absence of a directory record does not by itself invalidate a
/// structurally valid, correctly signed, unexpired credential; the token is
/// self-authorizing and the directory only enriches the grant.
pub trait Directory: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  /// Resolve a resident by id. `None` when absent or the record is not a
  /// resident.
  fn resolve_resident(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Party>, Self::Error>> + Send + '_;

  /// Resolve an invitation to its summary view, effective status included.
  fn resolve_invitation(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<InvitationSummary>, Self::Error>>
  + Send
  + '_;
}
