//! Frequent visitors — a resident-curated roster of people who visit often
//! enough that re-typing their details for every invitation is a chore.
//!
//! A roster entry can mint a pre-approved invitation in one step. Removal is
//! a soft deactivation so the visit history stays meaningful.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::identity::{Identity, VehicleInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequentVisitor {
  pub frequent_visitor_id: Uuid,
  pub resident_id:         Uuid,
  pub identity:            Identity,
  pub vehicle:             Option<VehicleInfo>,
  pub notes:               Option<String>,
  /// Invitations minted from this entry.
  pub visit_count:         u64,
  pub last_visit:          Option<DateTime<Utc>>,
  pub active:              bool,
  pub created_at:          DateTime<Utc>,
}

/// Input to [`crate::store::AccessStore::add_frequent_visitor`]. At most one
/// active entry per `(resident, document)` pair.
#[derive(Debug, Clone)]
pub struct NewFrequentVisitor {
  pub resident_id: Uuid,
  pub identity:    Identity,
  pub vehicle:     Option<VehicleInfo>,
  pub notes:       Option<String>,
}
