//! Entry ledger types — the append-only journal of arrivals and departures.
//!
//! Rows are never updated except to close an open entry with its departure
//! time. References to other entities are weak: deleting a visitor or
//! invitation nulls the reference but never touches the log row.

use std::fmt;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How an admission was decided. Facial and plate events arrive from
/// external recognizers as already-resolved facts; invitation check-ins
/// record `Qr` and carry the invitation reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryMethod {
  Qr,
  Facial,
  Lpr,
  Manual,
}

impl EntryMethod {
  pub const ALL: [EntryMethod; 4] =
    [Self::Qr, Self::Facial, Self::Lpr, Self::Manual];

  /// The discriminant string stored in the `method` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Qr => "qr",
      Self::Facial => "facial",
      Self::Lpr => "lpr",
      Self::Manual => "manual",
    }
  }
}

impl fmt::Display for EntryMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Refs ────────────────────────────────────────────────────────────────────

/// Weak references from a ledger row to the entities involved in the event.
/// Lookup only; no cascading ownership in either direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRefs {
  pub visitor_id:    Option<Uuid>,
  pub resident_id:   Option<Uuid>,
  pub vehicle_id:    Option<Uuid>,
  pub invitation_id: Option<Uuid>,
  pub guard_id:      Option<Uuid>,
}

impl EntryRefs {
  /// An entry must involve at least one subject.
  pub fn is_empty(&self) -> bool {
    self.visitor_id.is_none()
      && self.resident_id.is_none()
      && self.vehicle_id.is_none()
      && self.invitation_id.is_none()
      && self.guard_id.is_none()
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Metadata key marking a departure recorded without a matching open
/// arrival. Such rows are anomalies for reporting, never rejected requests.
pub const ANOMALY_KEY: &str = "anomaly";
pub const ANOMALY_UNMATCHED_DEPARTURE: &str = "unmatched_departure";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryLogEntry {
  pub entry_id:       Uuid,
  pub method:         EntryMethod,
  pub refs:           EntryRefs,
  pub arrival_time:   DateTime<Utc>,
  /// When present, always ≥ `arrival_time`.
  pub departure_time: Option<DateTime<Utc>>,
  /// Raw event data as presented at the gate (e.g. the decoded pass).
  pub payload:        Option<serde_json::Value>,
  /// Operational context (gate name, anomaly flags, recognizer details).
  pub metadata:       Option<serde_json::Value>,
}

impl EntryLogEntry {
  /// Whole minutes between arrival and departure, if departed.
  pub fn duration_minutes(&self) -> Option<i64> {
    self
      .departure_time
      .map(|out| (out - self.arrival_time).num_minutes())
  }

  pub fn is_open(&self) -> bool { self.departure_time.is_none() }

  /// True when this row records an unmatched departure.
  pub fn is_anomalous(&self) -> bool {
    self
      .metadata
      .as_ref()
      .and_then(|m| m.get(ANOMALY_KEY))
      .is_some()
  }
}

/// Input to [`crate::store::AccessStore::record_arrival`].
#[derive(Debug, Clone)]
pub struct NewEntry {
  pub method:       EntryMethod,
  pub refs:         EntryRefs,
  pub arrival_time: DateTime<Utc>,
  pub payload:      Option<serde_json::Value>,
  pub metadata:     Option<serde_json::Value>,
}

/// Visitor-or-resident selector for [`record_departure`].
///
/// [`record_departure`]: crate::store::AccessStore::record_departure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySubject {
  Visitor(Uuid),
  Resident(Uuid),
}

/// Result of a departure: the closed (or newly created) row and whether a
/// matching open arrival existed.
#[derive(Debug, Clone, Serialize)]
pub struct DepartureOutcome {
  pub entry:   EntryLogEntry,
  pub matched: bool,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// Admission counts over one reporting window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodCounts {
  pub qr:     u64,
  pub facial: u64,
  pub lpr:    u64,
  pub manual: u64,
  pub total:  u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EntryStats {
  pub today:           MethodCounts,
  /// Trailing seven days, including today.
  pub week:            MethodCounts,
  /// Visitors currently on-site (open entries with a visitor ref).
  pub active_visitors: u64,
}

// ─── Reporting windows ───────────────────────────────────────────────────────

/// Midnight at the start of `now`'s day.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
  now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Midnight seven days before `now`'s day; the "this week" lower bound.
pub fn start_of_week_window(now: DateTime<Utc>) -> DateTime<Utc> {
  start_of_day(now) - Duration::days(7)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn duration_is_whole_minutes() {
    let arrival = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    let entry = EntryLogEntry {
      entry_id:       Uuid::new_v4(),
      method:         EntryMethod::Qr,
      refs:           EntryRefs::default(),
      arrival_time:   arrival,
      departure_time: Some(arrival + Duration::seconds(150)),
      payload:        None,
      metadata:       None,
    };
    assert_eq!(entry.duration_minutes(), Some(2));
    assert!(!entry.is_open());
  }

  #[test]
  fn open_entry_has_no_duration() {
    let entry = EntryLogEntry {
      entry_id:       Uuid::new_v4(),
      method:         EntryMethod::Manual,
      refs:           EntryRefs::default(),
      arrival_time:   Utc::now(),
      departure_time: None,
      payload:        None,
      metadata:       None,
    };
    assert_eq!(entry.duration_minutes(), None);
    assert!(entry.is_open());
  }

  #[test]
  fn anomaly_flag_is_read_from_metadata() {
    let mut entry = EntryLogEntry {
      entry_id:       Uuid::new_v4(),
      method:         EntryMethod::Qr,
      refs:           EntryRefs::default(),
      arrival_time:   Utc::now(),
      departure_time: Some(Utc::now()),
      payload:        None,
      metadata:       None,
    };
    assert!(!entry.is_anomalous());
    entry.metadata =
      Some(serde_json::json!({ ANOMALY_KEY: ANOMALY_UNMATCHED_DEPARTURE }));
    assert!(entry.is_anomalous());
  }

  #[test]
  fn reporting_windows() {
    let now = Utc.with_ymd_and_hms(2025, 1, 8, 15, 30, 45).unwrap();
    assert_eq!(
      start_of_day(now),
      Utc.with_ymd_and_hms(2025, 1, 8, 0, 0, 0).unwrap()
    );
    assert_eq!(
      start_of_week_window(now),
      Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    );
  }

  #[test]
  fn empty_refs() {
    assert!(EntryRefs::default().is_empty());
    let refs = EntryRefs {
      visitor_id: Some(Uuid::new_v4()),
      ..Default::default()
    };
    assert!(!refs.is_empty());
  }
}
