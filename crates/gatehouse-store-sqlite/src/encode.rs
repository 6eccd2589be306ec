//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings, lexicographically ordered
//! within a column so SQL range comparisons work directly. Status and method
//! discriminants are stored as their `as_str` snake_case forms. Vehicle
//! details, payloads and metadata are compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use gatehouse_core::{
  directory::{Party, PartyRole},
  entry::{EntryLogEntry, EntryMethod, EntryRefs},
  frequent::FrequentVisitor,
  identity::{Identity, VehicleInfo},
  invitation::{Invitation, InvitationStatus},
  visitor::{Visitor, VisitorStatus},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Discriminants ───────────────────────────────────────────────────────────

pub fn decode_party_role(s: &str) -> Result<PartyRole> {
  match s {
    "resident" => Ok(PartyRole::Resident),
    "guard" => Ok(PartyRole::Guard),
    "admin" => Ok(PartyRole::Admin),
    other => Err(Error::Decode(format!("unknown party role: {other:?}"))),
  }
}

pub fn decode_invitation_status(s: &str) -> Result<InvitationStatus> {
  match s {
    "pending" => Ok(InvitationStatus::Pending),
    "approved" => Ok(InvitationStatus::Approved),
    "used" => Ok(InvitationStatus::Used),
    "rejected" => Ok(InvitationStatus::Rejected),
    "expired" => Ok(InvitationStatus::Expired),
    "cancelled" => Ok(InvitationStatus::Cancelled),
    other => {
      Err(Error::Decode(format!("unknown invitation status: {other:?}")))
    }
  }
}

pub fn decode_visitor_status(s: &str) -> Result<VisitorStatus> {
  match s {
    "pending" => Ok(VisitorStatus::Pending),
    "approved" => Ok(VisitorStatus::Approved),
    "in_property" => Ok(VisitorStatus::InProperty),
    "completed" => Ok(VisitorStatus::Completed),
    "rejected" => Ok(VisitorStatus::Rejected),
    other => Err(Error::Decode(format!("unknown visitor status: {other:?}"))),
  }
}

pub fn decode_method(s: &str) -> Result<EntryMethod> {
  match s {
    "qr" => Ok(EntryMethod::Qr),
    "facial" => Ok(EntryMethod::Facial),
    "lpr" => Ok(EntryMethod::Lpr),
    "manual" => Ok(EntryMethod::Manual),
    other => Err(Error::Decode(format!("unknown entry method: {other:?}"))),
  }
}

// ─── Vehicle / JSON columns ──────────────────────────────────────────────────

pub fn encode_vehicle(v: &VehicleInfo) -> Result<String> {
  Ok(serde_json::to_string(v)?)
}

pub fn decode_vehicle(s: &str) -> Result<VehicleInfo> {
  Ok(serde_json::from_str(s)?)
}

pub fn decode_json(s: &str) -> Result<serde_json::Value> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `parties` row.
pub struct RawParty {
  pub party_id:    String,
  pub role:        String,
  pub name:        String,
  pub document_id: Option<String>,
  pub unit:        Option<String>,
  pub active:      bool,
  pub created_at:  String,
}

impl RawParty {
  pub const COLUMNS: &'static str =
    "party_id, role, name, document_id, unit, active, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      party_id:    row.get(0)?,
      role:        row.get(1)?,
      name:        row.get(2)?,
      document_id: row.get(3)?,
      unit:        row.get(4)?,
      active:      row.get(5)?,
      created_at:  row.get(6)?,
    })
  }

  pub fn into_party(self) -> Result<Party> {
    Ok(Party {
      party_id:    decode_uuid(&self.party_id)?,
      role:        decode_party_role(&self.role)?,
      name:        self.name,
      document_id: self.document_id,
      unit:        self.unit,
      active:      self.active,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `visitors` row.
pub struct RawVisitor {
  pub visitor_id:     String,
  pub resident_id:    String,
  pub name:           String,
  pub document_id:    String,
  pub status:         String,
  pub visit_purpose:  Option<String>,
  pub scheduled_date: String,
  pub check_in_time:  Option<String>,
  pub check_out_time: Option<String>,
  pub created_at:     String,
}

impl RawVisitor {
  pub const COLUMNS: &'static str = "visitor_id, resident_id, name, \
                                     document_id, status, visit_purpose, \
                                     scheduled_date, check_in_time, \
                                     check_out_time, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      visitor_id:     row.get(0)?,
      resident_id:    row.get(1)?,
      name:           row.get(2)?,
      document_id:    row.get(3)?,
      status:         row.get(4)?,
      visit_purpose:  row.get(5)?,
      scheduled_date: row.get(6)?,
      check_in_time:  row.get(7)?,
      check_out_time: row.get(8)?,
      created_at:     row.get(9)?,
    })
  }

  pub fn into_visitor(self) -> Result<Visitor> {
    Ok(Visitor {
      visitor_id:     decode_uuid(&self.visitor_id)?,
      resident_id:    decode_uuid(&self.resident_id)?,
      identity:       Identity {
        name:        self.name,
        document_id: self.document_id,
      },
      status:         decode_visitor_status(&self.status)?,
      visit_purpose:  self.visit_purpose,
      scheduled_date: decode_dt(&self.scheduled_date)?,
      check_in_time:  self.check_in_time.as_deref().map(decode_dt).transpose()?,
      check_out_time: self
        .check_out_time
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `invitations` row.
pub struct RawInvitation {
  pub invitation_id:       String,
  pub resident_id:         String,
  pub visitor_name:        String,
  pub visitor_document:    String,
  pub scheduled_date:      String,
  pub expiration_date:     String,
  pub status:              String,
  pub qr_signature:        Option<String>,
  pub qr_issued_at_ms:     Option<i64>,
  pub vehicle_json:        Option<String>,
  pub notes:               Option<String>,
  pub check_in_time:       Option<String>,
  pub check_out_time:      Option<String>,
  pub rejection_reason:    Option<String>,
  pub cancellation_reason: Option<String>,
  pub visitor_id:          Option<String>,
  pub created_at:          String,
}

impl RawInvitation {
  pub const COLUMNS: &'static str =
    "invitation_id, resident_id, visitor_name, visitor_document, \
     scheduled_date, expiration_date, status, qr_signature, qr_issued_at_ms, \
     vehicle_json, notes, check_in_time, check_out_time, rejection_reason, \
     cancellation_reason, visitor_id, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      invitation_id:       row.get(0)?,
      resident_id:         row.get(1)?,
      visitor_name:        row.get(2)?,
      visitor_document:    row.get(3)?,
      scheduled_date:      row.get(4)?,
      expiration_date:     row.get(5)?,
      status:              row.get(6)?,
      qr_signature:        row.get(7)?,
      qr_issued_at_ms:     row.get(8)?,
      vehicle_json:        row.get(9)?,
      notes:               row.get(10)?,
      check_in_time:       row.get(11)?,
      check_out_time:      row.get(12)?,
      rejection_reason:    row.get(13)?,
      cancellation_reason: row.get(14)?,
      visitor_id:          row.get(15)?,
      created_at:          row.get(16)?,
    })
  }

  pub fn into_invitation(self) -> Result<Invitation> {
    Ok(Invitation {
      invitation_id:       decode_uuid(&self.invitation_id)?,
      resident_id:         decode_uuid(&self.resident_id)?,
      visitor:             Identity {
        name:        self.visitor_name,
        document_id: self.visitor_document,
      },
      scheduled_date:      decode_dt(&self.scheduled_date)?,
      expiration_date:     decode_dt(&self.expiration_date)?,
      status:              decode_invitation_status(&self.status)?,
      qr_signature:        self.qr_signature,
      qr_issued_at_ms:     self.qr_issued_at_ms,
      vehicle:             self
        .vehicle_json
        .as_deref()
        .map(decode_vehicle)
        .transpose()?,
      notes:               self.notes,
      check_in_time:       self
        .check_in_time
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      check_out_time:      self
        .check_out_time
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      rejection_reason:    self.rejection_reason,
      cancellation_reason: self.cancellation_reason,
      visitor_id:          self.visitor_id.as_deref().map(decode_uuid).transpose()?,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `frequent_visitors` row.
pub struct RawFrequentVisitor {
  pub frequent_visitor_id: String,
  pub resident_id:         String,
  pub name:                String,
  pub document_id:         String,
  pub vehicle_json:        Option<String>,
  pub notes:               Option<String>,
  pub visit_count:         u64,
  pub last_visit:          Option<String>,
  pub active:              bool,
  pub created_at:          String,
}

impl RawFrequentVisitor {
  pub const COLUMNS: &'static str =
    "frequent_visitor_id, resident_id, name, document_id, vehicle_json, \
     notes, visit_count, last_visit, active, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      frequent_visitor_id: row.get(0)?,
      resident_id:         row.get(1)?,
      name:                row.get(2)?,
      document_id:         row.get(3)?,
      vehicle_json:        row.get(4)?,
      notes:               row.get(5)?,
      visit_count:         row.get(6)?,
      last_visit:          row.get(7)?,
      active:              row.get(8)?,
      created_at:          row.get(9)?,
    })
  }

  pub fn into_frequent_visitor(self) -> Result<FrequentVisitor> {
    Ok(FrequentVisitor {
      frequent_visitor_id: decode_uuid(&self.frequent_visitor_id)?,
      resident_id:         decode_uuid(&self.resident_id)?,
      identity:            Identity {
        name:        self.name,
        document_id: self.document_id,
      },
      vehicle:             self
        .vehicle_json
        .as_deref()
        .map(decode_vehicle)
        .transpose()?,
      notes:               self.notes,
      visit_count:         self.visit_count,
      last_visit:          self.last_visit.as_deref().map(decode_dt).transpose()?,
      active:              self.active,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `entry_logs` row.
pub struct RawEntry {
  pub entry_id:       String,
  pub method:         String,
  pub visitor_id:     Option<String>,
  pub resident_id:    Option<String>,
  pub vehicle_id:     Option<String>,
  pub invitation_id:  Option<String>,
  pub guard_id:       Option<String>,
  pub arrival_time:   String,
  pub departure_time: Option<String>,
  pub payload:        Option<String>,
  pub metadata:       Option<String>,
}

impl RawEntry {
  pub const COLUMNS: &'static str =
    "entry_id, method, visitor_id, resident_id, vehicle_id, invitation_id, \
     guard_id, arrival_time, departure_time, payload, metadata";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:       row.get(0)?,
      method:         row.get(1)?,
      visitor_id:     row.get(2)?,
      resident_id:    row.get(3)?,
      vehicle_id:     row.get(4)?,
      invitation_id:  row.get(5)?,
      guard_id:       row.get(6)?,
      arrival_time:   row.get(7)?,
      departure_time: row.get(8)?,
      payload:        row.get(9)?,
      metadata:       row.get(10)?,
    })
  }

  pub fn into_entry(self) -> Result<EntryLogEntry> {
    let refs = EntryRefs {
      visitor_id:    self.visitor_id.as_deref().map(decode_uuid).transpose()?,
      resident_id:   self.resident_id.as_deref().map(decode_uuid).transpose()?,
      vehicle_id:    self.vehicle_id.as_deref().map(decode_uuid).transpose()?,
      invitation_id: self
        .invitation_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      guard_id:      self.guard_id.as_deref().map(decode_uuid).transpose()?,
    };
    Ok(EntryLogEntry {
      entry_id: decode_uuid(&self.entry_id)?,
      method: decode_method(&self.method)?,
      refs,
      arrival_time: decode_dt(&self.arrival_time)?,
      departure_time: self
        .departure_time
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      payload: self.payload.as_deref().map(decode_json).transpose()?,
      metadata: self.metadata.as_deref().map(decode_json).transpose()?,
    })
  }
}
