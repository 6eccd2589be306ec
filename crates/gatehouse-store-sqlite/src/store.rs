//! [`SqliteStore`] — the SQLite implementation of [`AccessStore`] and
//! [`Directory`].
//!
//! Every state-machine transition runs inside one transaction as a
//! compare-and-swap: the `UPDATE` carries the expected source status, and a
//! zero-row result is classified by re-reading the row in the same
//! transaction. Concurrent guards therefore get exactly one winner per
//! invitation, with the loser told which state it actually found.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use gatehouse_core::{
  Error as CoreError,
  directory::{Directory, InvitationSummary, NewParty, Party, PartyRole},
  entry::{
    ANOMALY_KEY, ANOMALY_UNMATCHED_DEPARTURE, DepartureOutcome, EntryLogEntry,
    EntryMethod, EntryStats, EntrySubject, MethodCounts, NewEntry,
    start_of_day, start_of_week_window,
  },
  frequent::{FrequentVisitor, NewFrequentVisitor},
  invitation::{Invitation, InvitationStats, InvitationStatus, NewInvitation},
  store::{
    AccessStore, EntryQuery, InvitationQuery, MAX_ACTIVE_LIMIT,
    MAX_LATEST_LIMIT, Page, VisitorQuery,
  },
  visitor::{NewVisitor, Visitor, VisitorStatus},
};

use crate::{
  Error, Result,
  encode::{
    RawEntry, RawFrequentVisitor, RawInvitation, RawParty, RawVisitor,
    decode_method, decode_uuid, decode_visitor_status, encode_dt, encode_uuid,
    encode_vehicle,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Gatehouse access store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load_invitation(&self, id: Uuid) -> Result<Option<RawInvitation>> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM invitations WHERE invitation_id = ?1",
      RawInvitation::COLUMNS
    );
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawInvitation::from_row)
            .optional()?,
        )
      })
      .await?;
    Ok(raw)
  }
}

// ─── CAS classification ──────────────────────────────────────────────────────

/// What a check-in transaction left behind. Decoding into domain types
/// happens outside the connection closure, where errors have somewhere to
/// go.
enum CheckInRow {
  /// The invitation CAS won; both rows reloaded post-commit.
  Admitted {
    invitation: RawInvitation,
    visitor:    RawVisitor,
  },
  /// The invitation CAS missed; the row as found (`None` = absent).
  Denied(Option<RawInvitation>),
  /// The invitation was fine but its linked visitor refused the
  /// transition. The whole transaction rolled back.
  VisitorBlocked {
    visitor_id: String,
    status:     Option<String>,
  },
}

/// Reload-and-classify after a plain invitation CAS: a miss on an existing
/// row means the transition was attempted from the wrong state.
fn settle_invitation_cas(
  id: Uuid,
  applied: bool,
  attempted: &'static str,
  raw: Option<RawInvitation>,
) -> Result<Invitation> {
  let Some(raw) = raw else {
    return Err(Error::Core(CoreError::InvitationNotFound(id)));
  };
  let invitation = raw.into_invitation()?;
  if applied {
    Ok(invitation)
  } else {
    Err(Error::Core(CoreError::InvalidInvitationTransition {
      from: invitation.status,
      attempted,
    }))
  }
}

fn settle_visitor_cas(
  id: Uuid,
  applied: bool,
  attempted: &'static str,
  raw: Option<RawVisitor>,
) -> Result<Visitor> {
  let Some(raw) = raw else {
    return Err(Error::Core(CoreError::VisitorNotFound(id)));
  };
  let visitor = raw.into_visitor()?;
  if applied {
    Ok(visitor)
  } else {
    Err(Error::Core(CoreError::InvalidVisitorTransition {
      from: visitor.status,
      attempted,
    }))
  }
}

/// The status a failed check-in actually found, mapped to its denial.
fn invitation_denial(status: InvitationStatus, id: Uuid) -> CoreError {
  match status {
    InvitationStatus::Pending => CoreError::InvitationPending(id),
    InvitationStatus::Used => CoreError::AlreadyUsed(id),
    InvitationStatus::Rejected => CoreError::InvitationRejected(id),
    InvitationStatus::Cancelled => CoreError::InvitationCancelled(id),
    InvitationStatus::Expired => CoreError::InvitationExpired(id),
    // The CAS and this classification run in one transaction, so an
    // approved-and-unexpired row cannot reach here.
    InvitationStatus::Approved => CoreError::InvalidInvitationTransition {
      from:      InvitationStatus::Approved,
      attempted: "check in",
    },
  }
}

// ─── SQL fragments ───────────────────────────────────────────────────────────

/// `AND method IN (...)` over closed-enum discriminants; empty = no filter.
fn method_filter(methods: &[EntryMethod]) -> String {
  if methods.is_empty() {
    return String::new();
  }
  let list = methods
    .iter()
    .map(|m| format!("'{}'", m.as_str()))
    .collect::<Vec<_>>()
    .join(", ");
  format!("AND method IN ({list})")
}

/// Effective-status filter for invitation lists: `Approved` excludes rows
/// past expiration, `Expired` includes them. `now_str` comes from
/// [`encode_dt`], never from user input.
fn invitation_status_filter(
  status: Option<InvitationStatus>,
  now_str: &str,
) -> String {
  match status {
    None => String::new(),
    Some(InvitationStatus::Approved) => format!(
      "AND status = 'approved' AND expiration_date >= '{now_str}'"
    ),
    Some(InvitationStatus::Expired) => format!(
      "AND (status = 'expired' \
        OR (status = 'approved' AND expiration_date < '{now_str}'))"
    ),
    Some(other) => format!("AND status = '{}'", other.as_str()),
  }
}

fn fold_method_counts(rows: Vec<(String, u64)>) -> Result<MethodCounts> {
  let mut counts = MethodCounts::default();
  for (method, n) in rows {
    match decode_method(&method)? {
      EntryMethod::Qr => counts.qr = n,
      EntryMethod::Facial => counts.facial = n,
      EntryMethod::Lpr => counts.lpr = n,
      EntryMethod::Manual => counts.manual = n,
    }
    counts.total += n;
  }
  Ok(counts)
}

// ─── AccessStore impl ────────────────────────────────────────────────────────

impl AccessStore for SqliteStore {
  type Error = Error;

  // ── Directory parties ─────────────────────────────────────────────────────

  async fn add_party(&self, input: NewParty) -> Result<Party> {
    let party = Party {
      party_id:    Uuid::new_v4(),
      role:        input.role,
      name:        input.name,
      document_id: input.document_id,
      unit:        input.unit,
      active:      true,
      created_at:  Utc::now(),
    };

    let id_str   = encode_uuid(party.party_id);
    let role_str = party.role.as_str().to_owned();
    let name     = party.name.clone();
    let document = party.document_id.clone();
    let unit     = party.unit.clone();
    let at_str   = encode_dt(party.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO parties (party_id, role, name, document_id, unit, active, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
          rusqlite::params![id_str, role_str, name, document, unit, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(party)
  }

  async fn get_party(&self, id: Uuid) -> Result<Option<Party>> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM parties WHERE party_id = ?1",
      RawParty::COLUMNS
    );

    let raw: Option<RawParty> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawParty::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawParty::into_party).transpose()
  }

  async fn list_parties(&self, role: Option<PartyRole>) -> Result<Vec<Party>> {
    let role_str = role.map(|r| r.as_str().to_owned());

    let raws: Vec<RawParty> = self
      .conn
      .call(move |conn| {
        let rows = if let Some(r) = role_str {
          let sql = format!(
            "SELECT {} FROM parties WHERE role = ?1 ORDER BY name",
            RawParty::COLUMNS
          );
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map(rusqlite::params![r], RawParty::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
          let sql =
            format!("SELECT {} FROM parties ORDER BY name", RawParty::COLUMNS);
          let mut stmt = conn.prepare(&sql)?;
          stmt
            .query_map([], RawParty::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawParty::into_party).collect()
  }

  // ── Invitations ───────────────────────────────────────────────────────────

  async fn create_invitation(&self, input: NewInvitation) -> Result<Invitation> {
    let invitation = Invitation {
      invitation_id:       Uuid::new_v4(),
      resident_id:         input.resident_id,
      visitor:             input.visitor,
      scheduled_date:      input.scheduled_date,
      expiration_date:     input.expiration_date.unwrap_or(input.scheduled_date),
      status:              InvitationStatus::Pending,
      qr_signature:        None,
      qr_issued_at_ms:     None,
      vehicle:             input.vehicle,
      notes:               input.notes,
      check_in_time:       None,
      check_out_time:      None,
      rejection_reason:    None,
      cancellation_reason: None,
      visitor_id:          input.visitor_id,
      created_at:          Utc::now(),
    };

    let id_str         = encode_uuid(invitation.invitation_id);
    let resident_str   = encode_uuid(invitation.resident_id);
    let name           = invitation.visitor.name.clone();
    let document       = invitation.visitor.document_id.clone();
    let scheduled_str  = encode_dt(invitation.scheduled_date);
    let expiration_str = encode_dt(invitation.expiration_date);
    let status_str     = invitation.status.as_str().to_owned();
    let vehicle_str    =
      invitation.vehicle.as_ref().map(encode_vehicle).transpose()?;
    let notes          = invitation.notes.clone();
    let visitor_str    = invitation.visitor_id.map(encode_uuid);
    let created_str    = encode_dt(invitation.created_at);

    let (resident_ok, visitor_ok): (bool, bool) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let resident_ok: bool = tx
          .query_row(
            "SELECT 1 FROM parties WHERE party_id = ?1 AND role = 'resident'",
            rusqlite::params![resident_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        let visitor_ok: bool = match &visitor_str {
          Some(v) => tx
            .query_row(
              "SELECT 1 FROM visitors WHERE visitor_id = ?1",
              rusqlite::params![v],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
          None => true,
        };

        if resident_ok && visitor_ok {
          tx.execute(
            "INSERT INTO invitations (
               invitation_id, resident_id, visitor_name, visitor_document,
               scheduled_date, expiration_date, status,
               vehicle_json, notes, visitor_id, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
              id_str,
              resident_str,
              name,
              document,
              scheduled_str,
              expiration_str,
              status_str,
              vehicle_str,
              notes,
              visitor_str,
              created_str,
            ],
          )?;
        }

        tx.commit()?;
        Ok((resident_ok, visitor_ok))
      })
      .await?;

    if !resident_ok {
      return Err(Error::Core(CoreError::ResidentNotFound(
        invitation.resident_id,
      )));
    }
    if !visitor_ok {
      // visitor_ok is false only when a link was requested.
      return Err(Error::Core(CoreError::VisitorNotFound(
        invitation.visitor_id.unwrap_or_default(),
      )));
    }

    Ok(invitation)
  }

  async fn get_invitation(&self, id: Uuid) -> Result<Option<Invitation>> {
    let raw = self.load_invitation(id).await?;
    raw.map(RawInvitation::into_invitation).transpose()
  }

  async fn approve_invitation(
    &self,
    id: Uuid,
    issued_at_ms: i64,
    signature: String,
    notes: Option<String>,
  ) -> Result<Invitation> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM invitations WHERE invitation_id = ?1",
      RawInvitation::COLUMNS
    );

    let (applied, raw): (bool, Option<RawInvitation>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let applied = tx.execute(
          "UPDATE invitations
           SET status = 'approved', qr_signature = ?2, qr_issued_at_ms = ?3,
               notes = COALESCE(?4, notes)
           WHERE invitation_id = ?1 AND status = 'pending'",
          rusqlite::params![id_str, signature, issued_at_ms, notes],
        )? > 0;
        let raw = tx
          .query_row(&sql, rusqlite::params![id_str], RawInvitation::from_row)
          .optional()?;
        tx.commit()?;
        Ok((applied, raw))
      })
      .await?;

    settle_invitation_cas(id, applied, "approve", raw)
  }

  async fn reject_invitation(
    &self,
    id: Uuid,
    reason: String,
  ) -> Result<Invitation> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM invitations WHERE invitation_id = ?1",
      RawInvitation::COLUMNS
    );

    let (applied, raw): (bool, Option<RawInvitation>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let applied = tx.execute(
          "UPDATE invitations SET status = 'rejected', rejection_reason = ?2
           WHERE invitation_id = ?1 AND status = 'pending'",
          rusqlite::params![id_str, reason],
        )? > 0;
        let raw = tx
          .query_row(&sql, rusqlite::params![id_str], RawInvitation::from_row)
          .optional()?;
        tx.commit()?;
        Ok((applied, raw))
      })
      .await?;

    settle_invitation_cas(id, applied, "reject", raw)
  }

  async fn cancel_invitation(
    &self,
    id: Uuid,
    reason: String,
  ) -> Result<Invitation> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM invitations WHERE invitation_id = ?1",
      RawInvitation::COLUMNS
    );

    let (applied, raw): (bool, Option<RawInvitation>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let applied = tx.execute(
          "UPDATE invitations SET status = 'cancelled', cancellation_reason = ?2
           WHERE invitation_id = ?1 AND status IN ('pending', 'approved')",
          rusqlite::params![id_str, reason],
        )? > 0;
        let raw = tx
          .query_row(&sql, rusqlite::params![id_str], RawInvitation::from_row)
          .optional()?;
        tx.commit()?;
        Ok((applied, raw))
      })
      .await?;

    settle_invitation_cas(id, applied, "cancel", raw)
  }

  async fn expire_invitation(&self, id: Uuid) -> Result<Invitation> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM invitations WHERE invitation_id = ?1",
      RawInvitation::COLUMNS
    );

    let raw: Option<RawInvitation> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        // Losing this CAS is fine: someone else already advanced the row.
        tx.execute(
          "UPDATE invitations SET status = 'expired'
           WHERE invitation_id = ?1 AND status = 'approved'",
          rusqlite::params![id_str],
        )?;
        let raw = tx
          .query_row(&sql, rusqlite::params![id_str], RawInvitation::from_row)
          .optional()?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    let Some(raw) = raw else {
      return Err(Error::Core(CoreError::InvitationNotFound(id)));
    };
    Ok(raw.into_invitation()?)
  }

  async fn check_in_invitation(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<(Invitation, Visitor)> {
    let id_str          = encode_uuid(id);
    let now_str         = encode_dt(now);
    let new_visitor_str = encode_uuid(Uuid::new_v4());
    let inv_sql = format!(
      "SELECT {} FROM invitations WHERE invitation_id = ?1",
      RawInvitation::COLUMNS
    );
    let vis_sql = format!(
      "SELECT {} FROM visitors WHERE visitor_id = ?1",
      RawVisitor::COLUMNS
    );

    let outcome: CheckInRow = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // One winner: the expected status and the expiration window are
        // both part of the write.
        let applied = tx.execute(
          "UPDATE invitations SET status = 'used', check_in_time = ?2
           WHERE invitation_id = ?1
             AND status = 'approved'
             AND expiration_date >= ?2",
          rusqlite::params![id_str, now_str],
        )? > 0;

        if !applied {
          let raw = tx
            .query_row(&inv_sql, rusqlite::params![id_str], RawInvitation::from_row)
            .optional()?;
          // Persist the lazy expiry flip while we are here.
          if raw.as_ref().is_some_and(|r| r.status == "approved") {
            tx.execute(
              "UPDATE invitations SET status = 'expired'
               WHERE invitation_id = ?1",
              rusqlite::params![id_str],
            )?;
          }
          tx.commit()?;
          return Ok(CheckInRow::Denied(raw));
        }

        let linked: Option<String> = tx
          .query_row(
            "SELECT visitor_id FROM invitations WHERE invitation_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?
          .flatten();

        let visitor_id = match linked {
          Some(v) => {
            let moved = tx.execute(
              "UPDATE visitors SET status = 'in_property', check_in_time = ?2
               WHERE visitor_id = ?1 AND status IN ('pending', 'approved')",
              rusqlite::params![v, now_str],
            )? > 0;
            if !moved {
              let status: Option<String> = tx
                .query_row(
                  "SELECT status FROM visitors WHERE visitor_id = ?1",
                  rusqlite::params![v],
                  |r| r.get(0),
                )
                .optional()?;
              // Dropping the transaction rolls the invitation CAS back.
              return Ok(CheckInRow::VisitorBlocked { visitor_id: v, status });
            }
            v
          }
          None => {
            tx.execute(
              "INSERT INTO visitors (
                 visitor_id, resident_id, name, document_id, status,
                 visit_purpose, scheduled_date, check_in_time, created_at
               )
               SELECT ?2, resident_id, visitor_name, visitor_document,
                      'in_property', NULL, scheduled_date, ?3, ?3
               FROM invitations WHERE invitation_id = ?1",
              rusqlite::params![id_str, new_visitor_str, now_str],
            )?;
            tx.execute(
              "UPDATE invitations SET visitor_id = ?2 WHERE invitation_id = ?1",
              rusqlite::params![id_str, new_visitor_str],
            )?;
            new_visitor_str.clone()
          }
        };

        let invitation = tx.query_row(
          &inv_sql,
          rusqlite::params![id_str],
          RawInvitation::from_row,
        )?;
        let visitor = tx.query_row(
          &vis_sql,
          rusqlite::params![visitor_id],
          RawVisitor::from_row,
        )?;
        tx.commit()?;
        Ok(CheckInRow::Admitted { invitation, visitor })
      })
      .await?;

    match outcome {
      CheckInRow::Admitted { invitation, visitor } => {
        Ok((invitation.into_invitation()?, visitor.into_visitor()?))
      }
      CheckInRow::Denied(None) => {
        Err(Error::Core(CoreError::InvitationNotFound(id)))
      }
      CheckInRow::Denied(Some(raw)) => {
        let invitation = raw.into_invitation()?;
        Err(Error::Core(invitation_denial(
          invitation.effective_status(now),
          id,
        )))
      }
      CheckInRow::VisitorBlocked { visitor_id, status } => {
        let vid = decode_uuid(&visitor_id)?;
        match status {
          None => Err(Error::Core(CoreError::VisitorNotFound(vid))),
          Some(s) => {
            let status = decode_visitor_status(&s)?;
            if status == VisitorStatus::InProperty {
              Err(Error::Core(CoreError::AlreadyCheckedIn(vid)))
            } else {
              Err(Error::Core(CoreError::InvalidVisitorTransition {
                from:      status,
                attempted: "check in",
              }))
            }
          }
        }
      }
    }
  }

  async fn list_invitations(
    &self,
    query: &InvitationQuery,
    now: DateTime<Utc>,
  ) -> Result<Page<Invitation>> {
    let resident_str  = encode_uuid(query.resident_id);
    let now_str       = encode_dt(now);
    let status_clause = invitation_status_filter(query.status, &now_str);
    let page          = query.page.max(1);
    let limit         = query.capped_limit();
    let limit_val     = limit as i64;
    let offset_val    = ((page - 1) * limit) as i64;

    let sql = format!(
      "SELECT {cols} FROM invitations
       WHERE resident_id = ?1 {status_clause}
       ORDER BY created_at DESC
       LIMIT ?2 OFFSET ?3",
      cols = RawInvitation::COLUMNS,
    );
    let count_sql = format!(
      "SELECT COUNT(*) FROM invitations WHERE resident_id = ?1 {status_clause}"
    );

    let (raws, total): (Vec<RawInvitation>, u64) = self
      .conn
      .call(move |conn| {
        let total: u64 = conn.query_row(
          &count_sql,
          rusqlite::params![resident_str],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![resident_str, limit_val, offset_val],
            RawInvitation::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((rows, total))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawInvitation::into_invitation)
      .collect::<Result<_>>()?;

    Ok(Page { items, total, page, limit })
  }

  async fn invitation_stats(
    &self,
    resident_id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<InvitationStats> {
    let resident_str  = encode_uuid(resident_id);
    let now_str       = encode_dt(now);
    let day_start     = start_of_day(now);
    let day_start_str = encode_dt(day_start);
    let day_end_str   = encode_dt(day_start + Duration::days(1));

    let stats = self
      .conn
      .call(move |conn| {
        let (pending, approved, used, rejected, expired, cancelled, total): (
          u64,
          u64,
          u64,
          u64,
          u64,
          u64,
          u64,
        ) = conn.query_row(
          "SELECT
             COUNT(*) FILTER (WHERE status = 'pending'),
             COUNT(*) FILTER (WHERE status = 'approved'
                                AND expiration_date >= ?2),
             COUNT(*) FILTER (WHERE status = 'used'),
             COUNT(*) FILTER (WHERE status = 'rejected'),
             COUNT(*) FILTER (WHERE status = 'expired'
                                OR (status = 'approved'
                                    AND expiration_date < ?2)),
             COUNT(*) FILTER (WHERE status = 'cancelled'),
             COUNT(*)
           FROM invitations WHERE resident_id = ?1",
          rusqlite::params![resident_str, now_str],
          |r| {
            Ok((
              r.get(0)?,
              r.get(1)?,
              r.get(2)?,
              r.get(3)?,
              r.get(4)?,
              r.get(5)?,
              r.get(6)?,
            ))
          },
        )?;

        let today: u64 = conn.query_row(
          "SELECT COUNT(*) FROM invitations
           WHERE resident_id = ?1
             AND scheduled_date >= ?2 AND scheduled_date < ?3",
          rusqlite::params![resident_str, day_start_str, day_end_str],
          |r| r.get(0),
        )?;

        let upcoming: u64 = conn.query_row(
          "SELECT COUNT(*) FROM invitations
           WHERE resident_id = ?1
             AND status = 'approved'
             AND expiration_date >= ?2
             AND scheduled_date > ?2",
          rusqlite::params![resident_str, now_str],
          |r| r.get(0),
        )?;

        Ok(InvitationStats {
          total,
          pending,
          approved,
          used,
          rejected,
          expired,
          cancelled,
          today,
          upcoming,
        })
      })
      .await?;

    Ok(stats)
  }

  // ── Visitors ──────────────────────────────────────────────────────────────

  async fn create_visitor(&self, input: NewVisitor) -> Result<Visitor> {
    let status = if input.auto_approve {
      VisitorStatus::Approved
    } else {
      VisitorStatus::Pending
    };
    let visitor = Visitor {
      visitor_id:     Uuid::new_v4(),
      resident_id:    input.resident_id,
      identity:       input.identity,
      status,
      visit_purpose:  input.visit_purpose,
      scheduled_date: input.scheduled_date,
      check_in_time:  None,
      check_out_time: None,
      created_at:     Utc::now(),
    };

    let id_str        = encode_uuid(visitor.visitor_id);
    let resident_str  = encode_uuid(visitor.resident_id);
    let name          = visitor.identity.name.clone();
    let document      = visitor.identity.document_id.clone();
    let status_str    = visitor.status.as_str().to_owned();
    let purpose       = visitor.visit_purpose.clone();
    let scheduled_str = encode_dt(visitor.scheduled_date);
    let created_str   = encode_dt(visitor.created_at);

    let resident_ok: bool = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let resident_ok: bool = tx
          .query_row(
            "SELECT 1 FROM parties WHERE party_id = ?1 AND role = 'resident'",
            rusqlite::params![resident_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if resident_ok {
          tx.execute(
            "INSERT INTO visitors (
               visitor_id, resident_id, name, document_id, status,
               visit_purpose, scheduled_date, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
              id_str,
              resident_str,
              name,
              document,
              status_str,
              purpose,
              scheduled_str,
              created_str,
            ],
          )?;
        }

        tx.commit()?;
        Ok(resident_ok)
      })
      .await?;

    if !resident_ok {
      return Err(Error::Core(CoreError::ResidentNotFound(visitor.resident_id)));
    }
    Ok(visitor)
  }

  async fn get_visitor(&self, id: Uuid) -> Result<Option<Visitor>> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM visitors WHERE visitor_id = ?1",
      RawVisitor::COLUMNS
    );

    let raw: Option<RawVisitor> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawVisitor::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVisitor::into_visitor).transpose()
  }

  async fn approve_visitor(&self, id: Uuid) -> Result<Visitor> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM visitors WHERE visitor_id = ?1",
      RawVisitor::COLUMNS
    );

    let (applied, raw): (bool, Option<RawVisitor>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let applied = tx.execute(
          "UPDATE visitors SET status = 'approved'
           WHERE visitor_id = ?1 AND status = 'pending'",
          rusqlite::params![id_str],
        )? > 0;
        let raw = tx
          .query_row(&sql, rusqlite::params![id_str], RawVisitor::from_row)
          .optional()?;
        tx.commit()?;
        Ok((applied, raw))
      })
      .await?;

    settle_visitor_cas(id, applied, "approve", raw)
  }

  async fn reject_visitor(&self, id: Uuid) -> Result<Visitor> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM visitors WHERE visitor_id = ?1",
      RawVisitor::COLUMNS
    );

    let (applied, raw): (bool, Option<RawVisitor>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let applied = tx.execute(
          "UPDATE visitors SET status = 'rejected'
           WHERE visitor_id = ?1 AND status IN ('pending', 'approved')",
          rusqlite::params![id_str],
        )? > 0;
        let raw = tx
          .query_row(&sql, rusqlite::params![id_str], RawVisitor::from_row)
          .optional()?;
        tx.commit()?;
        Ok((applied, raw))
      })
      .await?;

    settle_visitor_cas(id, applied, "reject", raw)
  }

  async fn check_in_visitor(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Visitor> {
    let id_str  = encode_uuid(id);
    let now_str = encode_dt(now);
    let sql = format!(
      "SELECT {} FROM visitors WHERE visitor_id = ?1",
      RawVisitor::COLUMNS
    );

    let (applied, raw): (bool, Option<RawVisitor>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let applied = tx.execute(
          "UPDATE visitors SET status = 'in_property', check_in_time = ?2
           WHERE visitor_id = ?1 AND status = 'approved'",
          rusqlite::params![id_str, now_str],
        )? > 0;
        let raw = tx
          .query_row(&sql, rusqlite::params![id_str], RawVisitor::from_row)
          .optional()?;
        tx.commit()?;
        Ok((applied, raw))
      })
      .await?;

    let Some(raw) = raw else {
      return Err(Error::Core(CoreError::VisitorNotFound(id)));
    };
    let visitor = raw.into_visitor()?;
    if applied {
      return Ok(visitor);
    }
    if visitor.status == VisitorStatus::InProperty {
      Err(Error::Core(CoreError::AlreadyCheckedIn(id)))
    } else {
      Err(Error::Core(CoreError::InvalidVisitorTransition {
        from:      visitor.status,
        attempted: "check in",
      }))
    }
  }

  async fn check_out_visitor(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Visitor> {
    let id_str  = encode_uuid(id);
    let now_str = encode_dt(now);
    let sql = format!(
      "SELECT {} FROM visitors WHERE visitor_id = ?1",
      RawVisitor::COLUMNS
    );

    let (applied, raw): (bool, Option<RawVisitor>) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let applied = tx.execute(
          "UPDATE visitors SET status = 'completed', check_out_time = ?2
           WHERE visitor_id = ?1 AND status = 'in_property'",
          rusqlite::params![id_str, now_str],
        )? > 0;
        if applied {
          // Close the linked invitation's visit window, if one points here.
          tx.execute(
            "UPDATE invitations SET check_out_time = ?2
             WHERE visitor_id = ?1 AND check_out_time IS NULL",
            rusqlite::params![id_str, now_str],
          )?;
        }
        let raw = tx
          .query_row(&sql, rusqlite::params![id_str], RawVisitor::from_row)
          .optional()?;
        tx.commit()?;
        Ok((applied, raw))
      })
      .await?;

    let Some(raw) = raw else {
      return Err(Error::Core(CoreError::VisitorNotFound(id)));
    };
    let visitor = raw.into_visitor()?;
    if applied {
      Ok(visitor)
    } else {
      Err(Error::Core(CoreError::NotCheckedIn(id)))
    }
  }

  async fn list_visitors(&self, query: &VisitorQuery) -> Result<Page<Visitor>> {
    let resident_str = encode_uuid(query.resident_id);
    let status_str   = query.status.map(|s| s.as_str().to_owned());
    let after_str    = query.scheduled_after.map(encode_dt);
    let until_str    = query.scheduled_until.map(encode_dt);
    let pattern      = query.search.as_deref().map(|s| format!("%{s}%"));
    let page         = query.page.max(1);
    let limit        = query.capped_limit();
    let limit_val    = limit as i64;
    let offset_val   = ((page - 1) * limit) as i64;

    const WHERE: &str = "WHERE resident_id = ?1
         AND (?2 IS NULL OR status = ?2)
         AND (?3 IS NULL OR scheduled_date >= ?3)
         AND (?4 IS NULL OR scheduled_date <= ?4)
         AND (?5 IS NULL OR name LIKE ?5 OR document_id LIKE ?5)";

    let sql = format!(
      "SELECT {cols} FROM visitors
       {WHERE}
       ORDER BY scheduled_date DESC
       LIMIT ?6 OFFSET ?7",
      cols = RawVisitor::COLUMNS,
    );
    let count_sql = format!("SELECT COUNT(*) FROM visitors {WHERE}");

    let (raws, total): (Vec<RawVisitor>, u64) = self
      .conn
      .call(move |conn| {
        let total: u64 = conn.query_row(
          &count_sql,
          rusqlite::params![
            resident_str,
            status_str,
            after_str,
            until_str,
            pattern,
          ],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              resident_str,
              status_str,
              after_str,
              until_str,
              pattern,
              limit_val,
              offset_val,
            ],
            RawVisitor::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((rows, total))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawVisitor::into_visitor)
      .collect::<Result<_>>()?;

    Ok(Page { items, total, page, limit })
  }

  // ── Frequent-visitor roster ───────────────────────────────────────────────

  async fn add_frequent_visitor(
    &self,
    input: NewFrequentVisitor,
  ) -> Result<FrequentVisitor> {
    let entry = FrequentVisitor {
      frequent_visitor_id: Uuid::new_v4(),
      resident_id:         input.resident_id,
      identity:            input.identity,
      vehicle:             input.vehicle,
      notes:               input.notes,
      visit_count:         0,
      last_visit:          None,
      active:              true,
      created_at:          Utc::now(),
    };

    let id_str       = encode_uuid(entry.frequent_visitor_id);
    let resident_str = encode_uuid(entry.resident_id);
    let name         = entry.identity.name.clone();
    let document     = entry.identity.document_id.clone();
    let vehicle_str  = entry.vehicle.as_ref().map(encode_vehicle).transpose()?;
    let notes        = entry.notes.clone();
    let created_str  = encode_dt(entry.created_at);

    let (resident_ok, duplicate): (bool, bool) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let resident_ok: bool = tx
          .query_row(
            "SELECT 1 FROM parties WHERE party_id = ?1 AND role = 'resident'",
            rusqlite::params![resident_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        let duplicate: bool = resident_ok
          && tx
            .query_row(
              "SELECT 1 FROM frequent_visitors
               WHERE resident_id = ?1 AND document_id = ?2 AND active = 1",
              rusqlite::params![resident_str, document],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        if resident_ok && !duplicate {
          tx.execute(
            "INSERT INTO frequent_visitors (
               frequent_visitor_id, resident_id, name, document_id,
               vehicle_json, notes, visit_count, active, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, ?7)",
            rusqlite::params![
              id_str,
              resident_str,
              name,
              document,
              vehicle_str,
              notes,
              created_str,
            ],
          )?;
        }

        tx.commit()?;
        Ok((resident_ok, duplicate))
      })
      .await?;

    if !resident_ok {
      return Err(Error::Core(CoreError::ResidentNotFound(entry.resident_id)));
    }
    if duplicate {
      return Err(Error::Core(CoreError::DuplicateFrequentVisitor(
        entry.identity.document_id.clone(),
      )));
    }
    Ok(entry)
  }

  async fn get_frequent_visitor(
    &self,
    id: Uuid,
  ) -> Result<Option<FrequentVisitor>> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM frequent_visitors WHERE frequent_visitor_id = ?1",
      RawFrequentVisitor::COLUMNS
    );

    let raw: Option<RawFrequentVisitor> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![id_str],
              RawFrequentVisitor::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawFrequentVisitor::into_frequent_visitor).transpose()
  }

  async fn list_frequent_visitors(
    &self,
    resident_id: Uuid,
  ) -> Result<Vec<FrequentVisitor>> {
    let resident_str = encode_uuid(resident_id);
    let sql = format!(
      "SELECT {} FROM frequent_visitors
       WHERE resident_id = ?1 AND active = 1
       ORDER BY last_visit IS NULL, last_visit DESC, created_at DESC",
      RawFrequentVisitor::COLUMNS
    );

    let raws: Vec<RawFrequentVisitor> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![resident_str],
            RawFrequentVisitor::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawFrequentVisitor::into_frequent_visitor)
      .collect()
  }

  async fn deactivate_frequent_visitor(
    &self,
    id: Uuid,
  ) -> Result<FrequentVisitor> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {} FROM frequent_visitors WHERE frequent_visitor_id = ?1",
      RawFrequentVisitor::COLUMNS
    );

    let raw: Option<RawFrequentVisitor> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        // Idempotent by design of the roster: deactivating twice is a no-op.
        tx.execute(
          "UPDATE frequent_visitors SET active = 0
           WHERE frequent_visitor_id = ?1",
          rusqlite::params![id_str],
        )?;
        let raw = tx
          .query_row(
            &sql,
            rusqlite::params![id_str],
            RawFrequentVisitor::from_row,
          )
          .optional()?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    let Some(raw) = raw else {
      return Err(Error::Core(CoreError::FrequentVisitorNotFound(id)));
    };
    Ok(raw.into_frequent_visitor()?)
  }

  async fn record_frequent_visit(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<FrequentVisitor> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);
    let sql = format!(
      "SELECT {} FROM frequent_visitors WHERE frequent_visitor_id = ?1",
      RawFrequentVisitor::COLUMNS
    );

    let raw: Option<RawFrequentVisitor> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE frequent_visitors
           SET visit_count = visit_count + 1, last_visit = ?2
           WHERE frequent_visitor_id = ?1",
          rusqlite::params![id_str, at_str],
        )?;
        let raw = tx
          .query_row(
            &sql,
            rusqlite::params![id_str],
            RawFrequentVisitor::from_row,
          )
          .optional()?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    let Some(raw) = raw else {
      return Err(Error::Core(CoreError::FrequentVisitorNotFound(id)));
    };
    Ok(raw.into_frequent_visitor()?)
  }

  // ── Entry ledger ──────────────────────────────────────────────────────────

  async fn record_arrival(&self, input: NewEntry) -> Result<EntryLogEntry> {
    if input.refs.is_empty() {
      return Err(Error::Core(CoreError::EmptyEntryRefs));
    }

    let entry = EntryLogEntry {
      entry_id:       Uuid::new_v4(),
      method:         input.method,
      refs:           input.refs,
      arrival_time:   input.arrival_time,
      departure_time: None,
      payload:        input.payload,
      metadata:       input.metadata,
    };

    let id_str         = encode_uuid(entry.entry_id);
    let method_str     = entry.method.as_str().to_owned();
    let visitor_str    = entry.refs.visitor_id.map(encode_uuid);
    let resident_str   = entry.refs.resident_id.map(encode_uuid);
    let vehicle_str    = entry.refs.vehicle_id.map(encode_uuid);
    let invitation_str = entry.refs.invitation_id.map(encode_uuid);
    let guard_str      = entry.refs.guard_id.map(encode_uuid);
    let arrival_str    = encode_dt(entry.arrival_time);
    let payload_str    = entry.payload.as_ref().map(|v| v.to_string());
    let metadata_str   = entry.metadata.as_ref().map(|v| v.to_string());

    let (visitor_ok, invitation_ok): (bool, bool) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Referential sanity for rows this store owns; resident, guard and
        // vehicle refs may name subjects registered elsewhere.
        let visitor_ok: bool = match &visitor_str {
          Some(v) => tx
            .query_row(
              "SELECT 1 FROM visitors WHERE visitor_id = ?1",
              rusqlite::params![v],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
          None => true,
        };
        let invitation_ok: bool = match &invitation_str {
          Some(i) => tx
            .query_row(
              "SELECT 1 FROM invitations WHERE invitation_id = ?1",
              rusqlite::params![i],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
          None => true,
        };

        if visitor_ok && invitation_ok {
          tx.execute(
            "INSERT INTO entry_logs (
               entry_id, method, visitor_id, resident_id, vehicle_id,
               invitation_id, guard_id, arrival_time, payload, metadata
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
              id_str,
              method_str,
              visitor_str,
              resident_str,
              vehicle_str,
              invitation_str,
              guard_str,
              arrival_str,
              payload_str,
              metadata_str,
            ],
          )?;
        }

        tx.commit()?;
        Ok((visitor_ok, invitation_ok))
      })
      .await?;

    if !visitor_ok {
      return Err(Error::Core(CoreError::VisitorNotFound(
        entry.refs.visitor_id.unwrap_or_default(),
      )));
    }
    if !invitation_ok {
      return Err(Error::Core(CoreError::InvitationNotFound(
        entry.refs.invitation_id.unwrap_or_default(),
      )));
    }

    Ok(entry)
  }

  async fn record_departure(
    &self,
    subject: EntrySubject,
    at: DateTime<Utc>,
  ) -> Result<DepartureOutcome> {
    let (column, subject_id) = match subject {
      EntrySubject::Visitor(id) => ("visitor_id", id),
      EntrySubject::Resident(id) => ("resident_id", id),
    };
    let subject_str = encode_uuid(subject_id);
    let at_str      = encode_dt(at);
    let anomaly_str = encode_uuid(Uuid::new_v4());
    let metadata =
      serde_json::json!({ ANOMALY_KEY: ANOMALY_UNMATCHED_DEPARTURE })
        .to_string();

    let open_sql = format!(
      "SELECT entry_id FROM entry_logs
       WHERE {column} = ?1 AND departure_time IS NULL
       ORDER BY arrival_time DESC
       LIMIT 1"
    );
    let insert_sql = format!(
      "INSERT INTO entry_logs (
         entry_id, method, {column}, arrival_time, departure_time, metadata
       ) VALUES (?1, 'manual', ?2, ?3, ?3, ?4)"
    );
    let reload_sql = format!(
      "SELECT {} FROM entry_logs WHERE entry_id = ?1",
      RawEntry::COLUMNS
    );

    let (matched, raw): (bool, RawEntry) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let open: Option<String> = tx
          .query_row(&open_sql, rusqlite::params![subject_str], |r| r.get(0))
          .optional()?;

        let (matched, entry_id) = match open {
          Some(entry_id) => {
            tx.execute(
              "UPDATE entry_logs SET departure_time = ?2 WHERE entry_id = ?1",
              rusqlite::params![entry_id, at_str],
            )?;
            (true, entry_id)
          }
          None => {
            // No open arrival to close: keep the audit trace anyway, as a
            // zero-duration row flagged for reporting.
            tx.execute(
              &insert_sql,
              rusqlite::params![anomaly_str, subject_str, at_str, metadata],
            )?;
            (false, anomaly_str)
          }
        };

        let raw = tx.query_row(
          &reload_sql,
          rusqlite::params![entry_id],
          RawEntry::from_row,
        )?;
        tx.commit()?;
        Ok((matched, raw))
      })
      .await?;

    Ok(DepartureOutcome { entry: raw.into_entry()?, matched })
  }

  async fn latest_entries(
    &self,
    methods: Vec<EntryMethod>,
    limit: u64,
  ) -> Result<Vec<EntryLogEntry>> {
    let limit_val      = limit.clamp(1, MAX_LATEST_LIMIT) as i64;
    let methods_clause = method_filter(&methods);
    let sql = format!(
      "SELECT {cols} FROM entry_logs
       WHERE 1 = 1 {methods_clause}
       ORDER BY arrival_time DESC
       LIMIT ?1",
      cols = RawEntry::COLUMNS,
    );

    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }

  async fn query_entries(&self, query: &EntryQuery) -> Result<Page<EntryLogEntry>> {
    let from_str        = query.from.map(encode_dt);
    let until_str       = query.until.map(encode_dt);
    let methods_clause  = method_filter(&query.methods);
    let departed_clause = match query.departed {
      Some(true) => "AND departure_time IS NOT NULL",
      Some(false) => "AND departure_time IS NULL",
      None => "",
    };
    let page       = query.page.max(1);
    let limit      = query.capped_limit();
    let limit_val  = limit as i64;
    let offset_val = ((page - 1) * limit) as i64;

    let sql = format!(
      "SELECT {cols} FROM entry_logs
       WHERE (?1 IS NULL OR arrival_time >= ?1)
         AND (?2 IS NULL OR arrival_time <= ?2)
         {methods_clause}
         {departed_clause}
       ORDER BY arrival_time DESC
       LIMIT ?3 OFFSET ?4",
      cols = RawEntry::COLUMNS,
    );
    let count_sql = format!(
      "SELECT COUNT(*) FROM entry_logs
       WHERE (?1 IS NULL OR arrival_time >= ?1)
         AND (?2 IS NULL OR arrival_time <= ?2)
         {methods_clause}
         {departed_clause}"
    );

    let (raws, total): (Vec<RawEntry>, u64) = self
      .conn
      .call(move |conn| {
        let total: u64 = conn.query_row(
          &count_sql,
          rusqlite::params![from_str, until_str],
          |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![from_str, until_str, limit_val, offset_val],
            RawEntry::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((rows, total))
      })
      .await?;

    let items = raws
      .into_iter()
      .map(RawEntry::into_entry)
      .collect::<Result<_>>()?;

    Ok(Page { items, total, page, limit })
  }

  async fn active_entries(&self) -> Result<Vec<EntryLogEntry>> {
    let limit_val = MAX_ACTIVE_LIMIT as i64;
    let sql = format!(
      "SELECT {cols} FROM entry_logs
       WHERE visitor_id IS NOT NULL AND departure_time IS NULL
       ORDER BY arrival_time DESC
       LIMIT ?1",
      cols = RawEntry::COLUMNS,
    );

    let raws: Vec<RawEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], RawEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntry::into_entry).collect()
  }

  async fn entry_stats(&self, now: DateTime<Utc>) -> Result<EntryStats> {
    let today_str = encode_dt(start_of_day(now));
    let week_str  = encode_dt(start_of_week_window(now));

    let (today_rows, week_rows, active): (
      Vec<(String, u64)>,
      Vec<(String, u64)>,
      u64,
    ) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT method, COUNT(*) FROM entry_logs
           WHERE arrival_time >= ?1
           GROUP BY method",
        )?;
        let today_rows = stmt
          .query_map(rusqlite::params![today_str], |r| {
            Ok((r.get(0)?, r.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        let week_rows = stmt
          .query_map(rusqlite::params![week_str], |r| {
            Ok((r.get(0)?, r.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let active: u64 = conn.query_row(
          "SELECT COUNT(*) FROM entry_logs
           WHERE visitor_id IS NOT NULL AND departure_time IS NULL",
          [],
          |r| r.get(0),
        )?;

        Ok((today_rows, week_rows, active))
      })
      .await?;

    Ok(EntryStats {
      today:           fold_method_counts(today_rows)?,
      week:            fold_method_counts(week_rows)?,
      active_visitors: active,
    })
  }
}

// ─── Directory impl ──────────────────────────────────────────────────────────

impl Directory for SqliteStore {
  type Error = Error;

  async fn resolve_resident(&self, id: Uuid) -> Result<Option<Party>> {
    let party = self.get_party(id).await?;
    Ok(party.filter(|p| p.role == PartyRole::Resident))
  }

  async fn resolve_invitation(
    &self,
    id: Uuid,
    now: DateTime<Utc>,
  ) -> Result<Option<InvitationSummary>> {
    let invitation = self.get_invitation(id).await?;
    Ok(invitation.map(|inv| InvitationSummary {
      invitation_id:  inv.invitation_id,
      resident_id:    inv.resident_id,
      status:         inv.effective_status(now),
      scheduled_date: inv.scheduled_date,
      visitor:        inv.visitor,
    }))
  }
}
