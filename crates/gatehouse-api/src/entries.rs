//! Handlers for `/entry-logs` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entry-logs` | Optional `methods`, `from`/`until` (or `window`), `departed`, paging |
//! | `GET`  | `/entry-logs/latest` | Most recent arrivals, optional `methods` + `limit` |
//! | `GET`  | `/entry-logs/active` | Open visitor entries: who is on-site now |
//! | `GET`  | `/entry-logs/stats` | Today/this-week counts per method |
//! | `POST` | `/entry-logs` | Body: [`NewEntryBody`]; returns 201 + ledger row |
//! | `POST` | `/entry-logs/departure` | Body: [`DepartureBody`]; closes an open entry |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use gatehouse_core::{
  directory::Directory,
  entry::{
    DepartureOutcome, EntryLogEntry, EntryMethod, EntryRefs, EntryStats,
    EntrySubject, NewEntry, start_of_day, start_of_week_window,
  },
  store::{AccessStore, EntryQuery},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, PageBody, error::ApiError};

/// Parses a comma-separated method list (`"qr,manual"`).
fn parse_methods(raw: Option<&str>) -> Result<Vec<EntryMethod>, ApiError> {
  let Some(raw) = raw else { return Ok(Vec::new()) };
  raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| {
      EntryMethod::ALL
        .into_iter()
        .find(|m| m.as_str() == s)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown entry method: {s}")))
    })
    .collect()
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// Named reporting window, expanded to a `from` bound at request time.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
  /// Local midnight to now.
  Today,
  /// Seven days back, floored to midnight.
  Week,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Comma-separated method filter, e.g. `qr,manual`. Empty means all.
  pub methods:  Option<String>,
  /// Inclusive lower bound on `arrival_time`.
  pub from:     Option<DateTime<Utc>>,
  /// Inclusive upper bound on `arrival_time`.
  pub until:    Option<DateTime<Utc>>,
  /// Shorthand for a `from` bound; rejected alongside an explicit `from`.
  pub window:   Option<Window>,
  /// `true` = departed only, `false` = still open only.
  pub departed: Option<bool>,
  /// 1-based. Defaults to 1.
  pub page:     Option<u64>,
  /// Defaults to 20, capped at 100.
  pub limit:    Option<u64>,
}

/// `GET /entry-logs[?methods=qr,lpr][&from=...][&until=...][&departed=true]`
///
/// `?window=today` and `?window=week` are shorthands for the matching
/// `from` bound.
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<PageBody<EntryLogEntry>>, ApiError>
where
  S: AccessStore + Directory,
{
  let from = match (params.from, params.window) {
    (Some(_), Some(_)) => {
      return Err(ApiError::BadRequest(
        "window and from are mutually exclusive".into(),
      ));
    }
    (from, None) => from,
    (None, Some(Window::Today)) => Some(start_of_day(Utc::now())),
    (None, Some(Window::Week)) => Some(start_of_week_window(Utc::now())),
  };
  let query = EntryQuery {
    methods:  parse_methods(params.methods.as_deref())?,
    from,
    until:    params.until,
    departed: params.departed,
    page:     params.page.unwrap_or(1),
    limit:    params.limit.unwrap_or(20),
  };
  let page =
    state.store.query_entries(&query).await.map_err(ApiError::store)?;
  Ok(Json(PageBody::from(page)))
}

// ─── Latest / active ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct LatestParams {
  /// Comma-separated method filter, e.g. `qr,manual`. Empty means all.
  pub methods: Option<String>,
  /// Defaults to 5, capped at 20.
  pub limit:   Option<u64>,
}

/// `GET /entry-logs/latest[?methods=...][&limit=N]` — newest arrivals first.
pub async fn latest<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<LatestParams>,
) -> Result<Json<Vec<EntryLogEntry>>, ApiError>
where
  S: AccessStore + Directory,
{
  let methods = parse_methods(params.methods.as_deref())?;
  let entries = state
    .store
    .latest_entries(methods, params.limit.unwrap_or(5))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entries))
}

/// `GET /entry-logs/active` — open visitor entries, newest arrival first.
pub async fn active<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<Vec<EntryLogEntry>>, ApiError>
where
  S: AccessStore + Directory,
{
  let entries = state.store.active_entries().await.map_err(ApiError::store)?;
  Ok(Json(entries))
}

// ─── Stats ────────────────────────────────────────────────────────────────────

/// `GET /entry-logs/stats` — per-method counts for today and the current
/// week, plus how many visitors are on-site.
pub async fn stats<S>(
  State(state): State<ApiState<S>>,
) -> Result<Json<EntryStats>, ApiError>
where
  S: AccessStore + Directory,
{
  let stats =
    state.store.entry_stats(Utc::now()).await.map_err(ApiError::store)?;
  Ok(Json(stats))
}

// ─── Record ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /entry-logs`: an externally-decided
/// admission (facial recognizer, plate reader, guard override).
#[derive(Debug, Deserialize)]
pub struct NewEntryBody {
  pub method:        EntryMethod,
  pub visitor_id:    Option<Uuid>,
  pub resident_id:   Option<Uuid>,
  pub vehicle_id:    Option<Uuid>,
  pub invitation_id: Option<Uuid>,
  pub guard_id:      Option<Uuid>,
  /// Defaults to now.
  pub arrival_time:  Option<DateTime<Utc>>,
  /// Raw recognizer event, stored verbatim.
  pub payload:       Option<serde_json::Value>,
  pub metadata:      Option<serde_json::Value>,
}

impl NewEntryBody {
  fn into_new_entry(self, now: DateTime<Utc>) -> NewEntry {
    NewEntry {
      method:       self.method,
      refs:         EntryRefs {
        visitor_id:    self.visitor_id,
        resident_id:   self.resident_id,
        vehicle_id:    self.vehicle_id,
        invitation_id: self.invitation_id,
        guard_id:      self.guard_id,
      },
      arrival_time: self.arrival_time.unwrap_or(now),
      payload:      self.payload,
      metadata:     self.metadata,
    }
  }
}

/// `POST /entry-logs` — returns 201 + the appended row. At least one
/// reference is required; referenced visitors and invitations must exist.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewEntryBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + Directory,
{
  let entry = state
    .store
    .record_arrival(body.into_new_entry(Utc::now()))
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(entry)))
}

// ─── Departure ────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /entry-logs/departure`. Exactly one of
/// `visitor_id` and `resident_id` selects the departing subject.
#[derive(Debug, Deserialize)]
pub struct DepartureBody {
  pub visitor_id:  Option<Uuid>,
  pub resident_id: Option<Uuid>,
  /// Defaults to now.
  pub at:          Option<DateTime<Utc>>,
}

/// `POST /entry-logs/departure` — closes the subject's most recent open
/// entry. A departure with no open arrival is journaled as an anomaly row
/// and reported with `"matched": false`, never rejected.
pub async fn departure<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<DepartureBody>,
) -> Result<Json<DepartureOutcome>, ApiError>
where
  S: AccessStore + Directory,
{
  let subject = match (body.visitor_id, body.resident_id) {
    (Some(id), None) => EntrySubject::Visitor(id),
    (None, Some(id)) => EntrySubject::Resident(id),
    _ => {
      return Err(ApiError::BadRequest(
        "exactly one of visitor_id and resident_id is required".into(),
      ));
    }
  };
  let outcome = state
    .gate
    .record_departure(subject, body.at.unwrap_or_else(Utc::now))
    .await?;
  Ok(Json(outcome))
}
