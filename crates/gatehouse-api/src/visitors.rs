//! Handlers for `/visitors` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/visitors` | `?resident_id` required; optional `status`, window, `search`, paging |
//! | `GET`  | `/visitors/:id` | Single visit record |
//! | `POST` | `/visitors` | Body: [`NewVisitorBody`]; returns 201 + stored visitor |
//! | `POST` | `/visitors/:id/approve` | `Pending → Approved` |
//! | `POST` | `/visitors/:id/reject` | `{Pending, Approved} → Rejected` |
//! | `POST` | `/visitors/:id/check-in` | Body: [`GatePost`]; admits and journals the arrival |
//! | `POST` | `/visitors/:id/check-out` | Body: [`GatePost`]; closes the visit and its entry |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use gatehouse_core::{
  Error as CoreError,
  directory::Directory,
  entry::EntryLogEntry,
  gate::{DepartureReceipt, GateContext},
  identity::Identity,
  store::{AccessStore, VisitorQuery},
  visitor::{NewVisitor, Visitor, VisitorStatus},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, PageBody, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Required: the resident whose visitors to list.
  pub resident_id:     Uuid,
  pub status:          Option<VisitorStatus>,
  pub scheduled_after: Option<DateTime<Utc>>,
  pub scheduled_until: Option<DateTime<Utc>>,
  /// Substring match over name and document number.
  pub search:          Option<String>,
  /// 1-based. Defaults to 1.
  pub page:            Option<u64>,
  /// Defaults to 20, capped at 100.
  pub limit:           Option<u64>,
}

/// `GET /visitors?resident_id=<id>[&status=...][&search=...][&page=N]`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<PageBody<Visitor>>, ApiError>
where
  S: AccessStore + Directory,
{
  let query = VisitorQuery {
    resident_id:     params.resident_id,
    status:          params.status,
    scheduled_after: params.scheduled_after,
    scheduled_until: params.scheduled_until,
    search:          params.search,
    page:            params.page.unwrap_or(1),
    limit:           params.limit.unwrap_or(20),
  };
  let page =
    state.store.list_visitors(&query).await.map_err(ApiError::store)?;
  Ok(Json(PageBody::from(page)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /visitors/:id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Visitor>, ApiError>
where
  S: AccessStore + Directory,
{
  let visitor = state
    .store
    .get_visitor(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(CoreError::VisitorNotFound(id))?;
  Ok(Json(visitor))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /visitors`.
#[derive(Debug, Deserialize)]
pub struct NewVisitorBody {
  pub resident_id:    Uuid,
  pub identity:       Identity,
  pub scheduled_date: DateTime<Utc>,
  pub visit_purpose:  Option<String>,
  /// Skip the approval step and start `Approved`. Default `false`.
  #[serde(default)]
  pub auto_approve:   bool,
}

impl From<NewVisitorBody> for NewVisitor {
  fn from(b: NewVisitorBody) -> Self {
    NewVisitor {
      resident_id:    b.resident_id,
      identity:       b.identity,
      scheduled_date: b.scheduled_date,
      visit_purpose:  b.visit_purpose,
      auto_approve:   b.auto_approve,
    }
  }
}

/// `POST /visitors` — returns 201 + the stored visitor.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewVisitorBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + Directory,
{
  let visitor = state
    .store
    .create_visitor(NewVisitor::from(body))
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(visitor)))
}

// ─── Approve / reject ─────────────────────────────────────────────────────────

/// `POST /visitors/:id/approve`
pub async fn approve<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Visitor>, ApiError>
where
  S: AccessStore + Directory,
{
  let visitor =
    state.store.approve_visitor(id).await.map_err(ApiError::store)?;
  Ok(Json(visitor))
}

/// `POST /visitors/:id/reject`
pub async fn reject<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Visitor>, ApiError>
where
  S: AccessStore + Directory,
{
  let visitor =
    state.store.reject_visitor(id).await.map_err(ApiError::store)?;
  Ok(Json(visitor))
}

// ─── Check-in / check-out ─────────────────────────────────────────────────────

/// JSON body accepted by the gate-side visitor transitions. All fields are
/// optional; `{}` is a valid body.
#[derive(Debug, Default, Deserialize)]
pub struct GatePost {
  /// Guard performing the admission, journaled with the entry.
  pub guard_id: Option<Uuid>,
  /// Physical gate label, journaled with the entry.
  pub gate:     Option<String>,
}

/// Response for `POST /visitors/:id/check-in`.
#[derive(Debug, Serialize)]
pub struct AdmittedVisitor {
  pub visitor: Visitor,
  pub entry:   EntryLogEntry,
}

/// `POST /visitors/:id/check-in` — manual admission at the gate. Flips the
/// visitor `InProperty` and appends the ledger arrival.
pub async fn check_in<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<GatePost>,
) -> Result<Json<AdmittedVisitor>, ApiError>
where
  S: AccessStore + Directory,
{
  let ctx = GateContext { guard_id: body.guard_id, gate: body.gate };
  let (visitor, entry) =
    state.gate.check_in_visitor(id, Utc::now(), &ctx).await?;
  Ok(Json(AdmittedVisitor { visitor, entry }))
}

/// `POST /visitors/:id/check-out` — completes the visit, closes the open
/// ledger entry, and reports the stay duration.
pub async fn check_out<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Json(_body): Json<GatePost>,
) -> Result<Json<DepartureReceipt>, ApiError>
where
  S: AccessStore + Directory,
{
  let receipt = state.gate.check_out_visitor(id, Utc::now()).await?;
  Ok(Json(receipt))
}
