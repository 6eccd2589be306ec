//! Handlers for `/frequent-visitors` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/frequent-visitors` | `?resident_id` required; active entries only |
//! | `POST`   | `/frequent-visitors` | Body: [`NewFrequentVisitorBody`]; returns 201 + roster entry |
//! | `POST`   | `/frequent-visitors/:id/invite` | Body: [`InviteBody`]; mints a pre-approved invitation |
//! | `DELETE` | `/frequent-visitors/:id` | Soft deactivation; visit history survives |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use gatehouse_core::{
  directory::Directory,
  frequent::{FrequentVisitor, NewFrequentVisitor},
  identity::{Identity, VehicleInfo},
  store::AccessStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError, invitations::ApprovedInvitation};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Required: the resident whose roster to list.
  pub resident_id: Uuid,
}

/// `GET /frequent-visitors?resident_id=<id>`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<FrequentVisitor>>, ApiError>
where
  S: AccessStore + Directory,
{
  let roster = state
    .store
    .list_frequent_visitors(params.resident_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(roster))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /frequent-visitors`.
#[derive(Debug, Deserialize)]
pub struct NewFrequentVisitorBody {
  pub resident_id: Uuid,
  pub identity:    Identity,
  pub vehicle:     Option<VehicleInfo>,
  pub notes:       Option<String>,
}

impl From<NewFrequentVisitorBody> for NewFrequentVisitor {
  fn from(b: NewFrequentVisitorBody) -> Self {
    NewFrequentVisitor {
      resident_id: b.resident_id,
      identity:    b.identity,
      vehicle:     b.vehicle,
      notes:       b.notes,
    }
  }
}

/// `POST /frequent-visitors` — returns 201 + the stored roster entry.
///
/// At most one active entry per `(resident, document)` pair; duplicates
/// come back 409.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewFrequentVisitorBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + Directory,
{
  let entry = state
    .store
    .add_frequent_visitor(NewFrequentVisitor::from(body))
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(entry)))
}

// ─── Invite ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /frequent-visitors/:id/invite`.
#[derive(Debug, Deserialize)]
pub struct InviteBody {
  pub scheduled_date:  DateTime<Utc>,
  /// Defaults to one day after `scheduled_date`.
  pub expiration_date: Option<DateTime<Utc>>,
  pub notes:           Option<String>,
}

/// `POST /frequent-visitors/:id/invite` — one-step pre-approved invitation
/// from the roster entry. The response carries the minted pass.
pub async fn invite<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<InviteBody>,
) -> Result<Json<ApprovedInvitation>, ApiError>
where
  S: AccessStore + Directory,
{
  let (invitation, pass) = state
    .gate
    .invite_frequent_visitor(
      id,
      body.scheduled_date,
      body.expiration_date,
      body.notes,
      Utc::now(),
    )
    .await?;
  Ok(Json(ApprovedInvitation { invitation, pass }))
}

// ─── Deactivate ───────────────────────────────────────────────────────────────

/// `DELETE /frequent-visitors/:id` — soft removal. The entry stops minting
/// invitations but keeps its visit counters.
pub async fn deactivate<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<FrequentVisitor>, ApiError>
where
  S: AccessStore + Directory,
{
  let entry = state
    .store
    .deactivate_frequent_visitor(id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entry))
}
