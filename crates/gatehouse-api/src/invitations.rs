//! Handlers for `/invitations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/invitations` | `?resident_id` required; optional `status`, `page`, `limit` |
//! | `GET`  | `/invitations/stats` | `?resident_id` required; lifecycle counts |
//! | `GET`  | `/invitations/:id` | `?code=1` re-renders the approved pass |
//! | `POST` | `/invitations` | Body: [`NewInvitationBody`]; returns 201 + pending invitation |
//! | `POST` | `/invitations/:id/approve` | Body: `{"notes":"..."}` (optional); mints the pass |
//! | `POST` | `/invitations/:id/reject` | Body: `{"reason":"..."}` |
//! | `POST` | `/invitations/:id/cancel` | Body: `{"reason":"..."}` |

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
  gate::IssuedPass,
  identity::{Identity, VehicleInfo},
  invitation::{Invitation, InvitationStats, InvitationStatus, NewInvitation},
  store::{AccessStore, InvitationQuery},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, PageBody, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Required: the host resident whose invitations to list.
  pub resident_id: Uuid,
  /// Filter on effective status (lazy expiry applied before filtering).
  pub status:      Option<InvitationStatus>,
  /// 1-based. Defaults to 1.
  pub page:        Option<u64>,
  /// Defaults to 20, capped at 100.
  pub limit:       Option<u64>,
}

/// `GET /invitations?resident_id=<id>[&status=...][&page=N][&limit=N]`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<PageBody<Invitation>>, ApiError>
where
  S: AccessStore + Directory,
{
  let query = InvitationQuery {
    resident_id: params.resident_id,
    status:      params.status,
    page:        params.page.unwrap_or(1),
    limit:       params.limit.unwrap_or(20),
  };
  let page = state
    .store
    .list_invitations(&query, Utc::now())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(PageBody::from(page)))
}

// ─── Stats ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatsParams {
  pub resident_id: Uuid,
}

/// `GET /invitations/stats?resident_id=<id>`
pub async fn stats<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<StatsParams>,
) -> Result<Json<InvitationStats>, ApiError>
where
  S: AccessStore + Directory,
{
  let stats = state
    .store
    .invitation_stats(params.resident_id, Utc::now())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(stats))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GetParams {
  /// Any value (conventionally `1`) asks for the encoded pass alongside the
  /// invitation. Fails unless the invitation is currently approved.
  pub code: Option<String>,
}

/// Response for `GET /invitations/:id`.
#[derive(Debug, Serialize)]
pub struct InvitationDetail {
  pub invitation: Invitation,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pass:       Option<IssuedPass>,
}

/// `GET /invitations/:id[?code=1]`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<GetParams>,
) -> Result<Json<InvitationDetail>, ApiError>
where
  S: AccessStore + Directory,
{
  let invitation = state
    .store
    .get_invitation(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(CoreError::InvitationNotFound(id))?;
  let pass = match params.code {
    Some(_) => Some(state.gate.invitation_pass(&invitation, Utc::now())?),
    None => None,
  };
  Ok(Json(InvitationDetail { invitation, pass }))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /invitations`.
#[derive(Debug, Deserialize)]
pub struct NewInvitationBody {
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

impl From<NewInvitationBody> for NewInvitation {
  fn from(b: NewInvitationBody) -> Self {
    NewInvitation {
      resident_id:     b.resident_id,
      visitor:         b.visitor,
      scheduled_date:  b.scheduled_date,
      expiration_date: b.expiration_date,
      vehicle:         b.vehicle,
      notes:           b.notes,
      visitor_id:      b.visitor_id,
    }
  }
}

/// `POST /invitations` — returns 201 + the stored pending invitation.
///
/// No pass exists yet; approval mints it.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewInvitationBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + Directory,
{
  let invitation = state
    .store
    .create_invitation(NewInvitation::from(body))
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(invitation)))
}

// ─── Approve ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
  pub notes: Option<String>,
}

/// Response for approval-shaped endpoints: the updated invitation plus its
/// freshly minted pass.
#[derive(Debug, Serialize)]
pub struct ApprovedInvitation {
  pub invitation: Invitation,
  pub pass:       IssuedPass,
}

/// `POST /invitations/:id/approve` — body: `{"notes":"..."}` (optional).
///
/// This is the moment the pass comes to exist; the response carries the
/// encoded code for delivery to the visitor.
pub async fn approve<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ApproveBody>,
) -> Result<Json<ApprovedInvitation>, ApiError>
where
  S: AccessStore + Directory,
{
  let (invitation, pass) =
    state.gate.approve_invitation(id, body.notes, Utc::now()).await?;
  Ok(Json(ApprovedInvitation { invitation, pass }))
}

// ─── Reject / cancel ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReasonBody {
  pub reason: String,
}

/// `POST /invitations/:id/reject` — body: `{"reason":"..."}`.
pub async fn reject<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ReasonBody>,
) -> Result<Json<Invitation>, ApiError>
where
  S: AccessStore + Directory,
{
  let invitation = state
    .store
    .reject_invitation(id, body.reason)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(invitation))
}

/// `POST /invitations/:id/cancel` — body: `{"reason":"..."}`.
pub async fn cancel<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ReasonBody>,
) -> Result<Json<Invitation>, ApiError>
where
  S: AccessStore + Directory,
{
  let invitation = state
    .store
    .cancel_invitation(id, body.reason)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(invitation))
}
