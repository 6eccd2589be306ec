//! Handlers for `/parties` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/parties` | Optional `?role=resident|guard|admin` |
//! | `GET`  | `/parties/:id` | Single directory record |
//! | `POST` | `/parties` | Body: [`NewPartyBody`]; returns 201 + stored record |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use gatehouse_core::{
  directory::{Directory, NewParty, Party, PartyRole},
  store::AccessStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Restrict to one role.
  pub role: Option<PartyRole>,
}

/// `GET /parties[?role=resident]` — ordered by name.
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Party>>, ApiError>
where
  S: AccessStore + Directory,
{
  let parties =
    state.store.list_parties(params.role).await.map_err(ApiError::store)?;
  Ok(Json(parties))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /parties/:id`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Party>, ApiError>
where
  S: AccessStore + Directory,
{
  let party = state
    .store
    .get_party(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("party {id} not found")))?;
  Ok(Json(party))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /parties`.
#[derive(Debug, Deserialize)]
pub struct NewPartyBody {
  pub role:        PartyRole,
  pub name:        String,
  pub document_id: Option<String>,
  /// Free-form residence label, e.g. "A-12".
  pub unit:        Option<String>,
}

impl From<NewPartyBody> for NewParty {
  fn from(b: NewPartyBody) -> Self {
    NewParty {
      role:        b.role,
      name:        b.name,
      document_id: b.document_id,
      unit:        b.unit,
    }
  }
}

/// `POST /parties` — returns 201 + the stored record.
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NewPartyBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + Directory,
{
  let party =
    state.store.add_party(NewParty::from(body)).await.map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(party)))
}
