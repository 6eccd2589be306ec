//! Handlers for `/passes` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/passes/resident` | Body: [`IssueResidentBody`]; mints a short-lived resident pass |
//! | `POST` | `/passes/validate` | Body: [`ScanBody`]; dry-run check, writes nothing |
//! | `POST` | `/passes/check-in` | Body: [`ScanBody`]; admits and journals the arrival |

use axum::{Json, extract::State};
use chrono::Utc;
use gatehouse_core::{
  directory::Directory,
  gate::{Admission, GateContext, IssuedPass, Validation},
  store::AccessStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

// ─── Issue ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IssueResidentBody {
  pub resident_id: Uuid,
}

/// `POST /passes/resident` — mint a short-lived pass for the resident app.
///
/// The pass is self-authorizing; the resident does not need a directory
/// record for the code to verify later.
pub async fn issue_resident<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<IssueResidentBody>,
) -> Result<Json<IssuedPass>, ApiError>
where
  S: AccessStore + Directory,
{
  let issued = state.gate.issue_resident_pass(body.resident_id, Utc::now())?;
  Ok(Json(issued))
}

// ─── Scan ─────────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /passes/validate` and `POST /passes/check-in`.
#[derive(Debug, Deserialize)]
pub struct ScanBody {
  /// The scanned QR payload, exactly as read.
  pub code:     String,
  /// Identity document shown at the gate. Required to admit an invitation
  /// pass; ignored for resident passes.
  pub document: Option<String>,
  /// Guard operating the scanner, journaled with the entry.
  pub guard_id: Option<Uuid>,
  /// Physical gate label, journaled with the entry.
  pub gate:     Option<String>,
}

impl ScanBody {
  fn context(&self) -> GateContext {
    GateContext {
      guard_id: self.guard_id,
      gate:     self.gate.clone(),
    }
  }
}

/// `POST /passes/validate` — classify a scanned code without admitting.
///
/// Denials surface as the mapped error statuses; a 200 means the pass
/// would be admitted right now.
pub async fn validate<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<ScanBody>,
) -> Result<Json<Validation>, ApiError>
where
  S: AccessStore + Directory,
{
  let outcome = state
    .gate
    .validate_code(&body.code, body.document.as_deref(), Utc::now())
    .await?;
  Ok(Json(outcome))
}

/// `POST /passes/check-in` — verify the code, mark it used, journal the
/// arrival.
pub async fn check_in<S>(
  State(state): State<ApiState<S>>,
  Json(body): Json<ScanBody>,
) -> Result<Json<Admission>, ApiError>
where
  S: AccessStore + Directory,
{
  let ctx = body.context();
  let outcome = state
    .gate
    .admit_code(&body.code, body.document.as_deref(), Utc::now(), &ctx)
    .await?;
  Ok(Json(outcome))
}
