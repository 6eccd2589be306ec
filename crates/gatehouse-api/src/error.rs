//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use gatehouse_core::Error as CoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
///
/// Domain errors pass through as [`ApiError::Core`] and keep their stable
/// `kind` discriminant in the response body, so gate clients can branch on
/// the outcome (`"already_used"`, `"invitation_expired"`, ...) without
/// parsing the human-readable message.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl ApiError {
  /// Wraps a store failure, preserving its domain meaning.
  pub fn store<E: Into<CoreError>>(err: E) -> Self {
    ApiError::Core(err.into())
  }

  fn kind(&self) -> &'static str {
    match self {
      ApiError::NotFound(_) => "not_found",
      ApiError::BadRequest(_) => "bad_request",
      ApiError::Core(err) => err.kind(),
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Core(err) => match err {
        CoreError::MalformedCredential(_)
        | CoreError::EmptyEntryRefs
        | CoreError::Serialization(_) => StatusCode::BAD_REQUEST,
        CoreError::InvalidSignature | CoreError::IdentityMismatch => {
          StatusCode::FORBIDDEN
        }
        CoreError::InvitationNotFound(_)
        | CoreError::VisitorNotFound(_)
        | CoreError::ResidentNotFound(_)
        | CoreError::FrequentVisitorNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::InvitationPending(_)
        | CoreError::AlreadyUsed(_)
        | CoreError::InvitationRejected(_)
        | CoreError::InvitationCancelled(_)
        | CoreError::InvalidInvitationTransition { .. }
        | CoreError::InvalidVisitorTransition { .. }
        | CoreError::AlreadyCheckedIn(_)
        | CoreError::NotCheckedIn(_)
        | CoreError::DuplicateFrequentVisitor(_)
        | CoreError::InactiveFrequentVisitor(_) => StatusCode::CONFLICT,
        CoreError::Expired { .. } | CoreError::InvitationExpired(_) => {
          StatusCode::GONE
        }
        CoreError::EmptySecret | CoreError::Storage(_) => {
          StatusCode::INTERNAL_SERVER_ERROR
        }
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let body = json!({ "error": self.to_string(), "kind": self.kind() });
    (status, Json(body)).into_response()
  }
}
