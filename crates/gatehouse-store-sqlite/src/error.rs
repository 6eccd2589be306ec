//! Error type for `gatehouse-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain error surfaced by a store operation, e.g. a lifecycle
  /// transition attempted from the wrong state.
  #[error("core error: {0}")]
  Core(#[from] gatehouse_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored discriminant column held a value this build does not know.
  #[error("unknown stored value: {0}")]
  Decode(String),
}

/// Domain errors pass through untouched so callers can match on them;
/// everything else is infrastructure and becomes [`Storage`].
///
/// [`Storage`]: gatehouse_core::Error::Storage
impl From<Error> for gatehouse_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(core) => core,
      other => gatehouse_core::Error::Storage(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
