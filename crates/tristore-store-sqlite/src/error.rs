//! Error type for `tristore-store-sqlite`.

use rusqlite::ffi;
use thiserror::Error;
use tristore_core::{ErrorKind, StoreError};

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tristore_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("undecodable column: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<rusqlite::Error> for Error {
  fn from(e: rusqlite::Error) -> Self { Self::Database(e.into()) }
}

impl StoreError for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => constraint_kind(e),
      Self::Database(_) | Self::Json(_) | Self::DateParse(_) | Self::Decode(_) => {
        ErrorKind::Backend
      }
    }
  }
}

/// Constraint violations are caller mistakes; everything else is ours.
fn constraint_kind(e: &rusqlite::Error) -> ErrorKind {
  let rusqlite::Error::SqliteFailure(failure, _) = e else {
    return ErrorKind::Backend;
  };
  if failure.code != rusqlite::ErrorCode::ConstraintViolation {
    return ErrorKind::Backend;
  }
  match failure.extended_code {
    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ErrorKind::Conflict,
    _ => ErrorKind::Validation,
  }
}
