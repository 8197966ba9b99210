//! Error types for `tristore-core`.

use serde::Serialize;
use thiserror::Error;

use crate::entity::EntityKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{kind} not found: {key}")]
  NotFound { kind: EntityKind, key: String },

  #[error("validation error: {0}")]
  Validation(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("identifier rejected: {0:?}")]
  IdentifierRejected(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn not_found(kind: EntityKind, key: impl ToString) -> Self {
    Self::NotFound { kind, key: key.to_string() }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NotFound { .. } => ErrorKind::NotFound,
      // A body that does not deserialize is a caller mistake.
      Self::Validation(_) | Self::Serialization(_) => ErrorKind::Validation,
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::IdentifierRejected(_) => ErrorKind::IdentifierRejected,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Backend-independent classification of a store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  NotFound,
  Validation,
  Conflict,
  IdentifierRejected,
  /// I/O, driver or other infrastructure failure.
  Backend,
}

/// Implemented by every store adapter's error type so that higher layers can
/// classify failures without depending on a concrete backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> ErrorKind;
}

impl StoreError for Error {
  fn kind(&self) -> ErrorKind { Error::kind(self) }
}
