//! Error type for `tristore-sync`.

use thiserror::Error;
use tristore_core::{ErrorKind, StoreError};

use crate::saga::StoreKind;

#[derive(Debug, Error)]
pub enum SyncError {
  #[error(transparent)]
  Core(#[from] tristore_core::Error),

  #[error("{store}: {message}")]
  Store {
    store:   StoreKind,
    kind:    ErrorKind,
    message: String,
  },

  #[error("graph mirror has no node for {0}")]
  GraphDrift(String),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;

impl SyncError {
  pub fn store<E: StoreError>(store: StoreKind, e: E) -> Self {
    Self::Store { store, kind: e.kind(), message: e.to_string() }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Store { kind, .. } => *kind,
      Self::GraphDrift(_) => ErrorKind::Backend,
    }
  }
}
