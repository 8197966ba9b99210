//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tristore_core::{ErrorKind, StoreError};
use tristore_sync::SyncError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] tristore_core::Error),

  #[error(transparent)]
  Sync(#[from] SyncError),

  #[error("store error: {message}")]
  Store { kind: ErrorKind, message: String },

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found: {0}")]
  NotFound(String),
}

impl ApiError {
  pub fn store<E: StoreError>(e: E) -> Self { Self::Store { kind: e.kind(), message: e.to_string() } }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Sync(e) => e.kind(),
      Self::Store { kind, .. } => *kind,
      Self::BadRequest(_) => ErrorKind::Validation,
      Self::NotFound(_) => ErrorKind::NotFound,
    }
  }

  pub fn status(&self) -> StatusCode {
    match self.kind() {
      ErrorKind::NotFound => StatusCode::NOT_FOUND,
      ErrorKind::Validation | ErrorKind::IdentifierRejected => StatusCode::BAD_REQUEST,
      ErrorKind::Conflict => StatusCode::CONFLICT,
      ErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let body = json!({
      "success": false,
      "kind": self.kind(),
      "errors": [self.to_string()],
    });
    (status, Json(body)).into_response()
  }
}
