//! Synchronized CRUD: every write runs as a saga across all three stores.
//!
//! A saga that did not commit everywhere answers 500 with the full report, so
//! the caller can see which stores are now out of step.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Serialize;
use tristore_core::{
  record::{Action, NewRecord, RecordPatch},
  store::Backend,
};
use tristore_sync::{SyncReport, SyncedRecord};

use crate::{
  AppState,
  entities::{parse_key, parse_kind},
  error::ApiError,
};

fn respond(report: SyncReport) -> impl IntoResponse {
  let status = match (report.success, report.action) {
    (false, _) => StatusCode::INTERNAL_SERVER_ERROR,
    (true, Action::Created) => StatusCode::CREATED,
    (true, Action::Updated | Action::Deleted) => StatusCode::OK,
  };
  if !report.success {
    tracing::warn!(
      operation_id = %report.operation_id,
      saga = ?report.saga,
      "synchronized write did not commit everywhere",
    );
  }
  (status, Json(report))
}

/// `POST /entities/{kind}/sync`
pub async fn create<B: Backend>(
  State(state): State<AppState<B>>,
  Path(kind): Path<String>,
  Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
  let input = NewRecord::from_json(parse_kind(&kind)?, body)?;
  let report = state.orchestrator.create(input).await?;
  Ok(respond(report))
}

#[derive(Serialize)]
pub struct Synced {
  success: bool,
  #[serde(flatten)]
  record:  SyncedRecord,
}

/// `GET /entities/{kind}/{key}/sync`
pub async fn get_one<B: Backend>(
  State(state): State<AppState<B>>,
  Path((kind, key)): Path<(String, String)>,
) -> Result<Json<Synced>, ApiError> {
  let key = parse_key(&kind, &key)?;
  let record = state.orchestrator.get(&key).await?;
  Ok(Json(Synced { success: true, record }))
}

/// `PUT /entities/{kind}/{key}/sync`
pub async fn update<B: Backend>(
  State(state): State<AppState<B>>,
  Path((kind, key)): Path<(String, String)>,
  Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ApiError> {
  let key = parse_key(&kind, &key)?;
  let patch = RecordPatch::from_json(key.kind(), body)?;
  let report = state.orchestrator.update(&key, patch).await?;
  Ok(respond(report))
}

/// `DELETE /entities/{kind}/{key}/sync`
pub async fn delete<B: Backend>(
  State(state): State<AppState<B>>,
  Path((kind, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
  let key = parse_key(&kind, &key)?;
  let report = state.orchestrator.delete(&key).await?;
  Ok(respond(report))
}
