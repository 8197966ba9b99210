//! Relational-only CRUD for every entity kind.
//!
//! | Method   | Path                     | Notes                              |
//! |----------|--------------------------|------------------------------------|
//! | `GET`    | `/entities/{kind}`       |                                    |
//! | `POST`   | `/entities/{kind}`       | 201 on create, 200 on upsert       |
//! | `GET`    | `/entities/{kind}/{key}` | 404 if not found                   |
//! | `PUT`    | `/entities/{kind}/{key}` | Partial update                     |
//! | `DELETE` | `/entities/{kind}/{key}` | Returns every row the delete took  |
//!
//! These handlers never touch the graph or document mirrors.

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde_json::{Value, json};
use tristore_core::{
  entity::EntityKind,
  record::{Action, NewRecord, RecordKey, RecordPatch, Upserted},
  store::{Backend, RelationalStore},
};

use crate::{AppState, error::ApiError};

/// Parse the `{kind}` path segment.
pub(crate) fn parse_kind(raw: &str) -> Result<EntityKind, ApiError> {
  raw
    .parse()
    .map_err(|_| ApiError::BadRequest(format!("unknown entity kind {raw:?}")))
}

pub(crate) fn parse_key(kind: &str, key: &str) -> Result<RecordKey, ApiError> {
  Ok(RecordKey::parse(parse_kind(kind)?, key)?)
}

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /entities/{kind}`
pub async fn list<B: Backend>(
  State(state): State<AppState<B>>,
  Path(kind): Path<String>,
) -> Result<Json<Value>, ApiError> {
  let kind = parse_kind(&kind)?;
  let records = state.stores().relational.list(kind).await.map_err(ApiError::store)?;
  Ok(Json(json!({ "success": true, "count": records.len(), "data": records })))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /entities/{kind}`
pub async fn create<B: Backend>(
  State(state): State<AppState<B>>,
  Path(kind): Path<String>,
  Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
  let input = NewRecord::from_json(parse_kind(&kind)?, body)?;
  let Upserted { action, value } =
    state.stores().relational.create(input).await.map_err(ApiError::store)?;

  let status = match action {
    Action::Created => StatusCode::CREATED,
    Action::Updated | Action::Deleted => StatusCode::OK,
  };
  Ok((status, Json(json!({ "success": true, "action": action, "data": value }))))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /entities/{kind}/{key}`
pub async fn get_one<B: Backend>(
  State(state): State<AppState<B>>,
  Path((kind, key)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
  let key = parse_key(&kind, &key)?;
  let record = state
    .stores()
    .relational
    .get(&key)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| key.not_found())?;
  Ok(Json(json!({ "success": true, "data": record })))
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// `PUT /entities/{kind}/{key}`
pub async fn update<B: Backend>(
  State(state): State<AppState<B>>,
  Path((kind, key)): Path<(String, String)>,
  Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
  let key = parse_key(&kind, &key)?;
  let patch = RecordPatch::from_json(key.kind(), body)?;
  let record = state
    .stores()
    .relational
    .update(&key, patch)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| key.not_found())?;
  Ok(Json(json!({ "success": true, "action": Action::Updated, "data": record })))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /entities/{kind}/{key}`
pub async fn delete<B: Backend>(
  State(state): State<AppState<B>>,
  Path((kind, key)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
  let key = parse_key(&kind, &key)?;
  let removal = state
    .stores()
    .relational
    .delete(&key)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| key.not_found())?;
  Ok(Json(json!({
    "success": true,
    "action": Action::Deleted,
    "count": removal.len(),
    "data": removal.records,
  })))
}
