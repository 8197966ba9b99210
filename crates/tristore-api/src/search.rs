//! Triple search, subject inference, diagram annotations and the query log.
//!
//! Search and inference degrade to partial results when a store fails; the
//! body then carries `"success": false` and an `errors` list naming the
//! stores that did not answer.

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tristore_core::store::{Backend, RelationalStore, TripleQuery};

use crate::{AppState, error::ApiError};

/// Serialize `body` and stamp the `success` flag onto it.
fn envelope<T: Serialize>(success: bool, body: &T) -> Result<Json<Value>, ApiError> {
  let mut value = serde_json::to_value(body).map_err(tristore_core::Error::from)?;
  if let Value::Object(map) = &mut value {
    map.insert("success".into(), success.into());
  }
  Ok(Json(value))
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// `GET /search/triple?subject=&relationship=&object=`
pub async fn triple<B: Backend>(
  State(state): State<AppState<B>>,
  Query(query): Query<TripleQuery>,
) -> Result<Json<Value>, ApiError> {
  let found = state.engine.search(query).await;
  envelope(found.errors.is_empty(), &found)
}

#[derive(Debug, Deserialize)]
pub struct InferBody {
  pub subjects: Vec<String>,
}

/// `POST /inference/subject-to-diagram`, body `{"subjects":["Bee"]}`
pub async fn infer<B: Backend>(
  State(state): State<AppState<B>>,
  Json(body): Json<InferBody>,
) -> Result<Json<Value>, ApiError> {
  let subjects: Vec<String> = body
    .subjects
    .into_iter()
    .map(|s| s.trim().to_owned())
    .filter(|s| !s.is_empty())
    .collect();
  if subjects.is_empty() {
    return Err(ApiError::BadRequest("subjects must name at least one subject".into()));
  }
  let inferred = state.engine.infer_from_subjects(subjects).await;
  envelope(inferred.errors.is_empty(), &inferred)
}

// ─── Triples ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct Page {
  #[serde(default = "default_page_limit")]
  pub limit:  usize,
  #[serde(default)]
  pub offset: usize,
}

fn default_page_limit() -> usize { 100 }

/// `GET /triples/details[?limit=&offset=]`
pub async fn triple_details<B: Backend>(
  State(state): State<AppState<B>>,
  Query(page): Query<Page>,
) -> Result<Json<Value>, ApiError> {
  let details = state
    .stores()
    .relational
    .triple_details(page.limit, page.offset)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(json!({ "success": true, "count": details.len(), "data": details })))
}

// ─── Annotations ─────────────────────────────────────────────────────────────

/// `PUT /annotations/{diagram_id}`: merges the body into the diagram's
/// annotation document.
pub async fn annotate<B: Backend>(
  State(state): State<AppState<B>>,
  Path(diagram_id): Path<String>,
  Json(fields): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
  let doc = state.engine.annotate(&diagram_id, fields).await?;
  Ok(Json(json!({ "success": true, "data": doc })))
}

// ─── Semantic relationships ──────────────────────────────────────────────────

/// `POST /semantic-relationships`
pub async fn record_semantic<B: Backend>(
  State(state): State<AppState<B>>,
  Json(fields): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
  let doc = state.engine.record_semantic_relationships(fields).await?;
  Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": doc }))))
}

/// `GET /semantic-relationships/{id}`
pub async fn semantic<B: Backend>(
  State(state): State<AppState<B>>,
  Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
  let doc = state
    .engine
    .semantic_relationships(&id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("semantic relationships {id}")))?;
  Ok(Json(json!({ "success": true, "data": doc })))
}

/// `GET /diagrams/{diagram_id}/semantic-relationships`
pub async fn semantic_for_diagram<B: Backend>(
  State(state): State<AppState<B>>,
  Path(diagram_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
  let docs = state.engine.semantic_relationships_for(&diagram_id).await?;
  Ok(Json(json!({ "success": true, "count": docs.len(), "data": docs })))
}

// ─── Query log ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LogParams {
  #[serde(default = "default_log_limit")]
  pub limit: usize,
}

fn default_log_limit() -> usize { 50 }

/// `GET /query-logs[?limit=]`, most recent first.
pub async fn query_logs<B: Backend>(
  State(state): State<AppState<B>>,
  Query(params): Query<LogParams>,
) -> Result<Json<Value>, ApiError> {
  let logs = state.engine.query_logs(params.limit).await?;
  Ok(Json(json!({ "success": true, "count": logs.len(), "data": logs })))
}
