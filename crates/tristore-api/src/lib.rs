//! HTTP API for the tristore knowledge graph.
//!
//! Mount [`router`] on an axum server. Relational-only CRUD lives under
//! `/entities/{kind}`; the same paths suffixed with `/sync` run through the
//! [`Orchestrator`] and report the outcome in every store.

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post, put},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tristore_core::store::{Backend, Stores};
use tristore_sync::{Orchestrator, QueryEngine};

pub mod entities;
pub mod error;
pub mod search;
pub mod sync;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Top-level server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  pub relational_path: PathBuf,
  pub graph_path:      PathBuf,
  pub document_path:   PathBuf,
  /// Per-store timeout for query fan-out reads.
  #[serde(default = "default_read_timeout_ms")]
  pub read_timeout_ms: u64,
}

fn default_read_timeout_ms() -> u64 { 5_000 }

impl ServerConfig {
  pub fn read_timeout(&self) -> Duration { Duration::from_millis(self.read_timeout_ms) }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared state threaded through every handler.
pub struct AppState<B: Backend> {
  pub orchestrator: Arc<Orchestrator<B>>,
  pub engine:       Arc<QueryEngine<B>>,
}

impl<B: Backend> AppState<B> {
  pub fn new(stores: Stores<B>, read_timeout: Duration) -> Self {
    Self {
      orchestrator: Arc::new(Orchestrator::new(stores.clone())),
      engine:       Arc::new(QueryEngine::new(stores, read_timeout)),
    }
  }

  pub fn stores(&self) -> &Stores<B> { self.orchestrator.stores() }
}

impl<B: Backend> Clone for AppState<B> {
  fn clone(&self) -> Self {
    Self {
      orchestrator: Arc::clone(&self.orchestrator),
      engine:       Arc::clone(&self.engine),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the application router.
pub fn router<B: Backend>(state: AppState<B>) -> Router {
  Router::new()
    .route("/entities/{kind}", get(entities::list::<B>).post(entities::create::<B>))
    .route("/entities/{kind}/sync", post(sync::create::<B>))
    .route(
      "/entities/{kind}/{key}",
      get(entities::get_one::<B>)
        .put(entities::update::<B>)
        .delete(entities::delete::<B>),
    )
    .route(
      "/entities/{kind}/{key}/sync",
      get(sync::get_one::<B>).put(sync::update::<B>).delete(sync::delete::<B>),
    )
    .route("/triples/details", get(search::triple_details::<B>))
    .route("/search/triple", get(search::triple::<B>))
    .route("/inference/subject-to-diagram", post(search::infer::<B>))
    .route("/annotations/{diagram_id}", put(search::annotate::<B>))
    .route("/semantic-relationships", post(search::record_semantic::<B>))
    .route("/semantic-relationships/{id}", get(search::semantic::<B>))
    .route(
      "/diagrams/{diagram_id}/semantic-relationships",
      get(search::semantic_for_diagram::<B>),
    )
    .route("/query-logs", get(search::query_logs::<B>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
