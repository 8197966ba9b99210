//! The three store traits and the query/result types they exchange.
//!
//! Traits are implemented by storage backends (e.g. `tristore-store-sqlite`).
//! The synchronization layer depends on these abstractions only, and receives
//! concrete stores through [`Stores`] at construction.

use std::{future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  StoreError,
  entity::{Diagram, EntityKind, Subject, Triple},
  ident::Ident,
  record::{NewRecord, Record, RecordKey, RecordPatch, Removal, Upserted},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// A subject–relationship–object search. Each part is matched as a
/// case-insensitive substring; an empty part matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripleQuery {
  #[serde(default)]
  pub subject:      String,
  #[serde(default)]
  pub relationship: String,
  #[serde(default)]
  pub object:       String,
}

/// A category scored by the relational triple search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMatch {
  pub category_id:     i64,
  pub category_name:   String,
  pub root_category:   String,
  pub match_count:     i64,
  pub avg_confidence:  f64,
  /// `match_count * 0.5 + avg_confidence * 0.5`
  pub relevance_score: f64,
}

impl CategoryMatch {
  pub fn relevance(match_count: i64, avg_confidence: f64) -> f64 {
    match_count as f64 * 0.5 + avg_confidence * 0.5
  }
}

/// A triple joined with the names and codes of its three parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripleDetail {
  pub id:                i64,
  pub code:              String,
  pub subject_id:        i64,
  pub subject_name:      String,
  pub subject_code:      String,
  pub relationship_id:   i64,
  pub relationship_name: String,
  pub relationship_code: String,
  pub object_id:         i64,
  pub object_name:       String,
  pub object_code:       String,
  pub diagram_id:        Option<String>,
  pub confidence_score:  Option<f64>,
  pub context:           Option<String>,
  pub created_at:        DateTime<Utc>,
}

// ─── Relational ──────────────────────────────────────────────────────────────

/// The authoritative store. Every id and code originates here.
///
/// Writes validate foreign keys inside the same transaction that performs
/// them, so a mutation either fully applies or leaves nothing behind.
pub trait RelationalStore: Send + Sync {
  type Error: StoreError;

  /// Insert a row, or update it when the input names an existing key (root
  /// subjects, subjects) or an existing natural key (triples).
  fn create(
    &self,
    input: NewRecord,
  ) -> impl Future<Output = Result<Upserted<Record>, Self::Error>> + Send + '_;

  fn get<'a>(
    &'a self,
    key: &'a RecordKey,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + 'a;

  fn list(
    &self,
    kind: EntityKind,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  /// Apply a patch, re-deriving any codes whose inputs changed. Returns
  /// `None` if the row does not exist.
  fn update<'a>(
    &'a self,
    key: &'a RecordKey,
    patch: RecordPatch,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + 'a;

  /// Delete a row and everything that cascades from it. Returns `None` if
  /// the row does not exist.
  fn delete<'a>(
    &'a self,
    key: &'a RecordKey,
  ) -> impl Future<Output = Result<Option<Removal>, Self::Error>> + Send + 'a;

  /// Write rows back exactly as given, inserting or overwriting by primary
  /// key. Rows must be ordered parents first.
  fn restore(
    &self,
    records: Vec<Record>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The triple stored under its natural key, if any.
  fn find_triple(
    &self,
    subject_id: i64,
    relationship_id: i64,
    object_id: i64,
  ) -> impl Future<Output = Result<Option<Triple>, Self::Error>> + Send + '_;

  /// Case-insensitive lookup by name or synonym.
  fn find_subject<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + 'a;

  /// Name of the root subject above the subject matching `name`.
  fn root_subject_name<'a>(
    &'a self,
    subject_name: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  fn diagrams_in_category(
    &self,
    category_id: i64,
  ) -> impl Future<Output = Result<Vec<Diagram>, Self::Error>> + Send + '_;

  /// Diagrams of every category whose name matches case-insensitively.
  fn diagrams_by_category_name<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<Vec<Diagram>, Self::Error>> + Send + 'a;

  /// Score categories by the triples under their diagrams that match
  /// `query`, best first.
  fn search_by_triple<'a>(
    &'a self,
    query: &'a TripleQuery,
  ) -> impl Future<Output = Result<Vec<CategoryMatch>, Self::Error>> + Send + 'a;

  fn triple_details(
    &self,
    limit: usize,
    offset: usize,
  ) -> impl Future<Output = Result<Vec<TripleDetail>, Self::Error>> + Send + '_;
}

// ─── Graph ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
  pub label: Ident,
  pub name:  String,
  pub props: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
  pub edge_type: Ident,
  pub from:      String,
  pub to:        String,
  pub props:     Map<String, Value>,
}

/// How to find an edge endpoint: by `code`, then `entity_id`, then `name`,
/// taking the first that is set and matches a node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef {
  pub label:     Ident,
  pub code:      Option<String>,
  pub entity_id: Option<String>,
  pub name:      Option<String>,
}

impl NodeRef {
  pub fn for_record(label: Ident, record: &Record) -> Self {
    Self {
      label,
      code: record.code().map(str::to_owned),
      entity_id: Some(record.key().to_string()),
      name: Some(record.name().to_owned()),
    }
  }
}

/// A parent→child edge between two name-keyed nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyLink {
  pub parent_label: Ident,
  pub parent_name:  String,
  pub child_label:  Ident,
  pub child_name:   String,
  pub edge_type:    Ident,
  /// Remove any other edge of this type into the child first.
  pub exclusive:    bool,
}

/// A triple edge found by [`GraphStore::search_by_triple`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphTripleMatch {
  pub subject:           String,
  pub relationship:      String,
  pub relationship_code: Option<String>,
  pub object:            String,
  pub confidence:        Option<f64>,
  pub diagram_id:        Option<String>,
  pub context:           Option<String>,
  pub triple_code:       Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryInference {
  pub category:    String,
  pub match_count: i64,
}

/// A labeled property graph keyed by `(label, name)`.
///
/// Labels and edge types are only ever passed as [`Ident`], so a backend may
/// embed them in statement text.
pub trait GraphStore: Send + Sync {
  type Error: StoreError;

  /// Create the node, or merge `props` into the existing one.
  fn merge_node<'a>(
    &'a self,
    label: &'a Ident,
    name: &'a str,
    props: Map<String, Value>,
  ) -> impl Future<Output = Result<GraphNode, Self::Error>> + Send + 'a;

  /// Rename a node in place, keeping its edges. Returns `false` if no node
  /// had the old name. Renaming onto an existing name fails with
  /// [`ErrorKind::Conflict`](crate::ErrorKind::Conflict); to merge two
  /// nodes, delete the old one, merge into the survivor and redraw the
  /// edges that went with it.
  fn rename_node<'a>(
    &'a self,
    label: &'a Ident,
    from: &'a str,
    to: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn get_node<'a>(
    &'a self,
    label: &'a Ident,
    name: &'a str,
  ) -> impl Future<Output = Result<Option<GraphNode>, Self::Error>> + Send + 'a;

  /// Delete a node together with every edge touching it.
  fn delete_node<'a>(
    &'a self,
    label: &'a Ident,
    name: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Returns `false` when either endpoint is missing.
  fn link_hierarchy<'a>(
    &'a self,
    link: &'a HierarchyLink,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Remove every `edge_type` edge into `(label, name)`. Returns how many
  /// were removed.
  fn detach<'a>(
    &'a self,
    label: &'a Ident,
    name: &'a str,
    edge_type: &'a Ident,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Make the `edge_type` edges out of `(label, name)` point at exactly the
  /// `target_label` nodes named in `targets` that exist. Returns how many
  /// edges now exist.
  fn set_memberships<'a>(
    &'a self,
    label: &'a Ident,
    name: &'a str,
    edge_type: &'a Ident,
    target_label: &'a Ident,
    targets: &'a [String],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Merge one edge of `edge_type` between the resolved endpoints; an
  /// existing edge has its properties replaced. Returns `None` when an
  /// endpoint cannot be resolved.
  fn create_edge<'a>(
    &'a self,
    from: &'a NodeRef,
    to: &'a NodeRef,
    edge_type: &'a Ident,
    props: Map<String, Value>,
  ) -> impl Future<Output = Result<Option<GraphEdge>, Self::Error>> + Send + 'a;

  /// Delete every edge whose property `prop` equals `value`.
  fn delete_edges_where<'a>(
    &'a self,
    prop: &'a Ident,
    value: &'a Value,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  fn edges<'a>(
    &'a self,
    edge_type: &'a Ident,
  ) -> impl Future<Output = Result<Vec<GraphEdge>, Self::Error>> + Send + 'a;

  /// Triple edges whose endpoints and name match `query`, highest
  /// confidence first, at most ten.
  fn search_by_triple<'a>(
    &'a self,
    query: &'a TripleQuery,
  ) -> impl Future<Output = Result<Vec<GraphTripleMatch>, Self::Error>> + Send + 'a;

  /// Categories linked to subjects whose name or synonym equals one of
  /// `subject_names`, most matches first.
  fn infer_categories<'a>(
    &'a self,
    subject_names: &'a [String],
  ) -> impl Future<Output = Result<Vec<CategoryInference>, Self::Error>> + Send + 'a;
}

// ─── Document ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
  pub collection: String,
  pub sync_id:    String,
  pub body:       Map<String, Value>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum QueryType {
  Triple,
  Inference,
}

#[derive(Debug, Clone)]
pub struct NewQueryLog {
  pub query_type: QueryType,
  pub input:      Value,
  pub triples:    Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryLog {
  pub log_id:      Uuid,
  pub query_type:  QueryType,
  pub input:       Value,
  pub triples:     Vec<Value>,
  pub recorded_at: DateTime<Utc>,
}

/// Schemaless documents keyed by `(collection, sync_id)`, plus an
/// append-only query log.
pub trait DocumentStore: Send + Sync {
  type Error: StoreError;

  /// Merge `fields` into the document, creating it if absent. Stamps
  /// `_sync_id` and `updated_at`.
  fn upsert<'a>(
    &'a self,
    collection: &'a str,
    sync_id: &'a str,
    fields: Map<String, Value>,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + 'a;

  fn get<'a>(
    &'a self,
    collection: &'a str,
    sync_id: &'a str,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + 'a;

  fn find_many<'a>(
    &'a self,
    collection: &'a str,
    sync_ids: &'a [String],
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + 'a;

  /// Documents whose top-level `field` equals `value`, oldest first.
  fn find_where<'a>(
    &'a self,
    collection: &'a str,
    field: &'a str,
    value: &'a Value,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + 'a;

  /// Returns `false` if there was nothing to delete.
  fn delete<'a>(
    &'a self,
    collection: &'a str,
    sync_id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn log_query(
    &self,
    entry: NewQueryLog,
  ) -> impl Future<Output = Result<QueryLog, Self::Error>> + Send + '_;

  /// Most recent first.
  fn query_logs(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<QueryLog>, Self::Error>> + Send + '_;
}

// ─── Wiring ──────────────────────────────────────────────────────────────────

/// Names one concrete implementation of each store.
pub trait Backend: Send + Sync + 'static {
  type Relational: RelationalStore + 'static;
  type Graph: GraphStore + 'static;
  type Document: DocumentStore + 'static;
}

/// Shared handles to the three stores of one [`Backend`].
pub struct Stores<B: Backend> {
  pub relational: Arc<B::Relational>,
  pub graph:      Arc<B::Graph>,
  pub document:   Arc<B::Document>,
}

impl<B: Backend> Stores<B> {
  pub fn new(relational: B::Relational, graph: B::Graph, document: B::Document) -> Self {
    Self {
      relational: Arc::new(relational),
      graph:      Arc::new(graph),
      document:   Arc::new(document),
    }
  }
}

// Derived `Clone` would demand `B: Clone`.
impl<B: Backend> Clone for Stores<B> {
  fn clone(&self) -> Self {
    Self {
      relational: Arc::clone(&self.relational),
      graph:      Arc::clone(&self.graph),
      document:   Arc::clone(&self.document),
    }
  }
}
