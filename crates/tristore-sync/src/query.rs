//! Triple search and subject inference across the three stores.
//!
//! Reads fan out concurrently, each bounded by its own timeout. A source that
//! fails or times out adds an entry to `errors` and contributes nothing;
//! the rest of the answer is still returned.

use std::{collections::HashMap, future::Future, time::Duration};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::instrument;
use tristore_core::{
  StoreError,
  entity::Diagram,
  record::{Record, RecordKey},
  store::{
    Backend, CategoryInference, CategoryMatch, Document, DocumentStore, GraphStore,
    GraphTripleMatch, NewQueryLog, QueryLog, QueryType, RelationalStore, Stores, TripleQuery,
  },
};
use uuid::Uuid;

use crate::{
  Result, SyncError,
  inference::infer_category,
  mirror::{ANNOTATIONS, DEFAULT_PROCESSING_MODEL, SEMANTIC_RELATIONSHIPS},
  saga::{StoreFailure, StoreKind},
};

fn invalid(message: &str) -> SyncError {
  tristore_core::Error::Validation(message.to_owned()).into()
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// One diagram in a merged result, with every source that referenced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagramHit {
  pub diagram_id: String,
  pub sources:    Vec<StoreKind>,
  /// The relational row, when the relational store supplied this hit.
  pub diagram:    Option<Diagram>,
  pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripleSearch {
  pub query:             TripleQuery,
  pub postgres:          Vec<CategoryMatch>,
  pub neo4j:             Vec<GraphTripleMatch>,
  /// Annotations of the diagrams the graph matches point at.
  pub mongo:             Vec<Document>,
  /// Set when no store matched and the keyword rules picked a category.
  pub inferred_category: Option<String>,
  pub diagrams:          Vec<DiagramHit>,
  pub errors:            Vec<StoreFailure>,
  pub warnings:          Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectInference {
  pub subjects:          Vec<String>,
  pub categories:        Vec<CategoryInference>,
  pub inferred_category: Option<String>,
  pub diagrams:          Vec<Diagram>,
  pub errors:            Vec<StoreFailure>,
  pub warnings:          Vec<String>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct QueryEngine<B: Backend> {
  stores:       Stores<B>,
  read_timeout: Duration,
}

impl<B: Backend> QueryEngine<B> {
  pub fn new(stores: Stores<B>, read_timeout: Duration) -> Self { Self { stores, read_timeout } }

  /// Run one store read under the read timeout.
  async fn bounded<T, E: StoreError>(
    &self,
    store: StoreKind,
    read: impl Future<Output = Result<T, E>>,
  ) -> Result<T, StoreFailure> {
    match tokio::time::timeout(self.read_timeout, read).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(e)) => Err(StoreFailure { store, message: e.to_string() }),
      Err(_) => Err(StoreFailure {
        store,
        message: format!("timed out after {} ms", self.read_timeout.as_millis()),
      }),
    }
  }

  /// Categories scored by the relational store, plus the diagrams filed
  /// under the best one.
  async fn relational_matches(
    &self,
    query: &TripleQuery,
  ) -> Result<(Vec<CategoryMatch>, Vec<Diagram>), StoreFailure> {
    let rel = &*self.stores.relational;
    let read = async {
      let matches = rel.search_by_triple(query).await?;
      let diagrams = match matches.first() {
        Some(best) => rel.diagrams_in_category(best.category_id).await?,
        None => Vec::new(),
      };
      Ok::<_, <B::Relational as RelationalStore>::Error>((matches, diagrams))
    };
    self.bounded(StoreKind::Postgres, read).await
  }

  #[instrument(skip_all, fields(
    subject = %query.subject,
    relationship = %query.relationship,
    object = %query.object,
  ))]
  pub async fn search(&self, query: TripleQuery) -> TripleSearch {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let (relational, graph) = tokio::join!(
      self.relational_matches(&query),
      self.bounded(StoreKind::Neo4j, self.stores.graph.search_by_triple(&query)),
    );
    let (postgres, relational_diagrams) = relational.unwrap_or_else(|e| {
      errors.push(e);
      Default::default()
    });
    let neo4j = graph.unwrap_or_else(|e| {
      errors.push(e);
      Vec::new()
    });

    let mut graph_ids: Vec<String> = neo4j.iter().filter_map(|m| m.diagram_id.clone()).collect();
    graph_ids.sort();
    graph_ids.dedup();
    let mongo = if graph_ids.is_empty() {
      Vec::new()
    } else {
      let read = self.stores.document.find_many(ANNOTATIONS, &graph_ids);
      self.bounded(StoreKind::Mongo, read).await.unwrap_or_else(|e| {
        errors.push(e);
        Vec::new()
      })
    };

    let mut inferred_category = None;
    let mut inferred_diagrams = Vec::new();
    if postgres.is_empty() && neo4j.is_empty() {
      match self.infer(&query).await {
        Ok(Some((category, diagrams))) => {
          tracing::debug!(%category, found = diagrams.len(), "fell back to keyword inference");
          inferred_category = Some(category);
          inferred_diagrams = diagrams;
        }
        Ok(None) => {}
        Err(e) => errors.push(e),
      }
    }

    let diagrams = merge_diagrams(
      relational_diagrams.into_iter().chain(inferred_diagrams),
      &neo4j,
    );

    let entry = NewQueryLog {
      query_type: QueryType::Triple,
      input:      serde_json::to_value(&query).unwrap_or(Value::Null),
      triples:    neo4j.iter().filter_map(|m| serde_json::to_value(m).ok()).collect(),
    };
    if let Err(e) = self.bounded(StoreKind::Mongo, self.stores.document.log_query(entry)).await {
      tracing::warn!(error = %e.message, "query log write failed");
      warnings.push(format!("query log not recorded: {}", e.message));
    }

    TripleSearch {
      query,
      postgres,
      neo4j,
      mongo,
      inferred_category,
      diagrams,
      errors,
      warnings,
    }
  }

  /// Keyword inference over the root subjects of the query's subject and
  /// object.
  async fn infer(
    &self,
    query: &TripleQuery,
  ) -> Result<Option<(String, Vec<Diagram>)>, StoreFailure> {
    let rel = &*self.stores.relational;
    let (subject_root, object_root) = tokio::join!(
      self.bounded(StoreKind::Postgres, rel.root_subject_name(&query.subject)),
      self.bounded(StoreKind::Postgres, rel.root_subject_name(&query.object)),
    );
    // Both ends must resolve to a known subject.
    let (Some(subject_root), Some(object_root)) = (subject_root?, object_root?) else {
      return Ok(None);
    };
    let Some(category) = infer_category(&subject_root, &object_root) else {
      return Ok(None);
    };
    let diagrams = self
      .bounded(StoreKind::Postgres, rel.diagrams_by_category_name(category))
      .await?;
    Ok(Some((category.to_owned(), diagrams)))
  }

  /// Rank categories by how many of `subjects` the graph links to them and
  /// return the diagrams of the best one.
  #[instrument(skip_all, fields(subjects = subjects.len()))]
  pub async fn infer_from_subjects(&self, subjects: Vec<String>) -> SubjectInference {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let categories = self
      .bounded(StoreKind::Neo4j, self.stores.graph.infer_categories(&subjects))
      .await
      .unwrap_or_else(|e| {
        errors.push(e);
        Vec::new()
      });
    let inferred_category = categories.first().map(|c| c.category.clone());

    let diagrams = match &inferred_category {
      Some(name) => {
        let read = self.stores.relational.diagrams_by_category_name(name);
        self.bounded(StoreKind::Postgres, read).await.unwrap_or_else(|e| {
          errors.push(e);
          Vec::new()
        })
      }
      None => Vec::new(),
    };

    let entry = NewQueryLog {
      query_type: QueryType::Inference,
      input:      Value::from(subjects.clone()),
      triples:    Vec::new(),
    };
    if let Err(e) = self.bounded(StoreKind::Mongo, self.stores.document.log_query(entry)).await {
      tracing::warn!(error = %e.message, "query log write failed");
      warnings.push(format!("query log not recorded: {}", e.message));
    }

    SubjectInference { subjects, categories, inferred_category, diagrams, errors, warnings }
  }

  // ─── Annotations & logs ────────────────────────────────────────────────────

  /// Merge `fields` into the annotation document of an existing diagram.
  pub async fn annotate(&self, diagram_id: &str, fields: Map<String, Value>) -> Result<Document> {
    self.require_diagram(diagram_id).await?;
    self
      .stores
      .document
      .upsert(ANNOTATIONS, diagram_id, fields)
      .await
      .map_err(|e| SyncError::store(StoreKind::Mongo, e))
  }

  async fn require_diagram(&self, diagram_id: &str) -> Result<()> {
    let key = RecordKey::Diagram(diagram_id.to_owned());
    let found = self
      .stores
      .relational
      .get(&key)
      .await
      .map_err(|e| SyncError::store(StoreKind::Postgres, e))?;
    if !matches!(found, Some(Record::Diagram(_))) {
      return Err(key.not_found().into());
    }
    Ok(())
  }

  pub async fn query_logs(&self, limit: usize) -> Result<Vec<QueryLog>> {
    self
      .stores
      .document
      .query_logs(limit)
      .await
      .map_err(|e| SyncError::store(StoreKind::Mongo, e))
  }

  // ─── Semantic relationships ────────────────────────────────────────────────

  /// Store the relationships extracted from one diagram as a new document.
  /// `fields` needs a `diagram_id` naming an existing diagram, a `category`
  /// and an `extracted_relationships` list.
  pub async fn record_semantic_relationships(
    &self,
    mut fields: Map<String, Value>,
  ) -> Result<Document> {
    let diagram_id = match fields.get("diagram_id") {
      Some(Value::String(id)) => id.clone(),
      _ => return Err(invalid("diagram_id must be a string")),
    };
    if !matches!(fields.get("category"), Some(Value::String(_))) {
      return Err(invalid("category must be a string"));
    }
    if !matches!(fields.get("extracted_relationships"), Some(Value::Array(_))) {
      return Err(invalid("extracted_relationships must be a list"));
    }
    self.require_diagram(&diagram_id).await?;

    fields
      .entry("processing_model")
      .or_insert_with(|| Value::from(DEFAULT_PROCESSING_MODEL));
    let id = Uuid::new_v4().to_string();
    let doc = self
      .stores
      .document
      .upsert(SEMANTIC_RELATIONSHIPS, &id, fields)
      .await
      .map_err(|e| SyncError::store(StoreKind::Mongo, e))?;
    tracing::debug!(%id, %diagram_id, "semantic relationships recorded");
    Ok(doc)
  }

  pub async fn semantic_relationships(&self, id: &str) -> Result<Option<Document>> {
    self
      .stores
      .document
      .get(SEMANTIC_RELATIONSHIPS, id)
      .await
      .map_err(|e| SyncError::store(StoreKind::Mongo, e))
  }

  /// Every semantic-relationship document recorded for `diagram_id`.
  pub async fn semantic_relationships_for(&self, diagram_id: &str) -> Result<Vec<Document>> {
    let diagram_id = Value::from(diagram_id);
    self
      .stores
      .document
      .find_where(SEMANTIC_RELATIONSHIPS, "diagram_id", &diagram_id)
      .await
      .map_err(|e| SyncError::store(StoreKind::Mongo, e))
  }
}

/// Relational diagrams first, in order, keeping their row; graph references
/// add their source and confidence to an existing hit or append a new one.
fn merge_diagrams(
  relational: impl IntoIterator<Item = Diagram>,
  graph: &[GraphTripleMatch],
) -> Vec<DiagramHit> {
  let mut hits: Vec<DiagramHit> = Vec::new();
  let mut index: HashMap<String, usize> = HashMap::new();

  for diagram in relational {
    if index.contains_key(&diagram.id) {
      continue;
    }
    index.insert(diagram.id.clone(), hits.len());
    hits.push(DiagramHit {
      diagram_id: diagram.id.clone(),
      sources:    vec![StoreKind::Postgres],
      diagram:    Some(diagram),
      confidence: None,
    });
  }

  for found in graph {
    let Some(id) = &found.diagram_id else { continue };
    match index.get(id) {
      Some(&at) => {
        let hit = &mut hits[at];
        if !hit.sources.contains(&StoreKind::Neo4j) {
          hit.sources.push(StoreKind::Neo4j);
        }
        hit.confidence = max_confidence(hit.confidence, found.confidence);
      }
      None => {
        index.insert(id.clone(), hits.len());
        hits.push(DiagramHit {
          diagram_id: id.clone(),
          sources:    vec![StoreKind::Neo4j],
          diagram:    None,
          confidence: found.confidence,
        });
      }
    }
  }
  hits
}

fn max_confidence(a: Option<f64>, b: Option<f64>) -> Option<f64> {
  match (a, b) {
    (Some(a), Some(b)) => Some(a.max(b)),
    (a, b) => a.or(b),
  }
}
