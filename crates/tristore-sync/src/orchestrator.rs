//! The saga orchestrator.
//!
//! Every mutation follows the same path:
//!
//! ```text
//! lock ─► relational ─┬─ err ─► Err (nothing to undo)
//!                     └─ ok ──► graph ─┬─ err ─► revert relational ─► clean graph ─► report
//!                                      └─ ok ──► document ─┬─ err ─► report (no revert)
//!                                                          └─ ok ──► report
//! ```
//!
//! The relational store is the source of truth and is only reverted when the
//! graph mirror rejects a write. A document-mirror failure leaves the other
//! two stores committed and is reported as `PartiallyCommitted`.

use serde::Serialize;
use serde_json::Value;
use tracing::instrument;
use tristore_core::{
  StoreError, label,
  record::{Action, NewRecord, Record, RecordKey, RecordPatch, Removal, Upserted},
  store::{Backend, DocumentStore, GraphStore, RelationalStore, Stores},
};

use crate::{
  Result, SyncError,
  lock::KeyLocks,
  mirror::{self, Projection},
  saga::{Saga, StoreFailure, StoreKind, StoreStatus, SyncReport},
};

fn pg<E: StoreError>(e: E) -> SyncError { SyncError::store(StoreKind::Postgres, e) }

fn lock_key(key: &RecordKey) -> String { format!("{}:{key}", key.kind()) }

/// A record as seen by each store.
#[derive(Debug, Clone, Serialize)]
pub struct SyncedRecord {
  pub postgres:   Record,
  pub neo4j:      Option<Value>,
  pub mongo:      Option<Value>,
  /// Stores currently holding a copy.
  pub present_in: Vec<StoreKind>,
  pub errors:     Vec<StoreFailure>,
}

pub struct Orchestrator<B: Backend> {
  stores: Stores<B>,
  locks:  KeyLocks,
}

impl<B: Backend> Orchestrator<B> {
  pub fn new(stores: Stores<B>) -> Self { Self { stores, locks: KeyLocks::new() } }

  pub fn stores(&self) -> &Stores<B> { &self.stores }

  // ─── Mutations ─────────────────────────────────────────────────────────────

  /// Create a record, or update it when the input names an existing one.
  ///
  /// The natural key is locked first, then the key of the row it resolves
  /// to, so an upsert and an update of the same row never interleave.
  #[instrument(skip_all, fields(kind = %input.kind()))]
  pub async fn create(&self, input: NewRecord) -> Result<SyncReport> {
    let natural = input.lock_key();
    let _natural = self.locks.acquire(natural.clone()).await;
    let rel = &*self.stores.relational;

    let existing = match &input {
      NewRecord::Triple(t) => rel
        .find_triple(t.subject_id, t.relationship_id, t.object_id)
        .await
        .map_err(pg)?
        .map(|t| RecordKey::Triple(t.id)),
      _ => input.explicit_key(),
    };
    let _row = match &existing {
      Some(key) if lock_key(key) != natural => Some(self.locks.acquire(lock_key(key)).await),
      _ => None,
    };
    let before = match &existing {
      Some(key) => rel.get(key).await.map_err(pg)?,
      None => None,
    };
    let snapshot = self.snapshot(before).await?;

    let Upserted { action, value: record } = rel.create(input).await.map_err(pg)?;
    tracing::debug!(key = %record.key(), %action, "relational write committed");

    let mut saga = Saga::new(action);
    saga.applied(StoreKind::Postgres, action.into());
    self.mirror_write(&mut saga, &record, &snapshot).await;
    Ok(finish(saga, &record))
  }

  #[instrument(skip_all, fields(kind = %key.kind(), %key))]
  pub async fn update(&self, key: &RecordKey, patch: RecordPatch) -> Result<SyncReport> {
    let _guard = self.locks.acquire(lock_key(key)).await;
    let rel = &*self.stores.relational;

    let before = rel
      .get(key)
      .await
      .map_err(pg)?
      .ok_or_else(|| key.not_found())?;
    let snapshot = self.snapshot(Some(before)).await?;
    let record = rel
      .update(key, patch)
      .await
      .map_err(pg)?
      .ok_or_else(|| key.not_found())?;

    let mut saga = Saga::new(Action::Updated);
    saga.applied(StoreKind::Postgres, StoreStatus::Updated);
    self.mirror_write(&mut saga, &record, &snapshot).await;
    Ok(finish(saga, &record))
  }

  /// `before` followed by the rows a write to it may cascade into.
  async fn snapshot(&self, before: Option<Record>) -> Result<Vec<Record>> {
    let Some(before) = before else {
      return Ok(Vec::new());
    };
    let cascade = mirror::cascade(&*self.stores.relational, &before).await?;
    Ok(std::iter::once(before).chain(cascade).collect())
  }

  /// Delete a record and its cascade from every store.
  #[instrument(skip_all, fields(kind = %key.kind(), %key))]
  pub async fn delete(&self, key: &RecordKey) -> Result<SyncReport> {
    let _guard = self.locks.acquire(lock_key(key)).await;

    let removal = self
      .stores
      .relational
      .delete(key)
      .await
      .map_err(pg)?
      .ok_or_else(|| key.not_found())?;
    tracing::debug!(removed = removal.len(), "relational delete committed");

    let mut saga = Saga::new(Action::Deleted);
    saga.applied(StoreKind::Postgres, StoreStatus::Deleted);

    if let Err(e) = mirror::remove(&*self.stores.graph, &removal.records).await {
      tracing::warn!(error = %e, "graph mirror delete failed");
      saga.failed(StoreKind::Neo4j, e.to_string());
      self.restore_removal(&mut saga, &removal).await;
      return Ok(finish_removal(saga, &removal));
    }
    saga.applied(StoreKind::Neo4j, StoreStatus::Deleted);

    match mirror::delete_documents(&*self.stores.document, &removal.records).await {
      Ok(()) => saga.applied(StoreKind::Mongo, StoreStatus::Deleted),
      Err(e) => {
        tracing::warn!(error = %e, "document mirror delete failed");
        saga.failed(StoreKind::Mongo, e.to_string());
      }
    }
    Ok(finish_removal(saga, &removal))
  }

  // ─── Reads ─────────────────────────────────────────────────────────────────

  /// Fetch a record from the relational store together with its mirrors.
  pub async fn get(&self, key: &RecordKey) -> Result<SyncedRecord> {
    let record = self
      .stores
      .relational
      .get(key)
      .await
      .map_err(pg)?
      .ok_or_else(|| key.not_found())?;

    let mut errors = Vec::new();
    let neo4j = self.graph_view(&record).await.unwrap_or_else(|e| {
      errors.push(StoreFailure { store: StoreKind::Neo4j, message: e.to_string() });
      None
    });
    let mongo = match self
      .stores
      .document
      .get(record.kind().collection(), &mirror::sync_id(&record))
      .await
    {
      Ok(doc) => doc.and_then(|doc| serde_json::to_value(doc).ok()),
      Err(e) => {
        errors.push(StoreFailure { store: StoreKind::Mongo, message: e.to_string() });
        None
      }
    };

    let mut present_in = vec![StoreKind::Postgres];
    if neo4j.is_some() {
      present_in.push(StoreKind::Neo4j);
    }
    if mongo.is_some() {
      present_in.push(StoreKind::Mongo);
    }
    Ok(SyncedRecord { postgres: record, neo4j, mongo, present_in, errors })
  }

  async fn graph_view(&self, record: &Record) -> Result<Option<Value>> {
    let graph = &*self.stores.graph;

    if let Some(label) = label::for_kind(record.kind()) {
      let node = graph.get_node(&label, record.name()).await.map_err(mirror::graph_err)?;
      return Ok(node.and_then(|node| serde_json::to_value(node).ok()));
    }
    let Projection::Edge(edge) = mirror::plan(&*self.stores.relational, record, None).await?
    else {
      return Ok(None);
    };
    let triple_id = Value::from(edge.triple_id);
    let found = graph
      .edges(&edge.edge_type)
      .await
      .map_err(mirror::graph_err)?
      .into_iter()
      .find(|e| e.props.get(label::TRIPLE_ID.as_str()) == Some(&triple_id));
    Ok(found.and_then(|edge| serde_json::to_value(edge).ok()))
  }

  // ─── Mirror steps ──────────────────────────────────────────────────────────

  /// Graph then document, compensating if the graph refuses the write.
  /// `snapshot` is empty for a fresh insert.
  async fn mirror_write(&self, saga: &mut Saga, record: &Record, snapshot: &[Record]) {
    // A create that matched an existing row reports `updated` everywhere.
    let status = StoreStatus::from(saga.action());

    match self.project(record, snapshot.first()).await {
      Ok(notes) => {
        saga.applied(StoreKind::Neo4j, status);
        for note in notes {
          saga.note(note);
        }
      }
      Err(e) => {
        tracing::warn!(key = %record.key(), error = %e, "graph mirror write failed");
        saga.failed(StoreKind::Neo4j, e.to_string());
        self.revert_write(saga, record, snapshot).await;
        return;
      }
    }

    match self.write_documents(record, snapshot.first()).await {
      Ok(()) => saga.applied(StoreKind::Mongo, status),
      Err(e) => {
        tracing::warn!(key = %record.key(), error = %e, "document mirror write failed");
        saga.failed(StoreKind::Mongo, e.to_string());
      }
    }
  }

  /// Project `record` and re-project whatever embeds the parts of it that
  /// changed since `before`.
  async fn project(&self, record: &Record, before: Option<&Record>) -> Result<Vec<String>> {
    let (rel, graph) = (&*self.stores.relational, &*self.stores.graph);
    let mut notes = mirror::apply(graph, &mirror::plan(rel, record, before).await?).await?;
    for dependent in mirror::dependents(rel, record, before).await? {
      notes.extend(mirror::apply(graph, &mirror::plan(rel, &dependent, None).await?).await?);
    }
    Ok(notes)
  }

  /// Upsert the document of `record` and of every dependent the write
  /// touched.
  async fn write_documents(&self, record: &Record, before: Option<&Record>) -> Result<()> {
    let document = &*self.stores.document;
    mirror::upsert_document(document, record).await?;
    for dependent in mirror::dependents(&*self.stores.relational, record, before).await? {
      mirror::upsert_document(document, &dependent).await?;
    }
    Ok(())
  }

  /// Undo a create or update after the graph failed.
  async fn revert_write(&self, saga: &mut Saga, record: &Record, snapshot: &[Record]) {
    let rel = &*self.stores.relational;
    let before = snapshot.first();
    let reverted = match before {
      Some(_) => rel.restore(snapshot.to_vec()).await.map_err(pg),
      None => rel.delete(&record.key()).await.map(drop).map_err(pg),
    };
    if let Err(e) = reverted {
      tracing::error!(key = %record.key(), error = %e, "relational compensation failed");
      saga.compensation_failed(StoreKind::Postgres, &e);
      // The relational store keeps the write the mirrors never saw.
      saga.drifted(StoreKind::Mongo);
      return;
    }
    saga.reverted();

    let cleaned = match before {
      Some(before) => self.project(before, Some(record)).await.map(drop),
      None => mirror::remove(&*self.stores.graph, std::slice::from_ref(record)).await,
    };
    match cleaned {
      Ok(()) => saga.reconciled(StoreKind::Neo4j),
      Err(e) => {
        tracing::error!(key = %record.key(), error = %e, "graph compensation failed");
        saga.compensation_failed(StoreKind::Neo4j, &e);
      }
    }
  }

  /// Put back everything a delete removed after the graph failed.
  async fn restore_removal(&self, saga: &mut Saga, removal: &Removal) {
    if let Err(e) = self.stores.relational.restore(removal.records.clone()).await {
      tracing::error!(error = %e, "relational compensation failed");
      saga.compensation_failed(StoreKind::Postgres, &e);
      saga.drifted(StoreKind::Mongo);
      return;
    }
    saga.reverted();

    for record in &removal.records {
      if let Err(e) = self.project(record, None).await {
        tracing::error!(key = %record.key(), error = %e, "graph compensation failed");
        saga.compensation_failed(StoreKind::Neo4j, &e);
        return;
      }
    }
    saga.reconciled(StoreKind::Neo4j);
  }
}

fn finish(saga: Saga, record: &Record) -> SyncReport {
  let report = saga.finish(serde_json::to_value(record).ok());
  log_outcome(&report);
  report
}

fn finish_removal(saga: Saga, removal: &Removal) -> SyncReport {
  let report = saga.finish(serde_json::to_value(removal).ok());
  log_outcome(&report);
  report
}

fn log_outcome(report: &SyncReport) {
  if report.success {
    tracing::info!(operation_id = %report.operation_id, action = %report.action, "saga committed");
  } else {
    tracing::warn!(
      operation_id = %report.operation_id,
      action = %report.action,
      saga = ?report.saga,
      "saga did not commit"
    );
  }
}
