//! Per-mutation saga bookkeeping and the report handed back to callers.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;
use tristore_core::record::Action;
use uuid::Uuid;

// ─── Stores ──────────────────────────────────────────────────────────────────

/// The three stores, named by the wire keys of [`SyncReport`].
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreKind {
  /// The relational source of truth.
  Postgres,
  /// The graph mirror.
  Neo4j,
  /// The document mirror.
  Mongo,
}

/// What one store ended up doing for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StoreStatus {
  Created,
  Updated,
  Deleted,
  /// The write was applied and then undone by compensation.
  Reverted,
}

impl From<Action> for StoreStatus {
  fn from(action: Action) -> Self {
    match action {
      Action::Created => Self::Created,
      Action::Updated => Self::Updated,
      Action::Deleted => Self::Deleted,
    }
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// Terminal state of a saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SagaState {
  /// Every store holds the mutation.
  Committed,
  /// The listed stores disagree with the relational store.
  PartiallyCommitted { failed_stores: Vec<StoreKind> },
  /// The mutation was undone everywhere it had been applied.
  RolledBack,
}

impl SagaState {
  pub fn is_committed(&self) -> bool { matches!(self, Self::Committed) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreFailure {
  pub store:   StoreKind,
  pub message: String,
}

/// The outcome of one synchronized mutation in every store.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
  pub operation_id: Uuid,
  /// `true` only when the saga committed in all three stores.
  pub success:      bool,
  pub action:       Action,
  pub saga:         SagaState,
  pub postgres:     Option<StoreStatus>,
  pub neo4j:        Option<StoreStatus>,
  pub mongo:        Option<StoreStatus>,
  pub data:         Option<Value>,
  pub errors:       Vec<StoreFailure>,
  pub warnings:     Vec<String>,
}

impl SyncReport {
  pub fn status(&self, store: StoreKind) -> Option<StoreStatus> {
    match store {
      StoreKind::Postgres => self.postgres,
      StoreKind::Neo4j => self.neo4j,
      StoreKind::Mongo => self.mongo,
    }
  }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Accumulates step results while a saga runs.
#[derive(Debug)]
pub(crate) struct Saga {
  operation_id: Uuid,
  action:       Action,
  postgres:     Option<StoreStatus>,
  neo4j:        Option<StoreStatus>,
  mongo:        Option<StoreStatus>,
  errors:       Vec<StoreFailure>,
  warnings:     Vec<String>,
  inconsistent: BTreeSet<StoreKind>,
  rolled_back:  bool,
}

impl Saga {
  pub fn new(action: Action) -> Self {
    Self {
      operation_id: Uuid::new_v4(),
      action,
      postgres: None,
      neo4j: None,
      mongo: None,
      errors: Vec::new(),
      warnings: Vec::new(),
      inconsistent: BTreeSet::new(),
      rolled_back: false,
    }
  }

  pub fn action(&self) -> Action { self.action }

  pub fn applied(&mut self, store: StoreKind, status: StoreStatus) {
    *self.slot(store) = Some(status);
  }

  /// A forward step failed; the store no longer matches the source of truth.
  pub fn failed(&mut self, store: StoreKind, message: impl Into<String>) {
    self.errors.push(StoreFailure { store, message: message.into() });
    self.inconsistent.insert(store);
  }

  /// A store was brought back in line by compensation.
  pub fn reconciled(&mut self, store: StoreKind) { self.inconsistent.remove(&store); }

  pub fn drifted(&mut self, store: StoreKind) { self.inconsistent.insert(store); }

  /// The relational write was undone.
  pub fn reverted(&mut self) {
    self.postgres = Some(StoreStatus::Reverted);
    self.rolled_back = true;
  }

  pub fn note(&mut self, warning: impl Into<String>) { self.warnings.push(warning.into()); }

  pub fn compensation_failed(&mut self, store: StoreKind, message: impl std::fmt::Display) {
    self
      .warnings
      .push(format!("compensation failure in {store}: {message}"));
  }

  pub fn finish(self, data: Option<Value>) -> SyncReport {
    let saga = if self.inconsistent.is_empty() && self.errors.is_empty() {
      SagaState::Committed
    } else if self.inconsistent.is_empty() && self.rolled_back {
      SagaState::RolledBack
    } else {
      SagaState::PartiallyCommitted { failed_stores: self.inconsistent.into_iter().collect() }
    };
    SyncReport {
      operation_id: self.operation_id,
      success: saga.is_committed(),
      action: self.action,
      saga,
      postgres: self.postgres,
      neo4j: self.neo4j,
      mongo: self.mongo,
      data,
      errors: self.errors,
      warnings: self.warnings,
    }
  }

  fn slot(&mut self, store: StoreKind) -> &mut Option<StoreStatus> {
    match store {
      StoreKind::Postgres => &mut self.postgres,
      StoreKind::Neo4j => &mut self.neo4j,
      StoreKind::Mongo => &mut self.mongo,
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn clean_run_commits() {
    let mut saga = Saga::new(Action::Created);
    for store in [StoreKind::Postgres, StoreKind::Neo4j, StoreKind::Mongo] {
      saga.applied(store, StoreStatus::Created);
    }
    let report = saga.finish(None);
    assert!(report.success);
    assert_eq!(report.saga, SagaState::Committed);
  }

  #[test]
  fn reconciled_graph_failure_rolls_back() {
    let mut saga = Saga::new(Action::Created);
    saga.applied(StoreKind::Postgres, StoreStatus::Created);
    saga.failed(StoreKind::Neo4j, "down");
    saga.reverted();
    saga.reconciled(StoreKind::Neo4j);
    let report = saga.finish(None);
    assert!(!report.success);
    assert_eq!(report.saga, SagaState::RolledBack);
    assert_eq!(report.postgres, Some(StoreStatus::Reverted));
    assert_eq!(report.errors.len(), 1);
  }

  #[test]
  fn unreconciled_stores_are_listed_in_order() {
    let mut saga = Saga::new(Action::Updated);
    saga.failed(StoreKind::Mongo, "timeout");
    saga.drifted(StoreKind::Neo4j);
    let report = saga.finish(None);
    assert_eq!(
      report.saga,
      SagaState::PartiallyCommitted { failed_stores: vec![StoreKind::Neo4j, StoreKind::Mongo] }
    );
  }

  #[test]
  fn report_uses_wire_keys() {
    let mut saga = Saga::new(Action::Created);
    saga.applied(StoreKind::Postgres, StoreStatus::Created);
    saga.failed(StoreKind::Mongo, "boom");
    let value = serde_json::to_value(saga.finish(None)).unwrap();
    assert_eq!(value["postgres"], json!("created"));
    assert_eq!(value["mongo"], Value::Null);
    assert_eq!(value["saga"], json!({ "state": "partially_committed", "failed_stores": ["mongo"] }));
    assert_eq!(value["errors"][0]["store"], json!("mongo"));
  }
}
