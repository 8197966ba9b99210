mod orchestrator;
mod query;

use std::{collections::BTreeSet, time::Duration};

use serde_json::Value;
use tristore_core::{
  entity::{
    ConfidenceScore, NewCategory, NewDiagram, NewRelationship, NewRootCategory, NewRootSubject,
    NewSubject, NewTriple,
  },
  record::NewRecord,
  store::{Backend, Stores},
};
use tristore_store_sqlite::{SqliteDocumentStore, SqliteGraphStore, SqliteRelationalStore};

use self::flaky::Flaky;
use crate::{Orchestrator, QueryEngine, SyncReport};

/// SQLite stores with failure injection on both mirrors.
pub(crate) struct Harness;

impl Backend for Harness {
  type Relational = SqliteRelationalStore;
  type Graph = Flaky<SqliteGraphStore>;
  type Document = Flaky<SqliteDocumentStore>;
}

pub(crate) struct Fixture {
  pub stores:       Stores<Harness>,
  pub orchestrator: Orchestrator<Harness>,
  pub engine:       QueryEngine<Harness>,
}

pub(crate) async fn fixture() -> Fixture {
  let stores = Stores::<Harness>::new(
    SqliteRelationalStore::open_in_memory().await.expect("relational"),
    Flaky::new(SqliteGraphStore::open_in_memory().await.expect("graph")),
    Flaky::new(SqliteDocumentStore::open_in_memory().await.expect("document")),
  );
  Fixture {
    orchestrator: Orchestrator::new(stores.clone()),
    engine: QueryEngine::new(stores.clone(), Duration::from_secs(5)),
    stores,
  }
}

// ─── Input builders ──────────────────────────────────────────────────────────

pub(crate) fn root_subject(name: &str, parent_id: Option<i64>) -> NewRecord {
  NewRecord::RootSubject(NewRootSubject {
    id: None,
    code: None,
    name: name.into(),
    description: None,
    parent_id,
    level: None,
  })
}

pub(crate) fn subject(name: &str, root_subject_id: i64, categories: &[&str]) -> NewRecord {
  NewRecord::Subject(NewSubject {
    id: None,
    name: name.into(),
    root_subject_id,
    synonyms: BTreeSet::new(),
    categories: categories.iter().map(|c| (*c).to_owned()).collect(),
    description: None,
  })
}

pub(crate) fn relationship(name: &str, semantic_type: &str) -> NewRecord {
  NewRecord::Relationship(NewRelationship {
    name:                 name.into(),
    description:          None,
    inverse_relationship: None,
    semantic_type:        Some(semantic_type.into()),
  })
}

pub(crate) fn triple(
  subject_id: i64,
  relationship_id: i64,
  object_id: i64,
  diagram_id: Option<&str>,
  confidence: f64,
) -> NewRecord {
  NewRecord::Triple(NewTriple {
    subject_id,
    relationship_id,
    object_id,
    diagram_id: diagram_id.map(str::to_owned),
    confidence_score: Some(ConfidenceScore::new(confidence).unwrap()),
    context: None,
  })
}

pub(crate) fn root_category(id: &str, name: &str) -> NewRecord {
  NewRecord::RootCategory(NewRootCategory {
    id:          id.into(),
    code:        None,
    name:        name.into(),
    description: None,
  })
}

pub(crate) fn category(name: &str, root_category_id: &str) -> NewRecord {
  NewRecord::Category(NewCategory {
    name:             name.into(),
    root_category_id: root_category_id.into(),
    level:            1,
    description:      None,
  })
}

pub(crate) fn diagram(id: &str, category_id: i64) -> NewRecord {
  NewRecord::Diagram(NewDiagram {
    id:          id.into(),
    category_id: Some(category_id),
    image_path:  Some(format!("/diagrams/{id}.png")),
    processed:   true,
    metadata:    None,
  })
}

// ─── Report helpers ──────────────────────────────────────────────────────────

pub(crate) fn field<'a>(report: &'a SyncReport, key: &str) -> &'a Value {
  &report.data.as_ref().expect("report carries data")[key]
}

pub(crate) fn id_of(report: &SyncReport) -> i64 {
  field(report, "id").as_i64().expect("integer id")
}

impl Fixture {
  /// Create through the orchestrator and insist that every store committed.
  pub async fn commit(&self, input: NewRecord) -> SyncReport {
    let report = self.orchestrator.create(input).await.expect("create");
    assert!(report.success, "saga did not commit: {report:?}");
    report
  }

  /// The ecology fixture: root category `eco`, category `Food webs`, and
  /// diagram `d-1` filed under it. Returns the category id.
  pub async fn food_web_diagram(&self) -> i64 {
    self.commit(root_category("eco", "Ecology")).await;
    let category_id = id_of(&self.commit(category("Food webs", "eco")).await);
    self.commit(diagram("d-1", category_id)).await;
    category_id
  }
}
