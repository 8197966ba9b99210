use serde_json::json;
use tristore_core::{
  ErrorKind,
  ident::Ident,
  label,
  entity::ConfidenceScore,
  patch::{RelationshipPatch, RootSubjectPatch, SubjectPatch, TriplePatch},
  record::{Action, Record, RecordKey, RecordPatch},
  store::{DocumentStore, GraphStore, RelationalStore},
};

use super::*;
use crate::{SagaState, StoreKind, StoreStatus};

// ─── Committed sagas ─────────────────────────────────────────────────────────

#[tokio::test]
async fn create_reaches_every_store() {
  let f = fixture().await;
  let animal = f.commit(root_subject("Animal", None)).await;
  assert_eq!(animal.saga, SagaState::Committed);
  assert_eq!(animal.action, Action::Created);
  for store in [StoreKind::Postgres, StoreKind::Neo4j, StoreKind::Mongo] {
    assert_eq!(animal.status(store), Some(StoreStatus::Created));
  }
  assert_eq!(field(&animal, "code"), "ANI");

  let bee = f.commit(subject("Bee", id_of(&animal), &[])).await;
  assert_eq!(field(&bee, "code"), "SUB-ANI-001");

  let node = f
    .stores
    .graph
    .get_node(&label::SUBJECT, "Bee")
    .await
    .unwrap()
    .expect("subject node");
  assert_eq!(node.props["code"], "SUB-ANI-001");
  assert_eq!(node.props["entity_id"], id_of(&bee).to_string());

  let edges = f.stores.graph.edges(&label::HAS_SUBJECT).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!((edges[0].from.as_str(), edges[0].to.as_str()), ("Animal", "Bee"));

  let doc = f
    .stores
    .document
    .get("subjects", &id_of(&bee).to_string())
    .await
    .unwrap()
    .expect("subject document");
  assert_eq!(doc.body["name"], "Bee");
}

#[tokio::test]
async fn repeated_triple_keeps_one_edge() {
  let f = fixture().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);
  let plant = id_of(&f.commit(root_subject("Plant", None)).await);
  let bee = id_of(&f.commit(subject("Bee", animal, &[])).await);
  let flower = id_of(&f.commit(subject("Flower", plant, &[])).await);
  let eats = f.commit(relationship("eats", "trophic")).await;
  assert_eq!(field(&eats, "code"), "TRP-EATS");
  let eats = id_of(&eats);

  let first = f.commit(triple(bee, eats, flower, None, 0.6)).await;
  assert_eq!(first.action, Action::Created);
  assert_eq!(field(&first, "code"), "SUB-ANI-001_TRP-EATS_SUB-PLA-001");

  let second = f.commit(triple(bee, eats, flower, None, 0.9)).await;
  assert_eq!(second.action, Action::Updated);
  assert_eq!(second.neo4j, Some(StoreStatus::Updated));
  assert_eq!(id_of(&second), id_of(&first));

  let edge_type = Ident::new("TRP_EATS").unwrap();
  let edges = f.stores.graph.edges(&edge_type).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!((edges[0].from.as_str(), edges[0].to.as_str()), ("Bee", "Flower"));
  assert_eq!(edges[0].props["confidence"], json!(0.9));
  assert_eq!(edges[0].props["relationship_code"], "TRP-EATS");
}

#[tokio::test]
async fn rename_moves_the_node_and_keeps_its_edges() {
  let f = fixture().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);
  f.commit(subject("Bee", animal, &[])).await;

  let key = RecordKey::RootSubject(animal);
  let patch = RecordPatch::RootSubject(RootSubjectPatch {
    name: Some("Animals".into()),
    ..Default::default()
  });
  let report = f.orchestrator.update(&key, patch).await.unwrap();
  assert!(report.success);
  assert_eq!(report.neo4j, Some(StoreStatus::Updated));

  let graph = &f.stores.graph;
  assert!(graph.get_node(&label::ROOT_SUBJECT, "Animal").await.unwrap().is_none());
  let node = graph.get_node(&label::ROOT_SUBJECT, "Animals").await.unwrap().unwrap();
  assert_eq!(node.props["code"], "ANI");

  let edges = graph.edges(&label::HAS_SUBJECT).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].from, "Animals");

  let doc = f.stores.document.get("root_subjects", &animal.to_string()).await.unwrap().unwrap();
  assert_eq!(doc.body["name"], "Animals");
}

#[tokio::test]
async fn reparenting_replaces_the_hierarchy_edge() {
  let f = fixture().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);
  let plant = id_of(&f.commit(root_subject("Plant", None)).await);
  let bee = id_of(&f.commit(subject("Bee", animal, &[])).await);

  let patch = RecordPatch::Subject(SubjectPatch {
    root_subject_id: Some(plant),
    ..Default::default()
  });
  let report = f.orchestrator.update(&RecordKey::Subject(bee), patch).await.unwrap();
  assert!(report.success);
  assert_eq!(field(&report, "code"), "SUB-PLA-001");

  let edges = f.stores.graph.edges(&label::HAS_SUBJECT).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!((edges[0].from.as_str(), edges[0].to.as_str()), ("Plant", "Bee"));
}

#[tokio::test]
async fn renaming_onto_a_taken_name_redraws_the_triples() {
  let f = fixture().await;
  let (_, bee, t) = small_web(&f).await;

  let patch = RecordPatch::Subject(SubjectPatch {
    name: Some("Wasp".into()),
    ..Default::default()
  });
  let report = f.orchestrator.update(&RecordKey::Subject(bee), patch).await.unwrap();
  assert!(report.success);

  let graph = &f.stores.graph;
  assert!(graph.get_node(&label::SUBJECT, "Bee").await.unwrap().is_none());
  let edges = graph.edges(&Ident::new("TRP_EATS").unwrap()).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].props[label::TRIPLE_ID.as_str()], json!(t));
  assert_eq!((edges[0].from.as_str(), edges[0].to.as_str()), ("Wasp", "Wasp"));
}

#[tokio::test]
async fn renaming_a_relationship_retypes_its_edges() {
  let f = fixture().await;
  let (_, _, t) = small_web(&f).await;
  let Some(Record::Triple(before)) = f.stores.relational.get(&RecordKey::Triple(t)).await.unwrap()
  else {
    panic!("triple missing");
  };

  let patch = RecordPatch::Relationship(RelationshipPatch {
    name: Some("consumes".into()),
    ..Default::default()
  });
  let key = RecordKey::Relationship(before.relationship_id);
  let report = f.orchestrator.update(&key, patch).await.unwrap();
  assert!(report.success);
  assert_eq!(field(&report, "code"), "TRP-CONSUMES");

  let graph = &f.stores.graph;
  assert!(graph.edges(&Ident::new("TRP_EATS").unwrap()).await.unwrap().is_empty());
  let edges = graph.edges(&Ident::new("TRP_CONSUMES").unwrap()).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!((edges[0].from.as_str(), edges[0].to.as_str()), ("Wasp", "Bee"));
  assert_eq!(edges[0].props["relationship_code"], "TRP-CONSUMES");
  assert_eq!(edges[0].props["name"], "consumes");
  assert_eq!(edges[0].props["code"], "SUB-ANI-002_TRP-CONSUMES_SUB-ANI-001");

  let doc = f
    .stores
    .document
    .get("subject_relationship_object", &t.to_string())
    .await
    .unwrap()
    .expect("triple document");
  assert_eq!(doc.body["code"], "SUB-ANI-002_TRP-CONSUMES_SUB-ANI-001");
}

#[tokio::test]
async fn subject_categories_become_memberships() {
  let f = fixture().await;
  f.food_web_diagram().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);
  f.commit(subject("Bee", animal, &["Food webs", "No such category"])).await;

  let edges = f.stores.graph.edges(&label::IN_CATEGORY).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!((edges[0].from.as_str(), edges[0].to.as_str()), ("Bee", "Food webs"));

  let diagram_edges = f.stores.graph.edges(&label::HAS_DIAGRAM).await.unwrap();
  assert_eq!(diagram_edges[0].to, "d-1");
}

#[tokio::test]
async fn missing_graph_parent_is_a_warning() {
  let f = fixture().await;
  // Written relationally only, so the graph never saw it.
  let out = f.stores.relational.create(root_subject("Fungi", None)).await.unwrap();
  let Record::RootSubject(fungi) = out.value else { panic!("expected a root subject") };

  let report = f.commit(subject("Yeast", fungi.id, &[])).await;
  assert_eq!(report.warnings.len(), 1);
  assert!(report.warnings[0].contains("HAS_SUBJECT"));
}

// ─── Failures before the mirrors ─────────────────────────────────────────────

#[tokio::test]
async fn rejected_input_touches_no_store() {
  let f = fixture().await;
  let err = f.orchestrator.create(subject("Bee", 999, &[])).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
  assert!(f.stores.graph.get_node(&label::SUBJECT, "Bee").await.unwrap().is_none());

  let err = f
    .orchestrator
    .update(&RecordKey::Subject(42), RecordPatch::Subject(SubjectPatch::default()))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ─── Document mirror failure ─────────────────────────────────────────────────

#[tokio::test]
async fn document_failure_keeps_the_relational_row() {
  let f = fixture().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);

  f.stores.document.fail_always();
  let report = f.orchestrator.create(subject("Bee", animal, &[])).await.unwrap();
  assert!(!report.success);
  assert_eq!(report.postgres, Some(StoreStatus::Created));
  assert_eq!(report.neo4j, Some(StoreStatus::Created));
  assert_eq!(report.mongo, None);
  assert_eq!(
    report.saga,
    SagaState::PartiallyCommitted { failed_stores: vec![StoreKind::Mongo] }
  );
  assert_eq!(report.errors.len(), 1);
  assert_eq!(report.errors[0].store, StoreKind::Mongo);

  let bee = RecordKey::Subject(id_of(&report));
  assert!(f.stores.relational.get(&bee).await.unwrap().is_some());
  assert!(f.stores.graph.get_node(&label::SUBJECT, "Bee").await.unwrap().is_some());
}

// ─── Graph mirror failure ────────────────────────────────────────────────────

#[tokio::test]
async fn graph_failure_rolls_the_create_back() {
  let f = fixture().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);

  f.stores.graph.fail_once();
  let report = f.orchestrator.create(subject("Bee", animal, &[])).await.unwrap();
  assert!(!report.success);
  assert_eq!(report.saga, SagaState::RolledBack);
  assert_eq!(report.postgres, Some(StoreStatus::Reverted));
  assert_eq!(report.neo4j, None);
  assert_eq!(report.mongo, None);
  assert_eq!(report.errors[0].store, StoreKind::Neo4j);
  assert!(report.warnings.is_empty());

  let bee = RecordKey::Subject(id_of(&report));
  assert!(f.stores.relational.get(&bee).await.unwrap().is_none());
  assert!(f.stores.graph.get_node(&label::SUBJECT, "Bee").await.unwrap().is_none());
  assert!(f.stores.document.get("subjects", &bee.to_string()).await.unwrap().is_none());
}

#[tokio::test]
async fn failed_graph_cleanup_is_reported() {
  let f = fixture().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);

  f.stores.graph.fail_always();
  let report = f.orchestrator.create(subject("Bee", animal, &[])).await.unwrap();
  assert_eq!(
    report.saga,
    SagaState::PartiallyCommitted { failed_stores: vec![StoreKind::Neo4j] }
  );
  assert_eq!(report.postgres, Some(StoreStatus::Reverted));
  assert_eq!(report.warnings.len(), 1);
  assert!(report.warnings[0].starts_with("compensation failure in neo4j"));
}

#[tokio::test]
async fn graph_failure_restores_the_previous_values() {
  let f = fixture().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);
  let bee = id_of(&f.commit(subject("Bee", animal, &[])).await);

  f.stores.graph.fail_once();
  let patch = RecordPatch::Subject(SubjectPatch {
    name: Some("Wasp".into()),
    ..Default::default()
  });
  let report = f.orchestrator.update(&RecordKey::Subject(bee), patch).await.unwrap();
  assert_eq!(report.saga, SagaState::RolledBack);

  let Some(Record::Subject(restored)) =
    f.stores.relational.get(&RecordKey::Subject(bee)).await.unwrap()
  else {
    panic!("subject missing after compensation");
  };
  assert_eq!(restored.name, "Bee");
  assert_eq!(restored.code, "SUB-ANI-001");

  let graph = &f.stores.graph;
  assert!(graph.get_node(&label::SUBJECT, "Bee").await.unwrap().is_some());
  assert!(graph.get_node(&label::SUBJECT, "Wasp").await.unwrap().is_none());
}

#[tokio::test]
async fn graph_failure_restores_the_whole_subtree() {
  let f = fixture().await;
  let life = id_of(&f.commit(root_subject("Life", None)).await);
  let animal = id_of(&f.commit(root_subject("Animal", Some(life))).await);
  let insect = id_of(&f.commit(root_subject("Insect", Some(animal))).await);

  f.stores.graph.fail_once();
  let patch = RecordPatch::RootSubject(RootSubjectPatch {
    parent_id: Some(None),
    ..Default::default()
  });
  let report = f.orchestrator.update(&RecordKey::RootSubject(animal), patch).await.unwrap();
  assert_eq!(report.saga, SagaState::RolledBack);

  let rel = &f.stores.relational;
  for (id, parent, level) in [(animal, Some(life), 1), (insect, Some(animal), 2)] {
    let Some(Record::RootSubject(row)) = rel.get(&RecordKey::RootSubject(id)).await.unwrap()
    else {
      panic!("root subject {id} missing after compensation");
    };
    assert_eq!((row.parent_id, row.level), (parent, level));
  }

  let insect_node = f.stores.graph.get_node(&label::ROOT_SUBJECT, "Insect").await.unwrap().unwrap();
  assert_eq!(insect_node.props["level"], 2);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_and_update_of_one_triple_leave_the_stores_agreeing() {
  let f = fixture().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);
  let bee = id_of(&f.commit(subject("Bee", animal, &[])).await);
  let wasp = id_of(&f.commit(subject("Wasp", animal, &[])).await);
  let eats = id_of(&f.commit(relationship("eats", "trophic")).await);
  let t = id_of(&f.commit(triple(wasp, eats, bee, None, 0.5)).await);

  let patch = RecordPatch::Triple(TriplePatch {
    confidence_score: Some(Some(ConfidenceScore::new(0.3).unwrap())),
    ..Default::default()
  });
  let key = RecordKey::Triple(t);
  let (upserted, updated) = tokio::join!(
    f.orchestrator.create(triple(wasp, eats, bee, None, 0.9)),
    f.orchestrator.update(&key, patch),
  );
  assert!(upserted.unwrap().success);
  assert!(updated.unwrap().success);

  let Some(Record::Triple(row)) = f.stores.relational.get(&key).await.unwrap() else {
    panic!("triple missing");
  };
  let confidence = json!(row.confidence_score.map(f64::from));

  let edges = f.stores.graph.edges(&Ident::new("TRP_EATS").unwrap()).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].props["confidence"], confidence);

  let doc = f
    .stores
    .document
    .get("subject_relationship_object", &t.to_string())
    .await
    .unwrap()
    .expect("triple document");
  assert_eq!(doc.body["confidence_score"], confidence);
}

// ─── Deletes ─────────────────────────────────────────────────────────────────

/// `Animal` with `Bee` and `Wasp`, and the triple `Bee eats Wasp`.
async fn small_web(f: &Fixture) -> (i64, i64, i64) {
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);
  let bee = id_of(&f.commit(subject("Bee", animal, &[])).await);
  let wasp = id_of(&f.commit(subject("Wasp", animal, &[])).await);
  let eats = id_of(&f.commit(relationship("eats", "trophic")).await);
  let t = id_of(&f.commit(triple(wasp, eats, bee, None, 0.8)).await);
  (animal, bee, t)
}

#[tokio::test]
async fn delete_cascades_through_every_store() {
  let f = fixture().await;
  let (animal, bee, t) = small_web(&f).await;

  let report = f.orchestrator.delete(&RecordKey::RootSubject(animal)).await.unwrap();
  assert!(report.success);
  assert_eq!(report.action, Action::Deleted);
  for store in [StoreKind::Postgres, StoreKind::Neo4j, StoreKind::Mongo] {
    assert_eq!(report.status(store), Some(StoreStatus::Deleted));
  }
  assert_eq!(field(&report, "records").as_array().map(Vec::len), Some(4));

  let rel = &f.stores.relational;
  assert!(rel.get(&RecordKey::Subject(bee)).await.unwrap().is_none());
  assert!(rel.get(&RecordKey::Triple(t)).await.unwrap().is_none());

  let graph = &f.stores.graph;
  assert!(graph.get_node(&label::ROOT_SUBJECT, "Animal").await.unwrap().is_none());
  assert!(graph.get_node(&label::SUBJECT, "Bee").await.unwrap().is_none());
  let edge_type = Ident::new("TRP_EATS").unwrap();
  assert!(graph.edges(&edge_type).await.unwrap().is_empty());

  let docs = &f.stores.document;
  assert!(docs.get("subjects", &bee.to_string()).await.unwrap().is_none());
  assert!(docs.get("subject_relationship_object", &t.to_string()).await.unwrap().is_none());

  let err = f.orchestrator.get(&RecordKey::Subject(bee)).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  let err = f.orchestrator.delete(&RecordKey::RootSubject(animal)).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn graph_failure_undoes_the_delete() {
  let f = fixture().await;
  let (animal, bee, t) = small_web(&f).await;

  f.stores.graph.fail_once();
  let report = f.orchestrator.delete(&RecordKey::RootSubject(animal)).await.unwrap();
  assert_eq!(report.saga, SagaState::RolledBack);
  assert_eq!(report.postgres, Some(StoreStatus::Reverted));
  assert_eq!(report.mongo, None);

  let rel = &f.stores.relational;
  assert!(rel.get(&RecordKey::Subject(bee)).await.unwrap().is_some());
  assert!(rel.get(&RecordKey::Triple(t)).await.unwrap().is_some());

  let edge_type = Ident::new("TRP_EATS").unwrap();
  assert_eq!(f.stores.graph.edges(&edge_type).await.unwrap().len(), 1);
  assert_eq!(f.stores.graph.edges(&label::HAS_SUBJECT).await.unwrap().len(), 2);
  assert!(f.stores.document.get("subjects", &bee.to_string()).await.unwrap().is_some());
}

#[tokio::test]
async fn document_failure_on_delete_is_partial() {
  let f = fixture().await;
  let (_, bee, _) = small_web(&f).await;

  f.stores.document.fail_always();
  let report = f.orchestrator.delete(&RecordKey::Subject(bee)).await.unwrap();
  assert_eq!(report.neo4j, Some(StoreStatus::Deleted));
  assert_eq!(
    report.saga,
    SagaState::PartiallyCommitted { failed_stores: vec![StoreKind::Mongo] }
  );

  f.stores.document.heal();
  // The stale document is still there for a later repair.
  assert!(f.stores.document.get("subjects", &bee.to_string()).await.unwrap().is_some());
}

// ─── Synced reads ────────────────────────────────────────────────────────────

#[tokio::test]
async fn synced_get_shows_each_copy() {
  let f = fixture().await;
  let (_, bee, t) = small_web(&f).await;

  let subject = f.orchestrator.get(&RecordKey::Subject(bee)).await.unwrap();
  assert_eq!(subject.present_in, [StoreKind::Postgres, StoreKind::Neo4j, StoreKind::Mongo]);
  assert_eq!(subject.neo4j.unwrap()["name"], "Bee");
  assert_eq!(subject.mongo.unwrap()["body"]["name"], "Bee");

  let edge = f.orchestrator.get(&RecordKey::Triple(t)).await.unwrap();
  let edge_view = edge.neo4j.expect("triple edge");
  assert_eq!(edge_view["from"], "Wasp");
  assert_eq!(edge_view["to"], "Bee");

  f.stores.graph.fail_always();
  let degraded = f.orchestrator.get(&RecordKey::Subject(bee)).await.unwrap();
  assert_eq!(degraded.present_in, [StoreKind::Postgres, StoreKind::Mongo]);
  assert_eq!(degraded.errors[0].store, StoreKind::Neo4j);
}
