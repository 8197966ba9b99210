use serde_json::json;
use tristore_core::{
  ErrorKind,
  store::{QueryType, TripleQuery},
};

use super::*;
use crate::StoreKind;

fn query(subject: &str, relationship: &str, object: &str) -> TripleQuery {
  TripleQuery {
    subject:      subject.into(),
    relationship: relationship.into(),
    object:       object.into(),
  }
}

/// Bee (Animal) eats Flower (Plant), recorded on diagram `d-1`.
async fn bee_eats_flower(f: &Fixture) {
  f.food_web_diagram().await;
  let animal = id_of(&f.commit(root_subject("Animal", None)).await);
  let plant = id_of(&f.commit(root_subject("Plant", None)).await);
  let bee = id_of(&f.commit(subject("Bee", animal, &["Food webs"])).await);
  let flower = id_of(&f.commit(subject("Flower", plant, &[])).await);
  let eats = id_of(&f.commit(relationship("eats", "trophic")).await);
  f.commit(triple(bee, eats, flower, Some("d-1"), 0.9)).await;
}

#[tokio::test]
async fn search_merges_all_three_stores() {
  let f = fixture().await;
  bee_eats_flower(&f).await;
  let fields = json!({ "caption": "who eats whom" });
  f.engine
    .annotate("d-1", fields.as_object().cloned().unwrap())
    .await
    .unwrap();

  let found = f.engine.search(query("bee", "eats", "flower")).await;
  assert!(found.errors.is_empty(), "{:?}", found.errors);
  assert!(found.warnings.is_empty());

  assert_eq!(found.postgres.len(), 1);
  assert_eq!(found.postgres[0].category_name, "Food webs");
  assert!((found.postgres[0].relevance_score - 0.95).abs() < 1e-9);

  assert_eq!(found.neo4j.len(), 1);
  let edge = &found.neo4j[0];
  assert_eq!((edge.subject.as_str(), edge.object.as_str()), ("Bee", "Flower"));
  assert_eq!(edge.relationship_code.as_deref(), Some("TRP-EATS"));
  assert_eq!(edge.confidence, Some(0.9));
  assert_eq!(edge.diagram_id.as_deref(), Some("d-1"));

  assert_eq!(found.mongo.len(), 1);
  assert_eq!(found.mongo[0].body["caption"], "who eats whom");

  assert_eq!(found.inferred_category, None);
  assert_eq!(found.diagrams.len(), 1);
  assert_eq!(found.diagrams[0].diagram_id, "d-1");
  assert_eq!(found.diagrams[0].sources, [StoreKind::Postgres, StoreKind::Neo4j]);
  assert!(found.diagrams[0].diagram.is_some());
  assert_eq!(found.diagrams[0].confidence, Some(0.9));
}

#[tokio::test]
async fn unmatched_queries_fall_back_to_keyword_rules() {
  let f = fixture().await;
  f.commit(root_category("eco", "Ecology")).await;
  let food_webs = id_of(&f.commit(category("foodChainsWebs", "eco")).await);
  f.commit(diagram("d-7", food_webs)).await;
  let insects = id_of(&f.commit(root_subject("Insects", None)).await);
  let plants = id_of(&f.commit(root_subject("Plants", None)).await);
  f.commit(subject("Bee", insects, &[])).await;
  f.commit(subject("Rose", plants, &[])).await;

  let found = f.engine.search(query("bee", "pollinates", "rose")).await;
  assert!(found.postgres.is_empty());
  assert!(found.neo4j.is_empty());
  assert_eq!(found.inferred_category.as_deref(), Some("foodChainsWebs"));
  assert_eq!(found.diagrams.len(), 1);
  assert_eq!(found.diagrams[0].diagram_id, "d-7");
  assert_eq!(found.diagrams[0].sources, [StoreKind::Postgres]);

  let nothing = f.engine.search(query("rose", "pollinates", "bee")).await;
  assert_eq!(nothing.inferred_category, None);
  assert!(nothing.diagrams.is_empty());
}

#[tokio::test]
async fn keyword_rules_need_both_ends_known() {
  let f = fixture().await;
  f.commit(root_category("geo", "Geology")).await;
  let earth_parts = id_of(&f.commit(category("partsOfTheEarth", "geo")).await);
  f.commit(diagram("d-9", earth_parts)).await;
  let earth = id_of(&f.commit(root_subject("Earth", None)).await);
  f.commit(subject("Volcano", earth, &[])).await;
  f.commit(subject("Crust", earth, &[])).await;

  let one_sided = f.engine.search(query("volcano", "erupts", "unicorn")).await;
  assert_eq!(one_sided.inferred_category, None);
  assert!(one_sided.diagrams.is_empty());

  let both = f.engine.search(query("volcano", "breaks", "crust")).await;
  assert_eq!(both.inferred_category.as_deref(), Some("partsOfTheEarth"));
  assert_eq!(both.diagrams[0].diagram_id, "d-9");
}

#[tokio::test]
async fn failing_graph_degrades_to_partial_results() {
  let f = fixture().await;
  bee_eats_flower(&f).await;

  f.stores.graph.fail_always();
  let found = f.engine.search(query("bee", "eats", "flower")).await;
  assert_eq!(found.errors.len(), 1);
  assert_eq!(found.errors[0].store, StoreKind::Neo4j);
  assert!(found.neo4j.is_empty());
  assert_eq!(found.postgres.len(), 1);
  assert_eq!(found.diagrams[0].sources, [StoreKind::Postgres]);
}

#[tokio::test]
async fn log_failures_are_warnings() {
  let f = fixture().await;
  bee_eats_flower(&f).await;

  f.stores.document.fail_always();
  let found = f.engine.search(query("bee", "eats", "flower")).await;
  assert_eq!(found.neo4j.len(), 1);
  assert_eq!(found.warnings.len(), 1);
  assert!(found.warnings[0].starts_with("query log not recorded"));
  // The annotation read failed too.
  assert_eq!(found.errors[0].store, StoreKind::Mongo);
}

#[tokio::test]
async fn subjects_infer_their_category() {
  let f = fixture().await;
  bee_eats_flower(&f).await;

  let inferred = f.engine.infer_from_subjects(vec!["BEE".into(), "nobody".into()]).await;
  assert!(inferred.errors.is_empty());
  assert_eq!(inferred.categories.len(), 1);
  assert_eq!(inferred.categories[0].category, "Food webs");
  assert_eq!(inferred.categories[0].match_count, 1);
  assert_eq!(inferred.inferred_category.as_deref(), Some("Food webs"));
  assert_eq!(inferred.diagrams.len(), 1);
  assert_eq!(inferred.diagrams[0].id, "d-1");
}

#[tokio::test]
async fn every_query_is_logged() {
  let f = fixture().await;
  bee_eats_flower(&f).await;

  f.engine.search(query("bee", "eats", "flower")).await;
  f.engine.infer_from_subjects(vec!["Bee".into()]).await;

  let logs = f.engine.query_logs(10).await.unwrap();
  assert_eq!(logs.len(), 2);
  assert_eq!(logs[0].query_type, QueryType::Inference);
  assert_eq!(logs[0].input, json!(["Bee"]));
  assert_eq!(logs[1].query_type, QueryType::Triple);
  assert_eq!(logs[1].input["subject"], "bee");
  assert_eq!(logs[1].triples.len(), 1);
}

#[tokio::test]
async fn annotations_require_a_diagram() {
  let f = fixture().await;
  let err = f.engine.annotate("d-404", Default::default()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn semantic_relationships_are_listed_per_diagram() {
  let f = fixture().await;
  f.food_web_diagram().await;

  let batch = |diagram: &str| {
    json!({
      "diagram_id": diagram,
      "category": "Food webs",
      "extracted_relationships": [{ "subject": "Bee", "relationship": "eats", "object": "Flower" }],
    })
    .as_object()
    .cloned()
    .unwrap()
  };
  let first = f.engine.record_semantic_relationships(batch("d-1")).await.unwrap();
  assert_eq!(first.body["processing_model"], "BERT+Visual");
  let mut second = batch("d-1");
  second.insert("processing_model".into(), json!("manual"));
  f.engine.record_semantic_relationships(second).await.unwrap();

  let listed = f.engine.semantic_relationships_for("d-1").await.unwrap();
  assert_eq!(listed.len(), 2);
  assert!(f.engine.semantic_relationships_for("d-2").await.unwrap().is_empty());

  let fetched = f.engine.semantic_relationships(&first.sync_id).await.unwrap().unwrap();
  assert_eq!(fetched.body["extracted_relationships"][0]["object"], "Flower");

  let err = f.engine.record_semantic_relationships(batch("d-404")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  let mut untyped = batch("d-1");
  untyped.remove("category");
  let err = f.engine.record_semantic_relationships(untyped).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Validation);
}
