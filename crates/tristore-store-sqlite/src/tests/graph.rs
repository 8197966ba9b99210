use serde_json::{Map, Value, json};
use tristore_core::{
  ErrorKind, StoreError as _,
  ident::Ident,
  label,
  store::{GraphStore, HierarchyLink, NodeRef, TripleQuery},
};

use crate::SqliteGraphStore;

async fn store() -> SqliteGraphStore {
  SqliteGraphStore::open_in_memory()
    .await
    .expect("in-memory graph")
}

fn props(value: Value) -> Map<String, Value> {
  value.as_object().cloned().expect("object literal")
}

fn by_code(label: Ident, code: &str) -> NodeRef {
  NodeRef { label, code: Some(code.into()), entity_id: None, name: None }
}

async fn seed_subjects(g: &SqliteGraphStore) {
  g.merge_node(
    &label::SUBJECT,
    "Lion",
    props(json!({ "code": "SUB-ANI-001", "entity_id": "1", "synonyms": ["Panthera leo"] })),
  )
  .await
  .unwrap();
  g.merge_node(
    &label::SUBJECT,
    "Zebra",
    props(json!({ "code": "SUB-ANI-002", "entity_id": "2", "synonyms": [] })),
  )
  .await
  .unwrap();
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_node_merges_properties() {
  let g = store().await;
  g.merge_node(&label::SUBJECT, "Lion", props(json!({ "code": "SUB-ANI-001" })))
    .await
    .unwrap();
  let node = g
    .merge_node(&label::SUBJECT, "Lion", props(json!({ "description": "big cat" })))
    .await
    .unwrap();
  assert_eq!(node.props.get("code"), Some(&json!("SUB-ANI-001")));
  assert_eq!(node.props.get("description"), Some(&json!("big cat")));

  let fetched = g.get_node(&label::SUBJECT, "Lion").await.unwrap().unwrap();
  assert_eq!(fetched, node);
  assert!(g.get_node(&label::CATEGORY, "Lion").await.unwrap().is_none());
}

#[tokio::test]
async fn rename_keeps_edges() {
  let g = store().await;
  g.merge_node(&label::ROOT_SUBJECT, "Animals", Map::new()).await.unwrap();
  g.merge_node(&label::SUBJECT, "Lion", Map::new()).await.unwrap();
  let link = HierarchyLink {
    parent_label: label::ROOT_SUBJECT,
    parent_name:  "Animals".into(),
    child_label:  label::SUBJECT,
    child_name:   "Lion".into(),
    edge_type:    label::HAS_SUBJECT,
    exclusive:    true,
  };
  assert!(g.link_hierarchy(&link).await.unwrap());

  assert!(g.rename_node(&label::SUBJECT, "Lion", "African lion").await.unwrap());
  assert!(!g.rename_node(&label::SUBJECT, "Lion", "Cat").await.unwrap());

  let edges = g.edges(&label::HAS_SUBJECT).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].to, "African lion");
}

#[tokio::test]
async fn rename_onto_a_taken_name_conflicts() {
  let g = store().await;
  g.merge_node(&label::SUBJECT, "Lion", Map::new()).await.unwrap();
  g.merge_node(&label::SUBJECT, "Tiger", Map::new()).await.unwrap();

  let err = g.rename_node(&label::SUBJECT, "Lion", "Tiger").await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert!(g.get_node(&label::SUBJECT, "Lion").await.unwrap().is_some());
}

#[tokio::test]
async fn deleting_a_node_drops_its_edges() {
  let g = store().await;
  seed_subjects(&g).await;
  let eats = Ident::for_relationship_code("TRP-EATS").unwrap();
  g.create_edge(
    &by_code(label::SUBJECT, "SUB-ANI-001"),
    &by_code(label::SUBJECT, "SUB-ANI-002"),
    &eats,
    props(json!({ "triple_id": 1 })),
  )
  .await
  .unwrap();

  assert!(g.delete_node(&label::SUBJECT, "Zebra").await.unwrap());
  assert!(!g.delete_node(&label::SUBJECT, "Zebra").await.unwrap());
  assert!(g.edges(&eats).await.unwrap().is_empty());
}

// ─── Hierarchy ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn exclusive_links_replace_the_previous_parent() {
  let g = store().await;
  for name in ["Animals", "Mammals", "Cats"] {
    g.merge_node(&label::ROOT_SUBJECT, name, Map::new()).await.unwrap();
  }
  let link = |parent: &str| HierarchyLink {
    parent_label: label::ROOT_SUBJECT,
    parent_name:  parent.into(),
    child_label:  label::ROOT_SUBJECT,
    child_name:   "Cats".into(),
    edge_type:    label::HAS_CHILD,
    exclusive:    true,
  };

  assert!(g.link_hierarchy(&link("Animals")).await.unwrap());
  assert!(g.link_hierarchy(&link("Mammals")).await.unwrap());
  assert!(g.link_hierarchy(&link("Mammals")).await.unwrap());

  let edges = g.edges(&label::HAS_CHILD).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].from, "Mammals");

  assert!(!g.link_hierarchy(&link("Plants")).await.unwrap());

  assert_eq!(g.detach(&label::ROOT_SUBJECT, "Cats", &label::HAS_CHILD).await.unwrap(), 1);
  assert!(g.edges(&label::HAS_CHILD).await.unwrap().is_empty());
}

#[tokio::test]
async fn memberships_point_at_existing_targets_only() {
  let g = store().await;
  seed_subjects(&g).await;
  for name in ["Savanna", "Predators"] {
    g.merge_node(&label::CATEGORY, name, Map::new()).await.unwrap();
  }

  let targets = vec!["Savanna".to_owned(), "Predators".to_owned(), "Unknown".to_owned()];
  let linked = g
    .set_memberships(&label::SUBJECT, "Lion", &label::IN_CATEGORY, &label::CATEGORY, &targets)
    .await
    .unwrap();
  assert_eq!(linked, 2);

  let linked = g
    .set_memberships(
      &label::SUBJECT,
      "Lion",
      &label::IN_CATEGORY,
      &label::CATEGORY,
      &["Savanna".to_owned()],
    )
    .await
    .unwrap();
  assert_eq!(linked, 1);
  let edges = g.edges(&label::IN_CATEGORY).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].to, "Savanna");
}

// ─── Triple edges ────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_create_edge_keeps_one_edge() {
  let g = store().await;
  seed_subjects(&g).await;
  let eats = Ident::for_relationship_code("TRP-EATS").unwrap();
  let lion = by_code(label::SUBJECT, "SUB-ANI-001");
  let zebra = by_code(label::SUBJECT, "SUB-ANI-002");

  g.create_edge(&lion, &zebra, &eats, props(json!({ "triple_id": 1, "confidence": 0.2 })))
    .await
    .unwrap()
    .unwrap();
  let edge = g
    .create_edge(&lion, &zebra, &eats, props(json!({ "triple_id": 1, "confidence": 0.7 })))
    .await
    .unwrap()
    .unwrap();
  assert_eq!((edge.from.as_str(), edge.to.as_str()), ("Lion", "Zebra"));

  let edges = g.edges(&eats).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].props.get("confidence"), Some(&json!(0.7)));
}

#[tokio::test]
async fn endpoints_resolve_by_entity_id_then_name() {
  let g = store().await;
  seed_subjects(&g).await;
  let eats = Ident::for_relationship_code("TRP-EATS").unwrap();
  let lion = NodeRef {
    label:     label::SUBJECT,
    code:      Some("SUB-XXX-999".into()),
    entity_id: Some("1".into()),
    name:      None,
  };
  let zebra = NodeRef {
    label:     label::SUBJECT,
    code:      None,
    entity_id: None,
    name:      Some("Zebra".into()),
  };
  let edge = g.create_edge(&lion, &zebra, &eats, Map::new()).await.unwrap();
  assert!(edge.is_some());

  let ghost = by_code(label::SUBJECT, "SUB-ANI-404");
  assert!(g.create_edge(&lion, &ghost, &eats, Map::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn edges_are_deleted_by_property() {
  let g = store().await;
  seed_subjects(&g).await;
  let eats = Ident::for_relationship_code("TRP-EATS").unwrap();
  let lion = by_code(label::SUBJECT, "SUB-ANI-001");
  let zebra = by_code(label::SUBJECT, "SUB-ANI-002");
  g.create_edge(&lion, &zebra, &eats, props(json!({ "triple_id": 7 })))
    .await
    .unwrap();
  g.create_edge(&zebra, &lion, &eats, props(json!({ "triple_id": 8 })))
    .await
    .unwrap();

  let removed = g.delete_edges_where(&label::TRIPLE_ID, &json!(7)).await.unwrap();
  assert_eq!(removed, 1);
  let left = g.edges(&eats).await.unwrap();
  assert_eq!(left.len(), 1);
  assert_eq!(left[0].from, "Zebra");
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn triple_search_orders_by_confidence() {
  let g = store().await;
  seed_subjects(&g).await;
  g.merge_node(&label::SUBJECT, "Grass", props(json!({ "code": "SUB-PLA-001" })))
    .await
    .unwrap();
  let eats = Ident::for_relationship_code("TRP-EATS").unwrap();
  let lion = by_code(label::SUBJECT, "SUB-ANI-001");
  let zebra = by_code(label::SUBJECT, "SUB-ANI-002");
  let grass = by_code(label::SUBJECT, "SUB-PLA-001");

  g.create_edge(
    &lion,
    &zebra,
    &eats,
    props(json!({
      "triple_id": 1, "name": "eats", "relationship_code": "TRP-EATS",
      "confidence": 0.6, "code": "SUB-ANI-001_TRP-EATS_SUB-ANI-002"
    })),
  )
  .await
  .unwrap();
  g.create_edge(
    &zebra,
    &grass,
    &eats,
    props(json!({ "triple_id": 2, "name": "eats", "confidence": 0.9, "diagram_id": "d-1" })),
  )
  .await
  .unwrap();
  // Hierarchy edges carry no triple marker and never match.
  g.merge_node(&label::ROOT_SUBJECT, "Animals", Map::new()).await.unwrap();

  let all = g
    .search_by_triple(&TripleQuery { relationship: "EAT".into(), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[0].subject, "Zebra");
  assert_eq!(all[0].diagram_id.as_deref(), Some("d-1"));
  assert_eq!(all[1].triple_code.as_deref(), Some("SUB-ANI-001_TRP-EATS_SUB-ANI-002"));

  let lion_only = g
    .search_by_triple(&TripleQuery {
      subject:      "lio".into(),
      relationship: "".into(),
      object:       "zeb".into(),
    })
    .await
    .unwrap();
  assert_eq!(lion_only.len(), 1);
  assert_eq!(lion_only[0].relationship, "eats");
  assert_eq!(lion_only[0].confidence, Some(0.6));
}

#[tokio::test]
async fn categories_are_inferred_from_names_and_synonyms() {
  let g = store().await;
  seed_subjects(&g).await;
  for name in ["Savanna", "Predators"] {
    g.merge_node(&label::CATEGORY, name, Map::new()).await.unwrap();
  }
  g.set_memberships(
    &label::SUBJECT,
    "Lion",
    &label::IN_CATEGORY,
    &label::CATEGORY,
    &["Savanna".to_owned(), "Predators".to_owned()],
  )
  .await
  .unwrap();
  g.set_memberships(
    &label::SUBJECT,
    "Zebra",
    &label::IN_CATEGORY,
    &label::CATEGORY,
    &["Savanna".to_owned()],
  )
  .await
  .unwrap();

  let inferred = g
    .infer_categories(&["panthera LEO".to_owned(), "zebra".to_owned()])
    .await
    .unwrap();
  assert_eq!(inferred.len(), 2);
  assert_eq!((inferred[0].category.as_str(), inferred[0].match_count), ("Savanna", 2));
  assert_eq!((inferred[1].category.as_str(), inferred[1].match_count), ("Predators", 1));

  assert!(g.infer_categories(&["okapi".to_owned()]).await.unwrap().is_empty());
}
