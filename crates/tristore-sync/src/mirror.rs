//! How relational records are projected into the two mirrors.
//!
//! A [`Projection`] is computed from the relational store alone (parent
//! names, endpoint codes, relationship codes) and then applied to the graph
//! with [`apply`]. Document fields are simply the serialized record.

use serde_json::{Map, Value};
use tristore_core::{
  entity::{EntityKind, RootSubject, Triple},
  ident::Ident,
  label,
  record::{Record, RecordKey},
  store::{DocumentStore, GraphStore, HierarchyLink, NodeRef, RelationalStore},
};

use crate::{Result, SyncError, saga::StoreKind};

/// Document collection holding per-diagram annotations.
pub const ANNOTATIONS: &str = "diagram_annotations";

/// Document collection holding relationships extracted from diagrams.
pub const SEMANTIC_RELATIONSHIPS: &str = "semantic_relationships";

/// Recorded when a semantic-relationship document does not name its model.
pub const DEFAULT_PROCESSING_MODEL: &str = "BERT+Visual";

/// Node property carrying the relational key.
pub const ENTITY_ID: &str = "entity_id";

// ─── Projection ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Parent {
  Link(HierarchyLink),
  /// The record has no parent; drop any stale hierarchy edge into it.
  Detach { label: Ident, name: String, edge_type: Ident },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeProjection {
  pub label:       Ident,
  pub name:        String,
  /// The node's name before this write, when it changed.
  pub rename_from: Option<String>,
  pub props:       Map<String, Value>,
  pub parent:      Option<Parent>,
  /// Category names for `IN_CATEGORY`, replacing the current set.
  pub memberships: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeProjection {
  pub triple_id: i64,
  pub from:      NodeRef,
  pub to:        NodeRef,
  pub edge_type: Ident,
  pub props:     Map<String, Value>,
}

/// What the graph must look like for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
  Node(NodeProjection),
  Edge(EdgeProjection),
}

/// Node properties: the record minus its name, plus [`ENTITY_ID`].
pub fn node_props(record: &Record) -> Map<String, Value> {
  let mut props = document_fields(record);
  props.remove("id");
  props.remove("name");
  // Graph properties are scalars or lists.
  props.remove("metadata");
  props.insert(ENTITY_ID.to_owned(), Value::String(record.key().to_string()));
  props
}

pub fn document_fields(record: &Record) -> Map<String, Value> {
  match serde_json::to_value(record) {
    Ok(Value::Object(fields)) => fields,
    _ => Map::new(),
  }
}

/// The document key a record is mirrored under.
pub fn sync_id(record: &Record) -> String { record.key().to_string() }

// ─── Planning ────────────────────────────────────────────────────────────────

async fn fetch<R: RelationalStore>(rel: &R, key: RecordKey) -> Result<Record> {
  rel
    .get(&key)
    .await
    .map_err(|e| SyncError::store(StoreKind::Postgres, e))?
    .ok_or_else(|| key.not_found().into())
}

async fn parent_name<R: RelationalStore>(
  rel: &R,
  key: Option<RecordKey>,
) -> Result<Option<String>> {
  match key {
    Some(key) => Ok(Some(fetch(rel, key).await?.name().to_owned())),
    None => Ok(None),
  }
}

fn hierarchy(
  parent_label: Ident,
  parent_name: Option<String>,
  child_label: &Ident,
  child_name: &str,
  edge_type: Ident,
) -> Parent {
  match parent_name {
    Some(parent_name) => Parent::Link(HierarchyLink {
      parent_label,
      parent_name,
      child_label: child_label.clone(),
      child_name: child_name.to_owned(),
      edge_type,
      exclusive: true,
    }),
    None => Parent::Detach {
      label: child_label.clone(),
      name: child_name.to_owned(),
      edge_type,
    },
  }
}

async fn plan_edge<R: RelationalStore>(rel: &R, triple: &Triple) -> Result<EdgeProjection> {
  let subject = fetch(rel, RecordKey::Subject(triple.subject_id)).await?;
  let object = fetch(rel, RecordKey::Subject(triple.object_id)).await?;
  let relationship_key = RecordKey::Relationship(triple.relationship_id);
  let Record::Relationship(relationship) = fetch(rel, relationship_key.clone()).await? else {
    return Err(relationship_key.not_found().into());
  };

  let mut props = Map::new();
  props.insert("code".into(), triple.code.clone().into());
  props.insert("relationship_code".into(), relationship.code.clone().into());
  props.insert("name".into(), relationship.name.clone().into());
  props.insert("confidence".into(), triple.confidence_score.map(f64::from).into());
  props.insert("context".into(), triple.context.clone().into());
  props.insert("diagram_id".into(), triple.diagram_id.clone().into());
  props.insert(label::TRIPLE_ID.to_string(), triple.id.into());

  Ok(EdgeProjection {
    triple_id: triple.id,
    from: NodeRef::for_record(label::SUBJECT, &subject),
    to: NodeRef::for_record(label::SUBJECT, &object),
    edge_type: Ident::for_relationship_code(&relationship.code)?,
    props,
  })
}

/// Build the graph projection of `record`. `previous` is the same record
/// as it stood before the write, if it existed.
pub async fn plan<R: RelationalStore>(
  rel: &R,
  record: &Record,
  previous: Option<&Record>,
) -> Result<Projection> {
  if let Record::Triple(triple) = record {
    return plan_edge(rel, triple).await.map(Projection::Edge);
  }
  let Some(node_label) = label::for_kind(record.kind()) else {
    return Err(SyncError::GraphDrift(format!("{} has no node label", record.kind())));
  };

  let name = record.name();
  let parent = match record {
    Record::Category(e) => {
      let key = RecordKey::RootCategory(e.root_category_id.clone());
      let root = parent_name(rel, Some(key)).await?;
      Some(hierarchy(label::ROOT_CATEGORY, root, &node_label, name, label::HAS_CATEGORY))
    }
    Record::RootSubject(e) => {
      let up = parent_name(rel, e.parent_id.map(RecordKey::RootSubject)).await?;
      Some(hierarchy(label::ROOT_SUBJECT, up, &node_label, name, label::HAS_CHILD))
    }
    Record::Subject(e) => {
      let root = parent_name(rel, Some(RecordKey::RootSubject(e.root_subject_id))).await?;
      Some(hierarchy(label::ROOT_SUBJECT, root, &node_label, name, label::HAS_SUBJECT))
    }
    Record::Diagram(e) => {
      let category = parent_name(rel, e.category_id.map(RecordKey::Category)).await?;
      Some(hierarchy(label::CATEGORY, category, &node_label, name, label::HAS_DIAGRAM))
    }
    _ => None,
  };
  let memberships = match record {
    Record::Subject(e) => Some(e.categories.iter().cloned().collect()),
    _ => None,
  };

  Ok(Projection::Node(NodeProjection {
    label: node_label,
    name: name.to_owned(),
    rename_from: previous
      .map(Record::name)
      .filter(|old| *old != name)
      .map(str::to_owned),
    props: node_props(record),
    parent,
    memberships,
  }))
}

// ─── Dependents ──────────────────────────────────────────────────────────────

fn relational_err<E: tristore_core::StoreError>(e: E) -> SyncError {
  SyncError::store(StoreKind::Postgres, e)
}

/// Root subjects strictly below `id`, shallowest first.
pub async fn descendants<R: RelationalStore>(rel: &R, id: i64) -> Result<Vec<Record>> {
  let roots: Vec<RootSubject> = rel
    .list(EntityKind::RootSubject)
    .await
    .map_err(relational_err)?
    .into_iter()
    .filter_map(|r| match r {
      Record::RootSubject(rs) => Some(rs),
      _ => None,
    })
    .collect();

  let mut found = Vec::new();
  let mut frontier = vec![id];
  while !frontier.is_empty() {
    let layer: Vec<&RootSubject> = roots
      .iter()
      .filter(|rs| rs.parent_id.is_some_and(|p| frontier.contains(&p)))
      .collect();
    frontier = layer.iter().map(|rs| rs.id).collect();
    found.extend(layer.into_iter().cloned().map(Record::RootSubject));
  }
  Ok(found)
}

async fn triples_where<R: RelationalStore>(
  rel: &R,
  keep: impl Fn(&Triple) -> bool,
) -> Result<Vec<Record>> {
  Ok(
    rel
      .list(EntityKind::Triple)
      .await
      .map_err(relational_err)?
      .into_iter()
      .filter(|r| matches!(r, Record::Triple(t) if keep(t)))
      .collect(),
  )
}

/// Rows an update of `record` may rewrite or whose projection embeds it:
/// the triples of a subject or relationship, and the subtree and subjects
/// of a root subject.
pub async fn cascade<R: RelationalStore>(rel: &R, record: &Record) -> Result<Vec<Record>> {
  match record {
    Record::Subject(s) => {
      let id = s.id;
      triples_where(rel, |t| t.subject_id == id || t.object_id == id).await
    }
    Record::Relationship(r) => {
      let id = r.id;
      triples_where(rel, |t| t.relationship_id == id).await
    }
    Record::RootSubject(rs) => {
      let mut below = descendants(rel, rs.id).await?;
      let subjects = rel.list(EntityKind::Subject).await.map_err(relational_err)?;
      below.extend(
        subjects
          .into_iter()
          .filter(|r| matches!(r, Record::Subject(s) if s.root_subject_id == rs.id)),
      );
      Ok(below)
    }
    _ => Ok(Vec::new()),
  }
}

/// The part of [`cascade`] that must be re-projected after `previous`
/// became `record`. Empty unless a name, code or level changed.
pub async fn dependents<R: RelationalStore>(
  rel: &R,
  record: &Record,
  previous: Option<&Record>,
) -> Result<Vec<Record>> {
  let changed = match (record, previous) {
    (Record::Subject(now), Some(Record::Subject(was))) => {
      now.name != was.name || now.code != was.code
    }
    (Record::Relationship(now), Some(Record::Relationship(was))) => {
      now.name != was.name || now.code != was.code
    }
    (Record::RootSubject(now), Some(Record::RootSubject(was))) => {
      now.name != was.name || now.level != was.level
    }
    _ => false,
  };
  if changed { cascade(rel, record).await } else { Ok(Vec::new()) }
}

// ─── Graph writes ────────────────────────────────────────────────────────────

pub(crate) fn graph_err<E: tristore_core::StoreError>(e: E) -> SyncError {
  SyncError::store(StoreKind::Neo4j, e)
}

/// Write a projection. Returns notes about hierarchy edges that could not be
/// drawn because the other end is not mirrored.
pub async fn apply<G: GraphStore>(graph: &G, projection: &Projection) -> Result<Vec<String>> {
  let mut notes = Vec::new();
  match projection {
    Projection::Node(node) => {
      if let Some(old) = &node.rename_from {
        if graph.get_node(&node.label, &node.name).await.map_err(graph_err)?.is_some() {
          // The new name is already taken; fold into that node. The edges of
          // the dropped node come back when its triples are re-projected.
          graph.delete_node(&node.label, old).await.map_err(graph_err)?;
        } else {
          graph
            .rename_node(&node.label, old, &node.name)
            .await
            .map_err(graph_err)?;
        }
      }
      graph
        .merge_node(&node.label, &node.name, node.props.clone())
        .await
        .map_err(graph_err)?;

      match &node.parent {
        Some(Parent::Link(link)) => {
          if !graph.link_hierarchy(link).await.map_err(graph_err)? {
            tracing::warn!(
              parent = %link.parent_name,
              child = %link.child_name,
              edge_type = %link.edge_type,
              "hierarchy parent missing from graph mirror"
            );
            notes.push(format!(
              "{} {:?} is not in the graph mirror; {} edge skipped",
              link.parent_label, link.parent_name, link.edge_type
            ));
          }
        }
        Some(Parent::Detach { label, name, edge_type }) => {
          graph.detach(label, name, edge_type).await.map_err(graph_err)?;
        }
        None => {}
      }

      if let Some(categories) = &node.memberships {
        graph
          .set_memberships(
            &node.label,
            &node.name,
            &label::IN_CATEGORY,
            &label::CATEGORY,
            categories,
          )
          .await
          .map_err(graph_err)?;
      }
    }
    Projection::Edge(edge) => {
      // Drop the old edge first; its type follows the relationship code.
      graph
        .delete_edges_where(&label::TRIPLE_ID, &Value::from(edge.triple_id))
        .await
        .map_err(graph_err)?;
      let created = graph
        .create_edge(&edge.from, &edge.to, &edge.edge_type, edge.props.clone())
        .await
        .map_err(graph_err)?;
      if created.is_none() {
        return Err(SyncError::GraphDrift(format!("an endpoint of triple {}", edge.triple_id)));
      }
    }
  }
  Ok(notes)
}

/// Remove records from the graph, children first.
pub async fn remove<G: GraphStore>(graph: &G, records: &[Record]) -> Result<()> {
  for record in records.iter().rev() {
    match label::for_kind(record.kind()) {
      Some(label) => {
        graph.delete_node(&label, record.name()).await.map_err(graph_err)?;
      }
      None => {
        let Record::Triple(triple) = record else { continue };
        graph
          .delete_edges_where(&label::TRIPLE_ID, &Value::from(triple.id))
          .await
          .map_err(graph_err)?;
      }
    }
  }
  Ok(())
}

// ─── Document writes ─────────────────────────────────────────────────────────

fn document_err<E: tristore_core::StoreError>(e: E) -> SyncError {
  SyncError::store(StoreKind::Mongo, e)
}

pub async fn upsert_document<D: DocumentStore>(document: &D, record: &Record) -> Result<()> {
  document
    .upsert(record.kind().collection(), &sync_id(record), document_fields(record))
    .await
    .map_err(document_err)?;
  Ok(())
}

/// Delete the documents of `records`, trying every one. Returns the first
/// failure.
pub async fn delete_documents<D: DocumentStore>(document: &D, records: &[Record]) -> Result<()> {
  let mut first_error = None;
  for record in records {
    let collection = record.kind().collection();
    if let Err(e) = document.delete(collection, &sync_id(record)).await {
      first_error.get_or_insert(document_err(e));
    }
  }
  first_error.map_or(Ok(()), Err)
}
