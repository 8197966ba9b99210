//! [`SqliteGraphStore`]: a labeled property graph on SQLite.
//!
//! Nodes are unique per `(label, name)`; edges are unique per
//! `(edge_type, src, dst)`, which makes every merge idempotent. Statements
//! that mention a label or edge type come from [`crate::statement`].

use std::path::Path;

use rusqlite::{Connection, OptionalExtension as _, params, types::Value as SqlValue};
use serde_json::{Map, Value};
use tristore_core::{
  ident::Ident,
  label,
  store::{
    CategoryInference, GraphEdge, GraphNode, GraphStore, GraphTripleMatch, HierarchyLink,
    NodeRef, TripleQuery,
  },
};

use crate::{
  Error, Result,
  encode::{decode_object, encode_object},
  schema, statement,
};

#[derive(Clone)]
pub struct SqliteGraphStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteGraphStore {
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(schema::GRAPH)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn run<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let out = f(&tx);
        if out.is_ok() {
          tx.commit()?;
        }
        Ok(out)
      })
      .await?
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn node_id(conn: &Connection, label: &Ident, name: &str) -> Result<Option<i64>> {
  Ok(
    conn
      .query_row(&statement::find_node(label), [name], |row| row.get(0))
      .optional()?,
  )
}

/// Resolve an endpoint by code, then entity id, then name.
fn resolve(conn: &Connection, node: &NodeRef) -> Result<Option<(i64, String)>> {
  const CODE: Ident = Ident::from_static("code");
  const ENTITY_ID: Ident = Ident::from_static("entity_id");

  for (prop, value) in [(CODE, &node.code), (ENTITY_ID, &node.entity_id)] {
    let Some(value) = value else { continue };
    let found = conn
      .query_row(&statement::find_node_by_prop(&node.label, &prop), [value], |row| {
        Ok((row.get(0)?, row.get(1)?))
      })
      .optional()?;
    if found.is_some() {
      return Ok(found);
    }
  }
  let Some(name) = &node.name else {
    return Ok(None);
  };
  Ok(node_id(conn, &node.label, name)?.map(|id| (id, name.clone())))
}

/// A JSON scalar as the SQL value `json_extract` would yield for it.
fn sql_value(value: &Value) -> SqlValue {
  match value {
    Value::Null => SqlValue::Null,
    Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
    Value::Number(n) => match n.as_i64() {
      Some(i) => SqlValue::Integer(i),
      None => SqlValue::Real(n.as_f64().unwrap_or_default()),
    },
    Value::String(s) => SqlValue::Text(s.clone()),
    other => SqlValue::Text(other.to_string()),
  }
}

fn ensure_edge_index(conn: &Connection, edge_type: &Ident) -> Result<()> {
  conn.execute_batch(&statement::edge_type_index(edge_type))?;
  Ok(())
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SqliteGraphStore {
  type Error = Error;

  async fn merge_node(
    &self,
    label: &Ident,
    name: &str,
    props: Map<String, Value>,
  ) -> Result<GraphNode> {
    let (label, name) = (label.clone(), name.to_owned());
    let encoded = encode_object(&props)?;
    self
      .run(move |conn| {
        conn.execute_batch(&statement::label_index(&label))?;
        let merged: String =
          conn.query_row(&statement::merge_node(&label), params![name, encoded], |row| {
            row.get(0)
          })?;
        tracing::debug!(%label, %name, "graph node merged");
        Ok(GraphNode { label, name, props: decode_object(&merged)? })
      })
      .await
  }

  async fn rename_node(&self, label: &Ident, from: &str, to: &str) -> Result<bool> {
    let (label, from, to) = (label.clone(), from.to_owned(), to.to_owned());
    self
      .run(move |conn| {
        if from == to {
          return Ok(node_id(conn, &label, &from)?.is_some());
        }
        let changed = conn.execute(&statement::rename_node(&label), [&from, &to])?;
        Ok(changed > 0)
      })
      .await
  }

  async fn get_node(&self, label: &Ident, name: &str) -> Result<Option<GraphNode>> {
    let (label, name) = (label.clone(), name.to_owned());
    self
      .run(move |conn| {
        let props: Option<String> = conn
          .query_row(&statement::find_node(&label), [&name], |row| row.get(1))
          .optional()?;
        let Some(props) = props else {
          return Ok(None);
        };
        Ok(Some(GraphNode { label, name, props: decode_object(&props)? }))
      })
      .await
  }

  async fn delete_node(&self, label: &Ident, name: &str) -> Result<bool> {
    let (label, name) = (label.clone(), name.to_owned());
    self
      .run(move |conn| Ok(conn.execute(&statement::delete_node(&label), [&name])? > 0))
      .await
  }

  async fn link_hierarchy(&self, link: &HierarchyLink) -> Result<bool> {
    let link = link.clone();
    self
      .run(move |conn| {
        let parent = node_id(conn, &link.parent_label, &link.parent_name)?;
        let child = node_id(conn, &link.child_label, &link.child_name)?;
        let (Some(parent), Some(child)) = (parent, child) else {
          return Ok(false);
        };
        ensure_edge_index(conn, &link.edge_type)?;
        if link.exclusive {
          conn.execute(&statement::delete_other_incoming(&link.edge_type), [child, parent])?;
        }
        conn.execute(&statement::merge_edge(&link.edge_type), params![parent, child, "{}"])?;
        Ok(true)
      })
      .await
  }

  async fn detach(&self, label: &Ident, name: &str, edge_type: &Ident) -> Result<usize> {
    let (label, name, edge_type) = (label.clone(), name.to_owned(), edge_type.clone());
    self
      .run(move |conn| {
        let Some(dst) = node_id(conn, &label, &name)? else {
          return Ok(0);
        };
        Ok(conn.execute(&statement::delete_incoming(&edge_type), [dst])?)
      })
      .await
  }

  async fn set_memberships(
    &self,
    label: &Ident,
    name: &str,
    edge_type: &Ident,
    target_label: &Ident,
    targets: &[String],
  ) -> Result<usize> {
    let (label, name) = (label.clone(), name.to_owned());
    let (edge_type, target_label) = (edge_type.clone(), target_label.clone());
    let targets = targets.to_vec();
    self
      .run(move |conn| {
        let Some(src) = node_id(conn, &label, &name)? else {
          return Ok(0);
        };
        ensure_edge_index(conn, &edge_type)?;
        conn.execute(&statement::delete_outgoing(&edge_type), [src])?;
        let mut linked = 0;
        for target in &targets {
          if let Some(dst) = node_id(conn, &target_label, target)? {
            linked += conn.execute(&statement::merge_edge(&edge_type), params![src, dst, "{}"])?;
          }
        }
        Ok(linked)
      })
      .await
  }

  async fn create_edge(
    &self,
    from: &NodeRef,
    to: &NodeRef,
    edge_type: &Ident,
    props: Map<String, Value>,
  ) -> Result<Option<GraphEdge>> {
    let (from, to, edge_type) = (from.clone(), to.clone(), edge_type.clone());
    let encoded = encode_object(&props)?;
    self
      .run(move |conn| {
        let (Some((src, from_name)), Some((dst, to_name))) =
          (resolve(conn, &from)?, resolve(conn, &to)?)
        else {
          return Ok(None);
        };
        ensure_edge_index(conn, &edge_type)?;
        conn.execute(&statement::merge_edge(&edge_type), params![src, dst, encoded])?;
        tracing::debug!(%edge_type, from = %from_name, to = %to_name, "graph edge merged");
        Ok(Some(GraphEdge { edge_type, from: from_name, to: to_name, props }))
      })
      .await
  }

  async fn delete_edges_where(&self, prop: &Ident, value: &Value) -> Result<usize> {
    let (prop, value) = (prop.clone(), sql_value(value));
    self
      .run(move |conn| Ok(conn.execute(&statement::delete_edges_where(&prop), [value])?))
      .await
  }

  async fn edges(&self, edge_type: &Ident) -> Result<Vec<GraphEdge>> {
    let edge_type = edge_type.clone();
    self
      .run(move |conn| {
        let mut stmt = conn.prepare(&statement::edges_of_type(&edge_type))?;
        let raws = stmt
          .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws
          .into_iter()
          .map(|(from, to, props)| -> Result<GraphEdge> {
            Ok(GraphEdge {
              edge_type: edge_type.clone(),
              from,
              to,
              props: decode_object(&props)?,
            })
          })
          .collect()
      })
      .await
  }

  async fn search_by_triple(&self, query: &TripleQuery) -> Result<Vec<GraphTripleMatch>> {
    let query = query.clone();
    self
      .run(move |conn| {
        let sql = statement::search_triples(&label::SUBJECT, &label::TRIPLE_ID);
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
          .query_map(
            params![query.subject.trim(), query.relationship.trim(), query.object.trim()],
            |row| {
              Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
              ))
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        raws
          .into_iter()
          .map(|(subject, edge_type, props, object)| -> Result<GraphTripleMatch> {
            let props = decode_object(&props)?;
            let text = |key: &str| props.get(key).and_then(Value::as_str).map(str::to_owned);
            Ok(GraphTripleMatch {
              relationship: text("name").unwrap_or(edge_type),
              relationship_code: text("relationship_code"),
              confidence: props.get("confidence").and_then(Value::as_f64),
              diagram_id: text("diagram_id"),
              context: text("context"),
              triple_code: text("code"),
              subject,
              object,
            })
          })
          .collect()
      })
      .await
  }

  async fn infer_categories(&self, subject_names: &[String]) -> Result<Vec<CategoryInference>> {
    let names = serde_json::to_string(subject_names)?;
    self
      .run(move |conn| {
        let sql =
          statement::infer_categories(&label::SUBJECT, &label::IN_CATEGORY, &label::CATEGORY);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([names], |row| {
            Ok(CategoryInference { category: row.get(0)?, match_count: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
  }
}
