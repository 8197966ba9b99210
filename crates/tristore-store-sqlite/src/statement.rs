//! Every graph statement that embeds a label, edge type or property name.
//!
//! SQLite cannot bind identifiers in DDL or in `json_extract` paths without
//! defeating partial indexes, so these are spliced into the statement text.
//! Each builder here takes [`Ident`] only, which cannot hold a quote, space or
//! any other character outside `[A-Za-z0-9_]`.

use tristore_core::ident::Ident;

// ─── Indexes ─────────────────────────────────────────────────────────────────

/// Per-label index used when resolving endpoints by code.
pub fn label_index(label: &Ident) -> String {
  format!(
    "CREATE INDEX IF NOT EXISTS nodes_{label}_code_idx
     ON nodes(json_extract(props, '$.code')) WHERE label = '{label}'"
  )
}

pub fn edge_type_index(edge_type: &Ident) -> String {
  format!(
    "CREATE INDEX IF NOT EXISTS edges_{edge_type}_idx
     ON edges(src, dst) WHERE edge_type = '{edge_type}'"
  )
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// Binds `?1` name, `?2` props. Existing props are merge-patched.
pub fn merge_node(label: &Ident) -> String {
  format!(
    "INSERT INTO nodes (label, name, props) VALUES ('{label}', ?1, ?2)
     ON CONFLICT (label, name) DO UPDATE SET props = json_patch(nodes.props, excluded.props)
     RETURNING props"
  )
}

/// Binds `?1` name; yields `node_id, props`.
pub fn find_node(label: &Ident) -> String {
  format!("SELECT node_id, props FROM nodes WHERE label = '{label}' AND name = ?1")
}

/// Binds `?1`; yields `node_id, name`.
pub fn find_node_by_prop(label: &Ident, prop: &Ident) -> String {
  format!(
    "SELECT node_id, name FROM nodes
     WHERE label = '{label}' AND json_extract(props, '$.{prop}') = ?1
     ORDER BY node_id LIMIT 1"
  )
}

/// Binds `?1` old name, `?2` new name.
pub fn rename_node(label: &Ident) -> String {
  format!("UPDATE nodes SET name = ?2 WHERE label = '{label}' AND name = ?1")
}

/// Binds `?1` name. Edges go with the node through the foreign-key cascade.
pub fn delete_node(label: &Ident) -> String {
  format!("DELETE FROM nodes WHERE label = '{label}' AND name = ?1")
}

// ─── Edges ───────────────────────────────────────────────────────────────────

/// Binds `?1` src, `?2` dst, `?3` props. An existing edge keeps its id and
/// has its props replaced.
pub fn merge_edge(edge_type: &Ident) -> String {
  format!(
    "INSERT INTO edges (edge_type, src, dst, props) VALUES ('{edge_type}', ?1, ?2, ?3)
     ON CONFLICT (edge_type, src, dst) DO UPDATE SET props = excluded.props"
  )
}

/// Binds `?1` dst, `?2` the src to keep.
pub fn delete_other_incoming(edge_type: &Ident) -> String {
  format!("DELETE FROM edges WHERE edge_type = '{edge_type}' AND dst = ?1 AND src != ?2")
}

/// Binds `?1` dst.
pub fn delete_incoming(edge_type: &Ident) -> String {
  format!("DELETE FROM edges WHERE edge_type = '{edge_type}' AND dst = ?1")
}

/// Binds `?1` src.
pub fn delete_outgoing(edge_type: &Ident) -> String {
  format!("DELETE FROM edges WHERE edge_type = '{edge_type}' AND src = ?1")
}

/// Binds `?1` the property value.
pub fn delete_edges_where(prop: &Ident) -> String {
  format!("DELETE FROM edges WHERE json_extract(props, '$.{prop}') = ?1")
}

/// Yields `from name, to name, props`.
pub fn edges_of_type(edge_type: &Ident) -> String {
  format!(
    "SELECT s.name, d.name, e.props FROM edges e
     JOIN nodes s ON s.node_id = e.src
     JOIN nodes d ON d.node_id = e.dst
     WHERE e.edge_type = '{edge_type}'
     ORDER BY e.edge_id"
  )
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Triple edges between `subject` nodes, marked by a `marker` property.
/// Binds `?1` subject, `?2` relationship, `?3` object substrings; yields
/// `subject name, edge type, props, object name`.
pub fn search_triples(subject: &Ident, marker: &Ident) -> String {
  format!(
    "SELECT s.name, e.edge_type, e.props, o.name FROM edges e
     JOIN nodes s ON s.node_id = e.src
     JOIN nodes o ON o.node_id = e.dst
     WHERE s.label = '{subject}' AND o.label = '{subject}'
       AND json_extract(e.props, '$.{marker}') IS NOT NULL
       AND instr(lower(s.name), lower(?1)) > 0
       AND (instr(lower(e.edge_type), lower(?2)) > 0
            OR instr(lower(coalesce(json_extract(e.props, '$.name'), '')), lower(?2)) > 0
            OR instr(lower(coalesce(json_extract(e.props, '$.relationship_code'), '')),
                     lower(?2)) > 0)
       AND instr(lower(o.name), lower(?3)) > 0
     ORDER BY json_extract(e.props, '$.confidence') DESC NULLS LAST, e.edge_id
     LIMIT 10"
  )
}

/// Binds `?1` a JSON array of names; yields `category name, match count`.
pub fn infer_categories(subject: &Ident, in_category: &Ident, category: &Ident) -> String {
  format!(
    "SELECT c.name, COUNT(DISTINCT s.node_id) AS match_count FROM nodes s
     JOIN edges e ON e.src = s.node_id AND e.edge_type = '{in_category}'
     JOIN nodes c ON c.node_id = e.dst AND c.label = '{category}'
     WHERE s.label = '{subject}'
       AND (lower(s.name) IN (SELECT lower(value) FROM json_each(?1))
            OR EXISTS (SELECT 1 FROM json_each(s.props, '$.synonyms') syn
                       WHERE lower(syn.value) IN (SELECT lower(value) FROM json_each(?1))))
     GROUP BY c.name
     ORDER BY match_count DESC, c.name"
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identifiers_are_spliced_verbatim() {
    let label = Ident::from_static("Subject");
    assert!(find_node(&label).contains("label = 'Subject'"));
    let prop = Ident::from_static("triple_id");
    assert!(delete_edges_where(&prop).contains("'$.triple_id'"));
  }

  #[test]
  fn hostile_labels_never_reach_a_statement() {
    assert!(Ident::new("Subject' OR '1'='1").is_err());
    assert!(Ident::new("x'); DROP TABLE nodes; --").is_err());
  }
}
