//! Row mapping for the relational tables.
//!
//! Each entity implements [`Table`]: a `SELECT` prefix using a fixed table
//! alias, a raw row type read straight from SQLite, and a fallible decode into
//! the domain type. Callers append the `WHERE`/`ORDER BY` tail.

use rusqlite::{Connection, Params, Row};
use tristore_core::{
  entity::{
    Category, ConfidenceScore, Diagram, EntityKind, Relationship, RootCategory, RootSubject,
    Subject, Triple,
  },
  record::{Record, RecordKey},
  store::TripleDetail,
};

use crate::{
  Result,
  encode::{decode_dt, decode_json, decode_set},
};

pub trait Table: Sized {
  /// `SELECT <columns> FROM <table> <alias>`
  const SELECT: &'static str;
  type Raw;

  fn read(row: &Row<'_>) -> rusqlite::Result<Self::Raw>;
  fn decode(raw: Self::Raw) -> Result<Self>;
}

pub fn select<T: Table>(conn: &Connection, tail: &str, params: impl Params) -> Result<Vec<T>> {
  let sql = format!("{} {tail}", T::SELECT);
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(params, T::read)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(T::decode).collect()
}

pub fn select_one<T: Table>(
  conn: &Connection,
  tail: &str,
  params: impl Params,
) -> Result<Option<T>> {
  Ok(select(conn, tail, params)?.into_iter().next())
}

// ─── Root category ───────────────────────────────────────────────────────────

pub struct RawRootCategory {
  id:          String,
  code:        String,
  name:        String,
  description: Option<String>,
  created_at:  String,
}

impl Table for RootCategory {
  const SELECT: &'static str =
    "SELECT rc.id, rc.code, rc.name, rc.description, rc.created_at FROM root_categories rc";
  type Raw = RawRootCategory;

  fn read(row: &Row<'_>) -> rusqlite::Result<RawRootCategory> {
    Ok(RawRootCategory {
      id:          row.get(0)?,
      code:        row.get(1)?,
      name:        row.get(2)?,
      description: row.get(3)?,
      created_at:  row.get(4)?,
    })
  }

  fn decode(raw: RawRootCategory) -> Result<Self> {
    Ok(Self {
      id:          raw.id,
      code:        raw.code,
      name:        raw.name,
      description: raw.description,
      created_at:  decode_dt(&raw.created_at)?,
    })
  }
}

// ─── Category ────────────────────────────────────────────────────────────────

pub struct RawCategory {
  id:               i64,
  code:             String,
  name:             String,
  root_category_id: String,
  level:            i64,
  description:      Option<String>,
  diagram_count:    i64,
  created_at:       String,
}

impl Table for Category {
  const SELECT: &'static str = "SELECT c.id, c.code, c.name, c.root_category_id, c.level, \
     c.description, (SELECT COUNT(*) FROM diagrams dc WHERE dc.category_id = c.id), \
     c.created_at FROM categories c";
  type Raw = RawCategory;

  fn read(row: &Row<'_>) -> rusqlite::Result<RawCategory> {
    Ok(RawCategory {
      id:               row.get(0)?,
      code:             row.get(1)?,
      name:             row.get(2)?,
      root_category_id: row.get(3)?,
      level:            row.get(4)?,
      description:      row.get(5)?,
      diagram_count:    row.get(6)?,
      created_at:       row.get(7)?,
    })
  }

  fn decode(raw: RawCategory) -> Result<Self> {
    Ok(Self {
      id:               raw.id,
      code:             raw.code,
      name:             raw.name,
      root_category_id: raw.root_category_id,
      level:            raw.level,
      description:      raw.description,
      diagram_count:    raw.diagram_count,
      created_at:       decode_dt(&raw.created_at)?,
    })
  }
}

// ─── Root subject ────────────────────────────────────────────────────────────

pub struct RawRootSubject {
  id:          i64,
  code:        String,
  name:        String,
  description: Option<String>,
  parent_id:   Option<i64>,
  level:       i64,
  created_at:  String,
}

impl Table for RootSubject {
  const SELECT: &'static str = "SELECT rs.id, rs.code, rs.name, rs.description, rs.parent_id, \
     rs.level, rs.created_at FROM root_subjects rs";
  type Raw = RawRootSubject;

  fn read(row: &Row<'_>) -> rusqlite::Result<RawRootSubject> {
    Ok(RawRootSubject {
      id:          row.get(0)?,
      code:        row.get(1)?,
      name:        row.get(2)?,
      description: row.get(3)?,
      parent_id:   row.get(4)?,
      level:       row.get(5)?,
      created_at:  row.get(6)?,
    })
  }

  fn decode(raw: RawRootSubject) -> Result<Self> {
    Ok(Self {
      id:          raw.id,
      code:        raw.code,
      name:        raw.name,
      description: raw.description,
      parent_id:   raw.parent_id,
      level:       raw.level,
      created_at:  decode_dt(&raw.created_at)?,
    })
  }
}

// ─── Subject ─────────────────────────────────────────────────────────────────

pub struct RawSubject {
  id:              i64,
  code:            String,
  name:            String,
  root_subject_id: i64,
  synonyms:        String,
  categories:      String,
  description:     Option<String>,
  created_at:      String,
}

impl Table for Subject {
  const SELECT: &'static str = "SELECT s.id, s.code, s.name, s.root_subject_id, s.synonyms, \
     s.categories, s.description, s.created_at FROM subjects s";
  type Raw = RawSubject;

  fn read(row: &Row<'_>) -> rusqlite::Result<RawSubject> {
    Ok(RawSubject {
      id:              row.get(0)?,
      code:            row.get(1)?,
      name:            row.get(2)?,
      root_subject_id: row.get(3)?,
      synonyms:        row.get(4)?,
      categories:      row.get(5)?,
      description:     row.get(6)?,
      created_at:      row.get(7)?,
    })
  }

  fn decode(raw: RawSubject) -> Result<Self> {
    Ok(Self {
      id:              raw.id,
      code:            raw.code,
      name:            raw.name,
      root_subject_id: raw.root_subject_id,
      synonyms:        decode_set(&raw.synonyms)?,
      categories:      decode_set(&raw.categories)?,
      description:     raw.description,
      created_at:      decode_dt(&raw.created_at)?,
    })
  }
}

// ─── Relationship ────────────────────────────────────────────────────────────

pub struct RawRelationship {
  id:                   i64,
  code:                 String,
  name:                 String,
  description:          Option<String>,
  inverse_relationship: Option<String>,
  semantic_type:        Option<String>,
  created_at:           String,
}

impl Table for Relationship {
  const SELECT: &'static str = "SELECT r.id, r.code, r.name, r.description, \
     r.inverse_relationship, r.semantic_type, r.created_at FROM relationships r";
  type Raw = RawRelationship;

  fn read(row: &Row<'_>) -> rusqlite::Result<RawRelationship> {
    Ok(RawRelationship {
      id:                   row.get(0)?,
      code:                 row.get(1)?,
      name:                 row.get(2)?,
      description:          row.get(3)?,
      inverse_relationship: row.get(4)?,
      semantic_type:        row.get(5)?,
      created_at:           row.get(6)?,
    })
  }

  fn decode(raw: RawRelationship) -> Result<Self> {
    Ok(Self {
      id:                   raw.id,
      code:                 raw.code,
      name:                 raw.name,
      description:          raw.description,
      inverse_relationship: raw.inverse_relationship,
      semantic_type:        raw.semantic_type,
      created_at:           decode_dt(&raw.created_at)?,
    })
  }
}

// ─── Diagram ─────────────────────────────────────────────────────────────────

pub struct RawDiagram {
  id:          String,
  category_id: Option<i64>,
  image_path:  Option<String>,
  processed:   bool,
  metadata:    Option<String>,
  created_at:  String,
}

impl Table for Diagram {
  const SELECT: &'static str = "SELECT d.id, d.category_id, d.image_path, d.processed, \
     d.metadata, d.created_at FROM diagrams d";
  type Raw = RawDiagram;

  fn read(row: &Row<'_>) -> rusqlite::Result<RawDiagram> {
    Ok(RawDiagram {
      id:          row.get(0)?,
      category_id: row.get(1)?,
      image_path:  row.get(2)?,
      processed:   row.get(3)?,
      metadata:    row.get(4)?,
      created_at:  row.get(5)?,
    })
  }

  fn decode(raw: RawDiagram) -> Result<Self> {
    Ok(Self {
      id:          raw.id,
      category_id: raw.category_id,
      image_path:  raw.image_path,
      processed:   raw.processed,
      metadata:    raw.metadata.as_deref().map(decode_json).transpose()?,
      created_at:  decode_dt(&raw.created_at)?,
    })
  }
}

// ─── Triple ──────────────────────────────────────────────────────────────────

pub struct RawTriple {
  id:               i64,
  code:             String,
  subject_id:       i64,
  relationship_id:  i64,
  object_id:        i64,
  diagram_id:       Option<String>,
  confidence_score: Option<f64>,
  context:          Option<String>,
  created_at:       String,
}

impl Table for Triple {
  const SELECT: &'static str = "SELECT t.id, t.code, t.subject_id, t.relationship_id, \
     t.object_id, t.diagram_id, t.confidence_score, t.context, t.created_at FROM triples t";
  type Raw = RawTriple;

  fn read(row: &Row<'_>) -> rusqlite::Result<RawTriple> {
    Ok(RawTriple {
      id:               row.get(0)?,
      code:             row.get(1)?,
      subject_id:       row.get(2)?,
      relationship_id:  row.get(3)?,
      object_id:        row.get(4)?,
      diagram_id:       row.get(5)?,
      confidence_score: row.get(6)?,
      context:          row.get(7)?,
      created_at:       row.get(8)?,
    })
  }

  fn decode(raw: RawTriple) -> Result<Self> {
    Ok(Self {
      id:               raw.id,
      code:             raw.code,
      subject_id:       raw.subject_id,
      relationship_id:  raw.relationship_id,
      object_id:        raw.object_id,
      diagram_id:       raw.diagram_id,
      confidence_score: raw.confidence_score.map(ConfidenceScore::new).transpose()?,
      context:          raw.context,
      created_at:       decode_dt(&raw.created_at)?,
    })
  }
}

// ─── Triple detail ───────────────────────────────────────────────────────────

pub struct RawTripleDetail {
  id:                i64,
  code:              String,
  subject_id:        i64,
  subject_name:      String,
  subject_code:      String,
  relationship_id:   i64,
  relationship_name: String,
  relationship_code: String,
  object_id:         i64,
  object_name:       String,
  object_code:       String,
  diagram_id:        Option<String>,
  confidence_score:  Option<f64>,
  context:           Option<String>,
  created_at:        String,
}

impl Table for TripleDetail {
  const SELECT: &'static str = "SELECT t.id, t.code, s.id, s.name, s.code, r.id, r.name, \
     r.code, o.id, o.name, o.code, t.diagram_id, t.confidence_score, t.context, t.created_at \
     FROM triples t \
     JOIN subjects s      ON s.id = t.subject_id \
     JOIN relationships r ON r.id = t.relationship_id \
     JOIN subjects o      ON o.id = t.object_id";
  type Raw = RawTripleDetail;

  fn read(row: &Row<'_>) -> rusqlite::Result<RawTripleDetail> {
    Ok(RawTripleDetail {
      id:                row.get(0)?,
      code:              row.get(1)?,
      subject_id:        row.get(2)?,
      subject_name:      row.get(3)?,
      subject_code:      row.get(4)?,
      relationship_id:   row.get(5)?,
      relationship_name: row.get(6)?,
      relationship_code: row.get(7)?,
      object_id:         row.get(8)?,
      object_name:       row.get(9)?,
      object_code:       row.get(10)?,
      diagram_id:        row.get(11)?,
      confidence_score:  row.get(12)?,
      context:           row.get(13)?,
      created_at:        row.get(14)?,
    })
  }

  fn decode(raw: RawTripleDetail) -> Result<Self> {
    Ok(Self {
      id:                raw.id,
      code:              raw.code,
      subject_id:        raw.subject_id,
      subject_name:      raw.subject_name,
      subject_code:      raw.subject_code,
      relationship_id:   raw.relationship_id,
      relationship_name: raw.relationship_name,
      relationship_code: raw.relationship_code,
      object_id:         raw.object_id,
      object_name:       raw.object_name,
      object_code:       raw.object_code,
      diagram_id:        raw.diagram_id,
      confidence_score:  raw.confidence_score,
      context:           raw.context,
      created_at:        decode_dt(&raw.created_at)?,
    })
  }
}

// ─── Kind-erased access ──────────────────────────────────────────────────────

pub fn get(conn: &Connection, key: &RecordKey) -> Result<Option<Record>> {
  Ok(match key {
    RecordKey::RootCategory(id) => {
      select_one(conn, "WHERE rc.id = ?1", [id])?.map(Record::RootCategory)
    }
    RecordKey::Category(id) => select_one(conn, "WHERE c.id = ?1", [id])?.map(Record::Category),
    RecordKey::RootSubject(id) => {
      select_one(conn, "WHERE rs.id = ?1", [id])?.map(Record::RootSubject)
    }
    RecordKey::Subject(id) => select_one(conn, "WHERE s.id = ?1", [id])?.map(Record::Subject),
    RecordKey::Relationship(id) => {
      select_one(conn, "WHERE r.id = ?1", [id])?.map(Record::Relationship)
    }
    RecordKey::Diagram(id) => select_one(conn, "WHERE d.id = ?1", [id])?.map(Record::Diagram),
    RecordKey::Triple(id) => select_one(conn, "WHERE t.id = ?1", [id])?.map(Record::Triple),
  })
}

pub fn list(conn: &Connection, kind: EntityKind) -> Result<Vec<Record>> {
  fn all<T: Table>(conn: &Connection, order: &str, wrap: fn(T) -> Record) -> Result<Vec<Record>> {
    Ok(select::<T>(conn, order, [])?.into_iter().map(wrap).collect())
  }
  match kind {
    EntityKind::RootCategory => all(conn, "ORDER BY rc.id", Record::RootCategory),
    EntityKind::Category => all(conn, "ORDER BY c.id", Record::Category),
    EntityKind::RootSubject => all(conn, "ORDER BY rs.level, rs.id", Record::RootSubject),
    EntityKind::Subject => all(conn, "ORDER BY s.id", Record::Subject),
    EntityKind::Relationship => all(conn, "ORDER BY r.id", Record::Relationship),
    EntityKind::Diagram => all(conn, "ORDER BY d.id", Record::Diagram),
    EntityKind::Triple => all(conn, "ORDER BY t.id", Record::Triple),
  }
}
