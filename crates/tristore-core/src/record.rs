//! Kind-erased wrappers over the entity model.
//!
//! Store traits and the synchronization layer speak in [`Record`],
//! [`RecordKey`], [`NewRecord`] and [`RecordPatch`] so a single code path can
//! sequence writes for every entity kind.

use std::fmt;

use serde::Serialize;

use crate::{
  Error, Result,
  entity::{
    Category, Diagram, EntityKind, NewCategory, NewDiagram, NewRelationship,
    NewRootCategory, NewRootSubject, NewSubject, NewTriple, Relationship, RootCategory,
    RootSubject, Subject, Triple,
  },
  patch::{
    CategoryPatch, DiagramPatch, RelationshipPatch, RootCategoryPatch, RootSubjectPatch,
    SubjectPatch, TriplePatch,
  },
};

// ─── Record ──────────────────────────────────────────────────────────────────

/// One persisted row of any kind. Serializes as the bare entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
  RootCategory(RootCategory),
  Category(Category),
  RootSubject(RootSubject),
  Subject(Subject),
  Relationship(Relationship),
  Diagram(Diagram),
  Triple(Triple),
}

impl Record {
  pub fn kind(&self) -> EntityKind {
    match self {
      Self::RootCategory(_) => EntityKind::RootCategory,
      Self::Category(_) => EntityKind::Category,
      Self::RootSubject(_) => EntityKind::RootSubject,
      Self::Subject(_) => EntityKind::Subject,
      Self::Relationship(_) => EntityKind::Relationship,
      Self::Diagram(_) => EntityKind::Diagram,
      Self::Triple(_) => EntityKind::Triple,
    }
  }

  pub fn key(&self) -> RecordKey {
    match self {
      Self::RootCategory(e) => RecordKey::RootCategory(e.id.clone()),
      Self::Category(e) => RecordKey::Category(e.id),
      Self::RootSubject(e) => RecordKey::RootSubject(e.id),
      Self::Subject(e) => RecordKey::Subject(e.id),
      Self::Relationship(e) => RecordKey::Relationship(e.id),
      Self::Diagram(e) => RecordKey::Diagram(e.id.clone()),
      Self::Triple(e) => RecordKey::Triple(e.id),
    }
  }

  /// The business code, where the kind has one.
  pub fn code(&self) -> Option<&str> {
    match self {
      Self::RootCategory(e) => Some(&e.code),
      Self::Category(e) => Some(&e.code),
      Self::RootSubject(e) => Some(&e.code),
      Self::Subject(e) => Some(&e.code),
      Self::Relationship(e) => Some(&e.code),
      Self::Diagram(_) => None,
      Self::Triple(e) => Some(&e.code),
    }
  }

  /// The name graph nodes are matched by. Diagrams are named by their id and
  /// triples by their code.
  pub fn name(&self) -> &str {
    match self {
      Self::RootCategory(e) => &e.name,
      Self::Category(e) => &e.name,
      Self::RootSubject(e) => &e.name,
      Self::Subject(e) => &e.name,
      Self::Relationship(e) => &e.name,
      Self::Diagram(e) => &e.id,
      Self::Triple(e) => &e.code,
    }
  }
}

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The primary key of a record, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
  RootCategory(String),
  Category(i64),
  RootSubject(i64),
  Subject(i64),
  Relationship(i64),
  Diagram(String),
  Triple(i64),
}

impl RecordKey {
  /// Parse a key from its textual form (e.g. a URL path segment).
  pub fn parse(kind: EntityKind, raw: &str) -> Result<Self> {
    let int = || {
      raw
        .parse::<i64>()
        .map_err(|_| Error::Validation(format!("{kind} id must be an integer, got {raw:?}")))
    };
    Ok(match kind {
      EntityKind::RootCategory => Self::RootCategory(raw.to_owned()),
      EntityKind::Category => Self::Category(int()?),
      EntityKind::RootSubject => Self::RootSubject(int()?),
      EntityKind::Subject => Self::Subject(int()?),
      EntityKind::Relationship => Self::Relationship(int()?),
      EntityKind::Diagram => Self::Diagram(raw.to_owned()),
      EntityKind::Triple => Self::Triple(int()?),
    })
  }

  pub fn kind(&self) -> EntityKind {
    match self {
      Self::RootCategory(_) => EntityKind::RootCategory,
      Self::Category(_) => EntityKind::Category,
      Self::RootSubject(_) => EntityKind::RootSubject,
      Self::Subject(_) => EntityKind::Subject,
      Self::Relationship(_) => EntityKind::Relationship,
      Self::Diagram(_) => EntityKind::Diagram,
      Self::Triple(_) => EntityKind::Triple,
    }
  }

  pub fn not_found(&self) -> Error { Error::not_found(self.kind(), self) }
}

impl fmt::Display for RecordKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::RootCategory(id) | Self::Diagram(id) => f.write_str(id),
      Self::Category(id)
      | Self::RootSubject(id)
      | Self::Subject(id)
      | Self::Relationship(id)
      | Self::Triple(id) => write!(f, "{id}"),
    }
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum NewRecord {
  RootCategory(NewRootCategory),
  Category(NewCategory),
  RootSubject(NewRootSubject),
  Subject(NewSubject),
  Relationship(NewRelationship),
  Diagram(NewDiagram),
  Triple(NewTriple),
}

impl NewRecord {
  /// Deserialize a request body for `kind`.
  pub fn from_json(kind: EntityKind, body: serde_json::Value) -> Result<Self> {
    Ok(match kind {
      EntityKind::RootCategory => Self::RootCategory(serde_json::from_value(body)?),
      EntityKind::Category => Self::Category(serde_json::from_value(body)?),
      EntityKind::RootSubject => Self::RootSubject(serde_json::from_value(body)?),
      EntityKind::Subject => Self::Subject(serde_json::from_value(body)?),
      EntityKind::Relationship => Self::Relationship(serde_json::from_value(body)?),
      EntityKind::Diagram => Self::Diagram(serde_json::from_value(body)?),
      EntityKind::Triple => Self::Triple(serde_json::from_value(body)?),
    })
  }

  pub fn kind(&self) -> EntityKind {
    match self {
      Self::RootCategory(_) => EntityKind::RootCategory,
      Self::Category(_) => EntityKind::Category,
      Self::RootSubject(_) => EntityKind::RootSubject,
      Self::Subject(_) => EntityKind::Subject,
      Self::Relationship(_) => EntityKind::Relationship,
      Self::Diagram(_) => EntityKind::Diagram,
      Self::Triple(_) => EntityKind::Triple,
    }
  }

  /// The key this input will write to, when the caller fixes it up front.
  pub fn explicit_key(&self) -> Option<RecordKey> {
    match self {
      Self::RootCategory(n) => Some(RecordKey::RootCategory(n.id.clone())),
      Self::RootSubject(n) => n.id.map(RecordKey::RootSubject),
      Self::Subject(n) => n.id.map(RecordKey::Subject),
      Self::Diagram(n) => Some(RecordKey::Diagram(n.id.clone())),
      Self::Category(_) | Self::Relationship(_) | Self::Triple(_) => None,
    }
  }

  /// A stable string identifying what is being created, used to serialize
  /// concurrent creations of the same logical entity.
  pub fn lock_key(&self) -> String {
    if let Some(key) = self.explicit_key() {
      return format!("{}:{key}", self.kind());
    }
    match self {
      Self::Category(n) => format!("category:{}/{}", n.root_category_id, n.name),
      Self::Relationship(n) => format!("relationship:{}", n.name),
      Self::Triple(n) => {
        format!("triple:{}/{}/{}", n.subject_id, n.relationship_id, n.object_id)
      }
      Self::RootSubject(n) => format!("root subject:{}", n.name),
      Self::Subject(n) => format!("subject:{}/{}", n.root_subject_id, n.name),
      Self::RootCategory(n) => format!("root category:{}", n.id),
      Self::Diagram(n) => format!("diagram:{}", n.id),
    }
  }
}

#[derive(Debug, Clone)]
pub enum RecordPatch {
  RootCategory(RootCategoryPatch),
  Category(CategoryPatch),
  RootSubject(RootSubjectPatch),
  Subject(SubjectPatch),
  Relationship(RelationshipPatch),
  Diagram(DiagramPatch),
  Triple(TriplePatch),
}

impl RecordPatch {
  pub fn from_json(kind: EntityKind, body: serde_json::Value) -> Result<Self> {
    Ok(match kind {
      EntityKind::RootCategory => Self::RootCategory(serde_json::from_value(body)?),
      EntityKind::Category => Self::Category(serde_json::from_value(body)?),
      EntityKind::RootSubject => Self::RootSubject(serde_json::from_value(body)?),
      EntityKind::Subject => Self::Subject(serde_json::from_value(body)?),
      EntityKind::Relationship => Self::Relationship(serde_json::from_value(body)?),
      EntityKind::Diagram => Self::Diagram(serde_json::from_value(body)?),
      EntityKind::Triple => Self::Triple(serde_json::from_value(body)?),
    })
  }

  pub fn kind(&self) -> EntityKind {
    match self {
      Self::RootCategory(_) => EntityKind::RootCategory,
      Self::Category(_) => EntityKind::Category,
      Self::RootSubject(_) => EntityKind::RootSubject,
      Self::Subject(_) => EntityKind::Subject,
      Self::Relationship(_) => EntityKind::Relationship,
      Self::Diagram(_) => EntityKind::Diagram,
      Self::Triple(_) => EntityKind::Triple,
    }
  }
}

// ─── Write outcomes ──────────────────────────────────────────────────────────

/// What a write did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Action {
  Created,
  Updated,
  Deleted,
}

/// The row produced by a create-or-update, and which of the two happened.
#[derive(Debug, Clone, Serialize)]
pub struct Upserted<T> {
  pub action: Action,
  pub value:  T,
}

/// Every row removed by a cascading delete, parents before children.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Removal {
  pub records: Vec<Record>,
}

impl Removal {
  /// The record the delete was addressed to.
  pub fn root(&self) -> Option<&Record> { self.records.first() }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  pub fn count(&self, kind: EntityKind) -> usize {
    self.records.iter().filter(|r| r.kind() == kind).count()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn keys_parse_per_kind() {
    assert_eq!(
      RecordKey::parse(EntityKind::Subject, "12").unwrap(),
      RecordKey::Subject(12)
    );
    assert_eq!(
      RecordKey::parse(EntityKind::Diagram, "d-7").unwrap(),
      RecordKey::Diagram("d-7".into())
    );
    let err = RecordKey::parse(EntityKind::Triple, "abc").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Validation);
  }

  #[test]
  fn bodies_deserialize_per_kind() {
    let new = NewRecord::from_json(
      EntityKind::Subject,
      json!({ "name": "Bee", "root_subject_id": 1, "synonyms": ["honeybee"] }),
    )
    .unwrap();
    assert_eq!(new.kind(), EntityKind::Subject);
    assert_eq!(new.explicit_key(), None);

    let missing = NewRecord::from_json(EntityKind::Subject, json!({ "name": "Bee" }));
    assert!(missing.is_err());
  }
}
