//! The knowledge-graph entity model.
//!
//! The relational store owns every row; the document and graph mirrors hold
//! copies keyed by the same business identifiers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The seven entity kinds. The `serialize` strings are the URL segments used
/// by the HTTP layer.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  #[strum(to_string = "root category", serialize = "root-categories")]
  RootCategory,
  #[strum(to_string = "category", serialize = "categories")]
  Category,
  #[strum(to_string = "root subject", serialize = "root-subjects")]
  RootSubject,
  #[strum(to_string = "subject", serialize = "subjects")]
  Subject,
  #[strum(to_string = "relationship", serialize = "relationships")]
  Relationship,
  #[strum(to_string = "diagram", serialize = "diagrams")]
  Diagram,
  #[strum(to_string = "triple", serialize = "triples")]
  Triple,
}

impl EntityKind {
  /// Document-store collection mirroring this kind.
  pub fn collection(self) -> &'static str {
    match self {
      Self::RootCategory => "root_categories",
      Self::Category => "categories",
      Self::RootSubject => "root_subjects",
      Self::Subject => "subjects",
      Self::Relationship => "relationships",
      Self::Diagram => "diagrams",
      Self::Triple => "subject_relationship_object",
    }
  }
}

// ─── Confidence ──────────────────────────────────────────────────────────────

/// A triple's confidence, always within `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceScore(f64);

impl ConfidenceScore {
  pub fn new(value: f64) -> Result<Self> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
      Ok(Self(value))
    } else {
      Err(Error::Validation(format!(
        "confidence_score must be within [0.0, 1.0], got {value}"
      )))
    }
  }

  pub fn get(self) -> f64 { self.0 }
}

impl TryFrom<f64> for ConfidenceScore {
  type Error = Error;

  fn try_from(value: f64) -> Result<Self> { Self::new(value) }
}

impl From<ConfidenceScore> for f64 {
  fn from(c: ConfidenceScore) -> Self { c.0 }
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// Root of a category tree. `id` is itself a caller-chosen business key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCategory {
  pub id:          String,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub id:               i64,
  /// `CAT-{root_code}-{level}`
  pub code:             String,
  pub name:             String,
  pub root_category_id: String,
  pub level:            i64,
  pub description:      Option<String>,
  /// Number of diagrams filed under this category; computed on read.
  pub diagram_count:    i64,
  pub created_at:       DateTime<Utc>,
}

/// A node in the subject taxonomy; `parent_id` forms a tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSubject {
  pub id:          i64,
  pub code:        String,
  pub name:        String,
  pub description: Option<String>,
  pub parent_id:   Option<i64>,
  pub level:       i64,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
  pub id:              i64,
  /// `SUB-{root_code}-{seq:03}`, sequence monotonic per root.
  pub code:            String,
  pub name:            String,
  pub root_subject_id: i64,
  pub synonyms:        BTreeSet<String>,
  /// Names of the categories this subject appears in.
  pub categories:      BTreeSet<String>,
  pub description:     Option<String>,
  pub created_at:      DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
  pub id:                   i64,
  pub code:                 String,
  pub name:                 String,
  pub description:          Option<String>,
  pub inverse_relationship: Option<String>,
  pub semantic_type:        Option<String>,
  pub created_at:           DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagram {
  pub id:          String,
  pub category_id: Option<i64>,
  pub image_path:  Option<String>,
  pub processed:   bool,
  /// Opaque structured metadata.
  pub metadata:    Option<serde_json::Value>,
  pub created_at:  DateTime<Utc>,
}

/// A Subject–Relationship–Object fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
  pub id:               i64,
  /// `{subject_code}_{relationship_code}_{object_code}`
  pub code:             String,
  pub subject_id:       i64,
  pub relationship_id:  i64,
  pub object_id:        i64,
  pub diagram_id:       Option<String>,
  pub confidence_score: Option<ConfidenceScore>,
  pub context:          Option<String>,
  pub created_at:       DateTime<Utc>,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewRootCategory {
  pub id:          String,
  /// Derived from `name` when absent.
  pub code:        Option<String>,
  pub name:        String,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
  pub name:             String,
  pub root_category_id: String,
  #[serde(default = "default_category_level")]
  pub level:            i64,
  pub description:      Option<String>,
}

fn default_category_level() -> i64 { 1 }

/// Supplying an `id` that already exists updates that row instead.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRootSubject {
  pub id:          Option<i64>,
  pub code:        Option<String>,
  pub name:        String,
  pub description: Option<String>,
  pub parent_id:   Option<i64>,
  /// Defaults to the parent's level plus one, or zero for a root.
  pub level:       Option<i64>,
}

/// Supplying an `id` that already exists updates that row instead.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSubject {
  pub id:              Option<i64>,
  pub name:            String,
  pub root_subject_id: i64,
  #[serde(default)]
  pub synonyms:        BTreeSet<String>,
  #[serde(default)]
  pub categories:      BTreeSet<String>,
  pub description:     Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRelationship {
  pub name:                 String,
  pub description:          Option<String>,
  pub inverse_relationship: Option<String>,
  pub semantic_type:        Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDiagram {
  pub id:          String,
  pub category_id: Option<i64>,
  pub image_path:  Option<String>,
  #[serde(default)]
  pub processed:   bool,
  pub metadata:    Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTriple {
  pub subject_id:       i64,
  pub relationship_id:  i64,
  pub object_id:        i64,
  pub diagram_id:       Option<String>,
  pub confidence_score: Option<ConfidenceScore>,
  pub context:          Option<String>,
}
