//! Typed partial updates, one per entity.
//!
//! A patch names exactly the fields it changes. Nullable fields use
//! `Option<Option<T>>` so that `{"description": null}` clears the value
//! while an absent key leaves it alone.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer};

use crate::entity::{
  Category, ConfidenceScore, Diagram, Relationship, RootCategory, RootSubject, Subject,
  Triple,
};

/// Deserialize a present key (even `null`) as `Some(..)`; combined with
/// `#[serde(default)]` an absent key stays `None`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
  T: Deserialize<'de>,
  D: Deserializer<'de>,
{
  Option::<T>::deserialize(de).map(Some)
}

fn set<T>(slot: &mut T, value: Option<T>) {
  if let Some(v) = value {
    *slot = v;
  }
}

// ─── Root category ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootCategoryPatch {
  pub name:        Option<String>,
  /// An explicit code pins it; otherwise renames re-derive it.
  pub code:        Option<String>,
  #[serde(default, deserialize_with = "double_option")]
  pub description: Option<Option<String>>,
}

impl RootCategoryPatch {
  pub fn apply(self, target: &mut RootCategory) {
    set(&mut target.name, self.name);
    set(&mut target.code, self.code);
    set(&mut target.description, self.description);
  }
}

// ─── Category ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
  pub name:             Option<String>,
  pub root_category_id: Option<String>,
  pub level:            Option<i64>,
  #[serde(default, deserialize_with = "double_option")]
  pub description:      Option<Option<String>>,
}

impl CategoryPatch {
  pub fn apply(self, target: &mut Category) {
    set(&mut target.name, self.name);
    set(&mut target.root_category_id, self.root_category_id);
    set(&mut target.level, self.level);
    set(&mut target.description, self.description);
  }
}

// ─── Root subject ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootSubjectPatch {
  pub name:        Option<String>,
  pub code:        Option<String>,
  #[serde(default, deserialize_with = "double_option")]
  pub description: Option<Option<String>>,
  #[serde(default, deserialize_with = "double_option")]
  pub parent_id:   Option<Option<i64>>,
  pub level:       Option<i64>,
}

impl RootSubjectPatch {
  pub fn apply(self, target: &mut RootSubject) {
    set(&mut target.name, self.name);
    set(&mut target.code, self.code);
    set(&mut target.description, self.description);
    set(&mut target.parent_id, self.parent_id);
    set(&mut target.level, self.level);
  }
}

// ─── Subject ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectPatch {
  pub name:            Option<String>,
  pub root_subject_id: Option<i64>,
  pub synonyms:        Option<BTreeSet<String>>,
  pub categories:      Option<BTreeSet<String>>,
  #[serde(default, deserialize_with = "double_option")]
  pub description:     Option<Option<String>>,
}

impl SubjectPatch {
  pub fn apply(self, target: &mut Subject) {
    set(&mut target.name, self.name);
    set(&mut target.root_subject_id, self.root_subject_id);
    set(&mut target.synonyms, self.synonyms);
    set(&mut target.categories, self.categories);
    set(&mut target.description, self.description);
  }
}

// ─── Relationship ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationshipPatch {
  pub name:                 Option<String>,
  #[serde(default, deserialize_with = "double_option")]
  pub description:          Option<Option<String>>,
  #[serde(default, deserialize_with = "double_option")]
  pub inverse_relationship: Option<Option<String>>,
  #[serde(default, deserialize_with = "double_option")]
  pub semantic_type:        Option<Option<String>>,
}

impl RelationshipPatch {
  pub fn apply(self, target: &mut Relationship) {
    set(&mut target.name, self.name);
    set(&mut target.description, self.description);
    set(&mut target.inverse_relationship, self.inverse_relationship);
    set(&mut target.semantic_type, self.semantic_type);
  }
}

// ─── Diagram ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagramPatch {
  #[serde(default, deserialize_with = "double_option")]
  pub category_id: Option<Option<i64>>,
  #[serde(default, deserialize_with = "double_option")]
  pub image_path:  Option<Option<String>>,
  pub processed:   Option<bool>,
  #[serde(default, deserialize_with = "double_option")]
  pub metadata:    Option<Option<serde_json::Value>>,
}

impl DiagramPatch {
  pub fn apply(self, target: &mut Diagram) {
    set(&mut target.category_id, self.category_id);
    set(&mut target.image_path, self.image_path);
    set(&mut target.processed, self.processed);
    set(&mut target.metadata, self.metadata);
  }
}

// ─── Triple ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriplePatch {
  pub subject_id:       Option<i64>,
  pub relationship_id:  Option<i64>,
  pub object_id:        Option<i64>,
  #[serde(default, deserialize_with = "double_option")]
  pub diagram_id:       Option<Option<String>>,
  #[serde(default, deserialize_with = "double_option")]
  pub confidence_score: Option<Option<ConfidenceScore>>,
  #[serde(default, deserialize_with = "double_option")]
  pub context:          Option<Option<String>>,
}

impl TriplePatch {
  pub fn apply(self, target: &mut Triple) {
    set(&mut target.subject_id, self.subject_id);
    set(&mut target.relationship_id, self.relationship_id);
    set(&mut target.object_id, self.object_id);
    set(&mut target.diagram_id, self.diagram_id);
    set(&mut target.confidence_score, self.confidence_score);
    set(&mut target.context, self.context);
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::json;

  use super::*;

  fn bee() -> Subject {
    Subject {
      id:              1,
      code:            "SUB-ANI-001".into(),
      name:            "Bee".into(),
      root_subject_id: 1,
      synonyms:        BTreeSet::from(["honeybee".to_string()]),
      categories:      BTreeSet::new(),
      description:     Some("buzzes".into()),
      created_at:      Utc::now(),
    }
  }

  #[test]
  fn absent_fields_are_untouched() {
    let mut subject = bee();
    let patch: SubjectPatch = serde_json::from_value(json!({ "name": "Bumblebee" })).unwrap();
    patch.apply(&mut subject);
    assert_eq!(subject.name, "Bumblebee");
    assert_eq!(subject.description.as_deref(), Some("buzzes"));
    assert_eq!(subject.synonyms.len(), 1);
  }

  #[test]
  fn explicit_null_clears_nullable_fields() {
    let mut subject = bee();
    let patch: SubjectPatch =
      serde_json::from_value(json!({ "description": null })).unwrap();
    assert_eq!(patch.description, Some(None));
    patch.apply(&mut subject);
    assert_eq!(subject.description, None);
  }

  #[test]
  fn triple_patch_validates_confidence() {
    let bad = serde_json::from_value::<TriplePatch>(json!({ "confidence_score": 2.0 }));
    assert!(bad.is_err());
    let cleared: TriplePatch =
      serde_json::from_value(json!({ "confidence_score": null })).unwrap();
    assert_eq!(cleared.confidence_score, Some(None));
  }
}
