//! Node labels and edge types of the graph mirror.

use crate::{entity::EntityKind, ident::Ident};

pub const ROOT_CATEGORY: Ident = Ident::from_static("RootCategory");
pub const CATEGORY: Ident = Ident::from_static("Category");
pub const ROOT_SUBJECT: Ident = Ident::from_static("RootSubject");
pub const SUBJECT: Ident = Ident::from_static("Subject");
pub const RELATION_TYPE: Ident = Ident::from_static("RelationType");
pub const DIAGRAM: Ident = Ident::from_static("Diagram");

/// RootCategory → Category
pub const HAS_CATEGORY: Ident = Ident::from_static("HAS_CATEGORY");
/// RootSubject → RootSubject
pub const HAS_CHILD: Ident = Ident::from_static("HAS_CHILD");
/// RootSubject → Subject
pub const HAS_SUBJECT: Ident = Ident::from_static("HAS_SUBJECT");
/// Category → Diagram
pub const HAS_DIAGRAM: Ident = Ident::from_static("HAS_DIAGRAM");
/// Subject → Category
pub const IN_CATEGORY: Ident = Ident::from_static("IN_CATEGORY");

/// Edge property holding the id of the triple an edge mirrors.
pub const TRIPLE_ID: Ident = Ident::from_static("triple_id");

/// The label of the node mirroring `kind`. Triples are edges, not nodes.
pub fn for_kind(kind: EntityKind) -> Option<Ident> {
  match kind {
    EntityKind::RootCategory => Some(ROOT_CATEGORY),
    EntityKind::Category => Some(CATEGORY),
    EntityKind::RootSubject => Some(ROOT_SUBJECT),
    EntityKind::Subject => Some(SUBJECT),
    EntityKind::Relationship => Some(RELATION_TYPE),
    EntityKind::Diagram => Some(DIAGRAM),
    EntityKind::Triple => None,
  }
}
