//! [`SqliteRelationalStore`]: the SQLite implementation of [`RelationalStore`].
//!
//! Every write runs as one transaction on the store's connection thread:
//! foreign-key checks, code derivation and the write itself either all apply
//! or none do.

use std::{fmt::Display, path::Path};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, params};
use tristore_core::{
  Error as CoreError,
  code::{
    derive_category_code, derive_relationship_code, derive_root_code, derive_subject_code,
    derive_triple_code, subject_code_prefix,
  },
  entity::{
    Category, Diagram, EntityKind, NewCategory, NewDiagram, NewRelationship, NewRootCategory,
    NewRootSubject, NewSubject, NewTriple, Relationship, RootCategory, RootSubject, Subject,
    Triple,
  },
  patch::{
    CategoryPatch, DiagramPatch, RelationshipPatch, RootCategoryPatch, RootSubjectPatch,
    SubjectPatch, TriplePatch,
  },
  record::{Action, NewRecord, Record, RecordKey, RecordPatch, Removal, Upserted},
  store::{CategoryMatch, RelationalStore, TripleDetail, TripleQuery},
};

use crate::{
  Error, Result,
  encode::{encode_dt, encode_json, encode_set},
  rows::{self, Table, select, select_one},
  schema,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The authoritative store, backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteRelationalStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteRelationalStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store; useful for testing.
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
        conn.execute_batch(schema::RELATIONAL)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` in a transaction that commits only if `f` succeeds.
  async fn write<T, F>(&self, f: F) -> Result<T>
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

// ─── RelationalStore impl ────────────────────────────────────────────────────

impl RelationalStore for SqliteRelationalStore {
  type Error = Error;

  async fn create(&self, input: NewRecord) -> Result<Upserted<Record>> {
    let kind = input.kind();
    let out = self.write(move |conn| create(conn, input)).await?;
    tracing::debug!(%kind, key = %out.value.key(), action = %out.action, "relational write");
    Ok(out)
  }

  async fn get(&self, key: &RecordKey) -> Result<Option<Record>> {
    let key = key.clone();
    self.read(move |conn| rows::get(conn, &key)).await
  }

  async fn list(&self, kind: EntityKind) -> Result<Vec<Record>> {
    self.read(move |conn| rows::list(conn, kind)).await
  }

  async fn update(&self, key: &RecordKey, patch: RecordPatch) -> Result<Option<Record>> {
    if patch.kind() != key.kind() {
      return Err(
        CoreError::Validation(format!("cannot apply a {} patch to a {}", patch.kind(), key.kind()))
          .into(),
      );
    }
    let key = key.clone();
    self.write(move |conn| update(conn, &key, patch)).await
  }

  async fn delete(&self, key: &RecordKey) -> Result<Option<Removal>> {
    let owned = key.clone();
    let removal = self.write(move |conn| delete(conn, &owned)).await?;
    if let Some(removal) = &removal {
      tracing::debug!(key = %key, removed = removal.len(), "relational delete");
    }
    Ok(removal)
  }

  async fn restore(&self, records: Vec<Record>) -> Result<()> {
    self
      .write(move |conn| records.iter().try_for_each(|record| restore(conn, record)))
      .await
  }

  async fn find_triple(
    &self,
    subject_id: i64,
    relationship_id: i64,
    object_id: i64,
  ) -> Result<Option<Triple>> {
    self
      .read(move |conn| {
        select_one(
          conn,
          "WHERE t.subject_id = ?1 AND t.relationship_id = ?2 AND t.object_id = ?3",
          [subject_id, relationship_id, object_id],
        )
      })
      .await
  }

  async fn find_subject(&self, name: &str) -> Result<Option<Subject>> {
    let name = name.to_owned();
    self.read(move |conn| find_subject(conn, &name)).await
  }

  async fn root_subject_name(&self, subject_name: &str) -> Result<Option<String>> {
    let name = subject_name.to_owned();
    self
      .read(move |conn| {
        let Some(subject) = find_subject(conn, &name)? else {
          return Ok(None);
        };
        let root: Option<RootSubject> =
          select_one(conn, "WHERE rs.id = ?1", [subject.root_subject_id])?;
        Ok(root.map(|r| r.name))
      })
      .await
  }

  async fn diagrams_in_category(&self, category_id: i64) -> Result<Vec<Diagram>> {
    self
      .read(move |conn| select(conn, "WHERE d.category_id = ?1 ORDER BY d.id", [category_id]))
      .await
  }

  async fn diagrams_by_category_name(&self, name: &str) -> Result<Vec<Diagram>> {
    let name = name.to_owned();
    self
      .read(move |conn| {
        select(
          conn,
          "JOIN categories c ON c.id = d.category_id
           WHERE lower(c.name) = lower(?1)
           ORDER BY d.id",
          [name],
        )
      })
      .await
  }

  async fn search_by_triple(&self, query: &TripleQuery) -> Result<Vec<CategoryMatch>> {
    let query = query.clone();
    self.read(move |conn| search_by_triple(conn, &query)).await
  }

  async fn triple_details(&self, limit: usize, offset: usize) -> Result<Vec<TripleDetail>> {
    let (limit, offset) = (limit as i64, offset as i64);
    self
      .read(move |conn| select(conn, "ORDER BY t.id LIMIT ?1 OFFSET ?2", [limit, offset]))
      .await
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn now() -> String { encode_dt(Utc::now()) }

/// A referenced row that must exist; its absence is a validation failure.
fn require<T>(found: Option<T>, what: &str, key: impl Display) -> Result<T> {
  found.ok_or_else(|| CoreError::Validation(format!("{what} {key} does not exist")).into())
}

/// Re-read a row written in this transaction.
fn reload(conn: &Connection, key: &RecordKey) -> Result<Record> {
  rows::get(conn, key)?.ok_or_else(|| Error::Core(key.not_found()))
}

fn created(value: Record) -> Upserted<Record> { Upserted { action: Action::Created, value } }

fn updated(value: Record) -> Upserted<Record> { Upserted { action: Action::Updated, value } }

fn root_category(conn: &Connection, id: &str) -> Result<Option<RootCategory>> {
  select_one(conn, "WHERE rc.id = ?1", [id])
}

fn category(conn: &Connection, id: i64) -> Result<Option<Category>> {
  select_one(conn, "WHERE c.id = ?1", [id])
}

fn root_subject(conn: &Connection, id: i64) -> Result<Option<RootSubject>> {
  select_one(conn, "WHERE rs.id = ?1", [id])
}

fn subject(conn: &Connection, id: i64) -> Result<Option<Subject>> {
  select_one(conn, "WHERE s.id = ?1", [id])
}

fn relationship(conn: &Connection, id: i64) -> Result<Option<Relationship>> {
  select_one(conn, "WHERE r.id = ?1", [id])
}

fn diagram(conn: &Connection, id: &str) -> Result<Option<Diagram>> {
  select_one(conn, "WHERE d.id = ?1", [id])
}

/// Issue the next subject code under `root_code`, never reusing one that was
/// handed out before.
fn next_subject_code(conn: &Connection, root_code: &str) -> Result<String> {
  let prefix = subject_code_prefix(root_code);
  let mut stmt = conn.prepare("SELECT code FROM subjects WHERE substr(code, 1, length(?1)) = ?1")?;
  let mut issued = stmt
    .query_map([&prefix], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let last: Option<String> = conn
    .query_row("SELECT last_code FROM code_sequences WHERE prefix = ?1", [&prefix], |row| {
      row.get(0)
    })
    .optional()?;
  issued.extend(last);

  let code = derive_subject_code(root_code, issued.iter().map(String::as_str));
  conn.execute(
    "INSERT INTO code_sequences (prefix, last_code) VALUES (?1, ?2)
     ON CONFLICT (prefix) DO UPDATE SET last_code = excluded.last_code",
    params![prefix, code],
  )?;
  Ok(code)
}

/// Recompute the stored code of every triple matching `filter`, which binds
/// `?1`.
fn refresh_triple_codes(conn: &Connection, filter: &str, id: i64) -> Result<()> {
  let sql = format!(
    "UPDATE triples SET code =
       (SELECT code FROM subjects WHERE id = triples.subject_id) || '_' ||
       (SELECT code FROM relationships WHERE id = triples.relationship_id) || '_' ||
       (SELECT code FROM subjects WHERE id = triples.object_id)
     WHERE {filter}"
  );
  conn.execute(&sql, [id])?;
  Ok(())
}

/// Root subjects strictly below `id`, shallowest first, as a subquery yielding
/// `(id, depth)` and binding `?1`.
const SUBTREE: &str = "(WITH RECURSIVE tree(id, depth) AS (
     SELECT ?1, 0
     UNION ALL
     SELECT x.id, tree.depth + 1 FROM root_subjects x JOIN tree ON x.parent_id = tree.id
   ) SELECT id, depth FROM tree)";

// ─── Create ──────────────────────────────────────────────────────────────────

fn create(conn: &Connection, input: NewRecord) -> Result<Upserted<Record>> {
  match input {
    NewRecord::RootCategory(n) => insert_root_category(conn, n),
    NewRecord::Category(n) => insert_category(conn, n),
    NewRecord::RootSubject(n) => upsert_root_subject(conn, n),
    NewRecord::Subject(n) => upsert_subject(conn, n),
    NewRecord::Relationship(n) => insert_relationship(conn, n),
    NewRecord::Diagram(n) => insert_diagram(conn, n),
    NewRecord::Triple(n) => upsert_triple(conn, n),
  }
}

fn insert_root_category(conn: &Connection, n: NewRootCategory) -> Result<Upserted<Record>> {
  let code = derive_root_code(n.code.as_deref().unwrap_or(&n.name));
  conn.execute(
    "INSERT INTO root_categories (id, code, name, description, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![n.id, code, n.name, n.description, now()],
  )?;
  Ok(created(reload(conn, &RecordKey::RootCategory(n.id))?))
}

fn insert_category(conn: &Connection, n: NewCategory) -> Result<Upserted<Record>> {
  let root = require(
    root_category(conn, &n.root_category_id)?,
    "root category",
    &n.root_category_id,
  )?;
  let code = derive_category_code(&root.code, n.level);
  conn.execute(
    "INSERT INTO categories (code, name, root_category_id, level, description, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![code, n.name, n.root_category_id, n.level, n.description, now()],
  )?;
  let key = RecordKey::Category(conn.last_insert_rowid());
  Ok(created(reload(conn, &key)?))
}

fn upsert_root_subject(conn: &Connection, n: NewRootSubject) -> Result<Upserted<Record>> {
  if let Some(current) = n.id.map(|id| root_subject(conn, id)).transpose()?.flatten() {
    let patch = RootSubjectPatch {
      name:        Some(n.name),
      code:        n.code,
      description: Some(n.description),
      parent_id:   Some(n.parent_id),
      level:       n.level,
    };
    return Ok(updated(update_root_subject(conn, current, patch)?));
  }

  let parent = n
    .parent_id
    .map(|pid| require(root_subject(conn, pid)?, "parent root subject", pid))
    .transpose()?;
  let level = n
    .level
    .unwrap_or_else(|| parent.as_ref().map_or(0, |p| p.level + 1));
  let code = derive_root_code(n.code.as_deref().unwrap_or(&n.name));

  conn.execute(
    "INSERT INTO root_subjects (id, code, name, description, parent_id, level, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![n.id, code, n.name, n.description, n.parent_id, level, now()],
  )?;
  let key = RecordKey::RootSubject(conn.last_insert_rowid());
  Ok(created(reload(conn, &key)?))
}

fn upsert_subject(conn: &Connection, n: NewSubject) -> Result<Upserted<Record>> {
  if let Some(current) = n.id.map(|id| subject(conn, id)).transpose()?.flatten() {
    let patch = SubjectPatch {
      name:            Some(n.name),
      root_subject_id: Some(n.root_subject_id),
      synonyms:        Some(n.synonyms),
      categories:      Some(n.categories),
      description:     Some(n.description),
    };
    return Ok(updated(update_subject(conn, current, patch)?));
  }

  let root = require(root_subject(conn, n.root_subject_id)?, "root subject", n.root_subject_id)?;
  let code = next_subject_code(conn, &root.code)?;
  conn.execute(
    "INSERT INTO subjects
       (id, code, name, root_subject_id, synonyms, categories, description, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      n.id,
      code,
      n.name,
      n.root_subject_id,
      encode_set(&n.synonyms)?,
      encode_set(&n.categories)?,
      n.description,
      now(),
    ],
  )?;
  let key = RecordKey::Subject(conn.last_insert_rowid());
  Ok(created(reload(conn, &key)?))
}

fn insert_relationship(conn: &Connection, n: NewRelationship) -> Result<Upserted<Record>> {
  let code = derive_relationship_code(n.semantic_type.as_deref(), &n.name);
  conn.execute(
    "INSERT INTO relationships
       (code, name, description, inverse_relationship, semantic_type, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![code, n.name, n.description, n.inverse_relationship, n.semantic_type, now()],
  )?;
  let key = RecordKey::Relationship(conn.last_insert_rowid());
  Ok(created(reload(conn, &key)?))
}

fn insert_diagram(conn: &Connection, n: NewDiagram) -> Result<Upserted<Record>> {
  if let Some(cid) = n.category_id {
    require(category(conn, cid)?, "category", cid)?;
  }
  let metadata = n.metadata.as_ref().map(encode_json).transpose()?;
  conn.execute(
    "INSERT INTO diagrams (id, category_id, image_path, processed, metadata, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![n.id, n.category_id, n.image_path, n.processed, metadata, now()],
  )?;
  let key = RecordKey::Diagram(n.id);
  Ok(created(reload(conn, &key)?))
}

/// The code of the triple `(subject_id, relationship_id, object_id)`,
/// validating that all three exist.
fn triple_code(conn: &Connection, s: i64, r: i64, o: i64) -> Result<String> {
  let subj = require(subject(conn, s)?, "subject", s)?;
  let rel = require(relationship(conn, r)?, "relationship", r)?;
  let object = require(subject(conn, o)?, "object subject", o)?;
  Ok(derive_triple_code(&subj.code, &rel.code, &object.code))
}

fn upsert_triple(conn: &Connection, n: NewTriple) -> Result<Upserted<Record>> {
  let code = triple_code(conn, n.subject_id, n.relationship_id, n.object_id)?;
  if let Some(did) = &n.diagram_id {
    require(diagram(conn, did)?, "diagram", did)?;
  }
  let confidence = n.confidence_score.map(f64::from);

  let existing: Option<Triple> = select_one(
    conn,
    "WHERE t.subject_id = ?1 AND t.relationship_id = ?2 AND t.object_id = ?3",
    [n.subject_id, n.relationship_id, n.object_id],
  )?;

  if let Some(existing) = existing {
    conn.execute(
      "UPDATE triples SET code = ?2, diagram_id = ?3, confidence_score = ?4, context = ?5
       WHERE id = ?1",
      params![existing.id, code, n.diagram_id, confidence, n.context],
    )?;
    let key = RecordKey::Triple(existing.id);
    return Ok(updated(reload(conn, &key)?));
  }

  conn.execute(
    "INSERT INTO triples
       (code, subject_id, relationship_id, object_id, diagram_id, confidence_score, context,
        created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      code,
      n.subject_id,
      n.relationship_id,
      n.object_id,
      n.diagram_id,
      confidence,
      n.context,
      now(),
    ],
  )?;
  let key = RecordKey::Triple(conn.last_insert_rowid());
  Ok(created(reload(conn, &key)?))
}

// ─── Update ──────────────────────────────────────────────────────────────────

fn update(conn: &Connection, key: &RecordKey, patch: RecordPatch) -> Result<Option<Record>> {
  let Some(current) = rows::get(conn, key)? else {
    return Ok(None);
  };
  let record = match (current, patch) {
    (Record::RootCategory(c), RecordPatch::RootCategory(p)) => update_root_category(conn, c, p)?,
    (Record::Category(c), RecordPatch::Category(p)) => update_category(conn, c, p)?,
    (Record::RootSubject(c), RecordPatch::RootSubject(p)) => update_root_subject(conn, c, p)?,
    (Record::Subject(c), RecordPatch::Subject(p)) => update_subject(conn, c, p)?,
    (Record::Relationship(c), RecordPatch::Relationship(p)) => update_relationship(conn, c, p)?,
    (Record::Diagram(c), RecordPatch::Diagram(p)) => update_diagram(conn, c, p)?,
    (Record::Triple(c), RecordPatch::Triple(p)) => update_triple(conn, c, p)?,
    (current, patch) => {
      return Err(
        CoreError::Validation(format!(
          "cannot apply a {} patch to a {}",
          patch.kind(),
          current.kind()
        ))
        .into(),
      );
    }
  };
  Ok(Some(record))
}

/// A root code follows renames only while it is still the one derived from
/// the name; an explicit code in the patch always wins.
fn next_root_code(
  current_code: &str,
  current_name: &str,
  next_name: &str,
  explicit: Option<&str>,
) -> String {
  match explicit {
    Some(code) => derive_root_code(code),
    None if next_name != current_name && current_code == derive_root_code(current_name) => {
      derive_root_code(next_name)
    }
    None => current_code.to_owned(),
  }
}

fn update_root_category(
  conn: &Connection,
  current: RootCategory,
  patch: RootCategoryPatch,
) -> Result<Record> {
  let explicit = patch.code.clone();
  let mut next = current.clone();
  patch.apply(&mut next);
  next.code = next_root_code(&current.code, &current.name, &next.name, explicit.as_deref());

  conn.execute(
    "UPDATE root_categories SET code = ?2, name = ?3, description = ?4 WHERE id = ?1",
    params![next.id, next.code, next.name, next.description],
  )?;
  reload(conn, &RecordKey::RootCategory(next.id))
}

fn update_category(conn: &Connection, current: Category, patch: CategoryPatch) -> Result<Record> {
  let mut next = current.clone();
  patch.apply(&mut next);

  if next.root_category_id != current.root_category_id || next.level != current.level {
    let root = require(
      root_category(conn, &next.root_category_id)?,
      "root category",
      &next.root_category_id,
    )?;
    next.code = derive_category_code(&root.code, next.level);
  }

  conn.execute(
    "UPDATE categories
     SET code = ?2, name = ?3, root_category_id = ?4, level = ?5, description = ?6
     WHERE id = ?1",
    params![next.id, next.code, next.name, next.root_category_id, next.level, next.description],
  )?;
  reload(conn, &RecordKey::Category(next.id))
}

fn update_root_subject(
  conn: &Connection,
  current: RootSubject,
  patch: RootSubjectPatch,
) -> Result<Record> {
  let explicit = patch.code.clone();
  let level_given = patch.level.is_some();
  let mut next = current.clone();
  patch.apply(&mut next);
  next.code = next_root_code(&current.code, &current.name, &next.name, explicit.as_deref());

  if next.parent_id != current.parent_id {
    match next.parent_id {
      Some(pid) => {
        let in_subtree: bool = conn
          .query_row(
            &format!("SELECT EXISTS (SELECT 1 FROM {SUBTREE} WHERE id = ?2)"),
            [current.id, pid],
            |row| row.get(0),
          )?;
        if in_subtree {
          return Err(
            CoreError::Validation(format!(
              "root subject {} cannot be moved under itself or its descendant {pid}",
              current.id
            ))
            .into(),
          );
        }
        let parent = require(root_subject(conn, pid)?, "parent root subject", pid)?;
        if !level_given {
          next.level = parent.level + 1;
        }
      }
      None if !level_given => next.level = 0,
      None => {}
    }
  }

  conn.execute(
    "UPDATE root_subjects
     SET code = ?2, name = ?3, description = ?4, parent_id = ?5, level = ?6
     WHERE id = ?1",
    params![next.id, next.code, next.name, next.description, next.parent_id, next.level],
  )?;

  let shift = next.level - current.level;
  if shift != 0 {
    conn.execute(
      &format!(
        "UPDATE root_subjects SET level = level + ?2
         WHERE id IN (SELECT id FROM {SUBTREE} WHERE depth > 0)"
      ),
      [current.id, shift],
    )?;
  }
  reload(conn, &RecordKey::RootSubject(next.id))
}

fn update_subject(conn: &Connection, current: Subject, patch: SubjectPatch) -> Result<Record> {
  let mut next = current.clone();
  patch.apply(&mut next);

  if next.root_subject_id != current.root_subject_id {
    let root = require(
      root_subject(conn, next.root_subject_id)?,
      "root subject",
      next.root_subject_id,
    )?;
    next.code = next_subject_code(conn, &root.code)?;
  }

  conn.execute(
    "UPDATE subjects
     SET code = ?2, name = ?3, root_subject_id = ?4, synonyms = ?5, categories = ?6,
         description = ?7
     WHERE id = ?1",
    params![
      next.id,
      next.code,
      next.name,
      next.root_subject_id,
      encode_set(&next.synonyms)?,
      encode_set(&next.categories)?,
      next.description,
    ],
  )?;
  if next.code != current.code {
    refresh_triple_codes(conn, "subject_id = ?1 OR object_id = ?1", next.id)?;
  }
  reload(conn, &RecordKey::Subject(next.id))
}

fn update_relationship(
  conn: &Connection,
  current: Relationship,
  patch: RelationshipPatch,
) -> Result<Record> {
  let mut next = current.clone();
  patch.apply(&mut next);
  if next.name != current.name || next.semantic_type != current.semantic_type {
    next.code = derive_relationship_code(next.semantic_type.as_deref(), &next.name);
  }

  conn.execute(
    "UPDATE relationships
     SET code = ?2, name = ?3, description = ?4, inverse_relationship = ?5, semantic_type = ?6
     WHERE id = ?1",
    params![
      next.id,
      next.code,
      next.name,
      next.description,
      next.inverse_relationship,
      next.semantic_type,
    ],
  )?;
  if next.code != current.code {
    refresh_triple_codes(conn, "relationship_id = ?1", next.id)?;
  }
  reload(conn, &RecordKey::Relationship(next.id))
}

fn update_diagram(conn: &Connection, current: Diagram, patch: DiagramPatch) -> Result<Record> {
  let mut next = current.clone();
  patch.apply(&mut next);
  if next.category_id != current.category_id {
    if let Some(cid) = next.category_id {
      require(category(conn, cid)?, "category", cid)?;
    }
  }

  let metadata = next.metadata.as_ref().map(encode_json).transpose()?;
  conn.execute(
    "UPDATE diagrams SET category_id = ?2, image_path = ?3, processed = ?4, metadata = ?5
     WHERE id = ?1",
    params![next.id, next.category_id, next.image_path, next.processed, metadata],
  )?;
  reload(conn, &RecordKey::Diagram(next.id))
}

fn update_triple(conn: &Connection, current: Triple, patch: TriplePatch) -> Result<Record> {
  let mut next = current.clone();
  patch.apply(&mut next);

  if (next.subject_id, next.relationship_id, next.object_id)
    != (current.subject_id, current.relationship_id, current.object_id)
  {
    next.code = triple_code(conn, next.subject_id, next.relationship_id, next.object_id)?;
  }
  if next.diagram_id != current.diagram_id {
    if let Some(did) = &next.diagram_id {
      require(diagram(conn, did)?, "diagram", did)?;
    }
  }

  conn.execute(
    "UPDATE triples
     SET code = ?2, subject_id = ?3, relationship_id = ?4, object_id = ?5, diagram_id = ?6,
         confidence_score = ?7, context = ?8
     WHERE id = ?1",
    params![
      next.id,
      next.code,
      next.subject_id,
      next.relationship_id,
      next.object_id,
      next.diagram_id,
      next.confidence_score.map(f64::from),
      next.context,
    ],
  )?;
  reload(conn, &RecordKey::Triple(next.id))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// Collect everything the foreign-key cascades will remove, parents first,
/// then delete the addressed row and let the cascades run.
fn delete(conn: &Connection, key: &RecordKey) -> Result<Option<Removal>> {
  let Some(root) = rows::get(conn, key)? else {
    return Ok(None);
  };
  let mut records = vec![root];

  fn push<T: Table>(
    records: &mut Vec<Record>,
    wrap: fn(T) -> Record,
    found: Vec<T>,
  ) {
    records.extend(found.into_iter().map(wrap));
  }

  match key {
    RecordKey::RootCategory(id) => {
      push(
        &mut records,
        Record::Category,
        select(conn, "WHERE c.root_category_id = ?1 ORDER BY c.id", [id])?,
      );
      push(
        &mut records,
        Record::Diagram,
        select(
          conn,
          "WHERE d.category_id IN (SELECT id FROM categories WHERE root_category_id = ?1)
           ORDER BY d.id",
          [id],
        )?,
      );
      push(
        &mut records,
        Record::Triple,
        select(
          conn,
          "WHERE t.diagram_id IN (
             SELECT d2.id FROM diagrams d2
             JOIN categories c2 ON c2.id = d2.category_id
             WHERE c2.root_category_id = ?1)
           ORDER BY t.id",
          [id],
        )?,
      );
      conn.execute("DELETE FROM root_categories WHERE id = ?1", [id])?;
    }
    RecordKey::Category(id) => {
      push(
        &mut records,
        Record::Diagram,
        select(conn, "WHERE d.category_id = ?1 ORDER BY d.id", [id])?,
      );
      push(
        &mut records,
        Record::Triple,
        select(
          conn,
          "WHERE t.diagram_id IN (SELECT id FROM diagrams WHERE category_id = ?1)
           ORDER BY t.id",
          [id],
        )?,
      );
      conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    }
    RecordKey::RootSubject(id) => {
      push(
        &mut records,
        Record::RootSubject,
        select(
          conn,
          &format!(
            "JOIN {SUBTREE} tree ON tree.id = rs.id WHERE tree.depth > 0
             ORDER BY tree.depth, rs.id"
          ),
          [id],
        )?,
      );
      push(
        &mut records,
        Record::Subject,
        select(
          conn,
          &format!("WHERE s.root_subject_id IN (SELECT id FROM {SUBTREE}) ORDER BY s.id"),
          [id],
        )?,
      );
      push(
        &mut records,
        Record::Triple,
        select(
          conn,
          &format!(
            "WHERE t.subject_id IN (SELECT y.id FROM subjects y
                                    WHERE y.root_subject_id IN (SELECT id FROM {SUBTREE}))
                OR t.object_id  IN (SELECT y.id FROM subjects y
                                    WHERE y.root_subject_id IN (SELECT id FROM {SUBTREE}))
             ORDER BY t.id"
          ),
          [id],
        )?,
      );
      conn.execute("DELETE FROM root_subjects WHERE id = ?1", [id])?;
    }
    RecordKey::Subject(id) => {
      push(
        &mut records,
        Record::Triple,
        select(conn, "WHERE t.subject_id = ?1 OR t.object_id = ?1 ORDER BY t.id", [id])?,
      );
      conn.execute("DELETE FROM subjects WHERE id = ?1", [id])?;
    }
    RecordKey::Relationship(id) => {
      push(
        &mut records,
        Record::Triple,
        select(conn, "WHERE t.relationship_id = ?1 ORDER BY t.id", [id])?,
      );
      conn.execute("DELETE FROM relationships WHERE id = ?1", [id])?;
    }
    RecordKey::Diagram(id) => {
      push(
        &mut records,
        Record::Triple,
        select(conn, "WHERE t.diagram_id = ?1 ORDER BY t.id", [id])?,
      );
      conn.execute("DELETE FROM diagrams WHERE id = ?1", [id])?;
    }
    RecordKey::Triple(id) => {
      conn.execute("DELETE FROM triples WHERE id = ?1", [id])?;
    }
  }

  Ok(Some(Removal { records }))
}

// ─── Restore ─────────────────────────────────────────────────────────────────

/// Insert or overwrite one row by primary key. `ON CONFLICT DO UPDATE` keeps
/// the row in place, so no cascade fires. Triple codes that embed a restored
/// subject or relationship code are recomputed.
fn restore(conn: &Connection, record: &Record) -> Result<()> {
  match record {
    Record::RootCategory(e) => conn.execute(
      "INSERT INTO root_categories (id, code, name, description, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5)
       ON CONFLICT (id) DO UPDATE SET
         code = excluded.code, name = excluded.name, description = excluded.description,
         created_at = excluded.created_at",
      params![e.id, e.code, e.name, e.description, encode_dt(e.created_at)],
    )?,
    Record::Category(e) => conn.execute(
      "INSERT INTO categories
         (id, code, name, root_category_id, level, description, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
       ON CONFLICT (id) DO UPDATE SET
         code = excluded.code, name = excluded.name,
         root_category_id = excluded.root_category_id, level = excluded.level,
         description = excluded.description, created_at = excluded.created_at",
      params![
        e.id,
        e.code,
        e.name,
        e.root_category_id,
        e.level,
        e.description,
        encode_dt(e.created_at),
      ],
    )?,
    Record::RootSubject(e) => conn.execute(
      "INSERT INTO root_subjects (id, code, name, description, parent_id, level, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
       ON CONFLICT (id) DO UPDATE SET
         code = excluded.code, name = excluded.name, description = excluded.description,
         parent_id = excluded.parent_id, level = excluded.level,
         created_at = excluded.created_at",
      params![
        e.id,
        e.code,
        e.name,
        e.description,
        e.parent_id,
        e.level,
        encode_dt(e.created_at),
      ],
    )?,
    Record::Subject(e) => conn.execute(
      "INSERT INTO subjects
         (id, code, name, root_subject_id, synonyms, categories, description, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
       ON CONFLICT (id) DO UPDATE SET
         code = excluded.code, name = excluded.name,
         root_subject_id = excluded.root_subject_id, synonyms = excluded.synonyms,
         categories = excluded.categories, description = excluded.description,
         created_at = excluded.created_at",
      params![
        e.id,
        e.code,
        e.name,
        e.root_subject_id,
        encode_set(&e.synonyms)?,
        encode_set(&e.categories)?,
        e.description,
        encode_dt(e.created_at),
      ],
    )?,
    Record::Relationship(e) => conn.execute(
      "INSERT INTO relationships
         (id, code, name, description, inverse_relationship, semantic_type, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
       ON CONFLICT (id) DO UPDATE SET
         code = excluded.code, name = excluded.name, description = excluded.description,
         inverse_relationship = excluded.inverse_relationship,
         semantic_type = excluded.semantic_type, created_at = excluded.created_at",
      params![
        e.id,
        e.code,
        e.name,
        e.description,
        e.inverse_relationship,
        e.semantic_type,
        encode_dt(e.created_at),
      ],
    )?,
    Record::Diagram(e) => conn.execute(
      "INSERT INTO diagrams (id, category_id, image_path, processed, metadata, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)
       ON CONFLICT (id) DO UPDATE SET
         category_id = excluded.category_id, image_path = excluded.image_path,
         processed = excluded.processed, metadata = excluded.metadata,
         created_at = excluded.created_at",
      params![
        e.id,
        e.category_id,
        e.image_path,
        e.processed,
        e.metadata.as_ref().map(encode_json).transpose()?,
        encode_dt(e.created_at),
      ],
    )?,
    Record::Triple(e) => conn.execute(
      "INSERT INTO triples
         (id, code, subject_id, relationship_id, object_id, diagram_id, confidence_score,
          context, created_at)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
       ON CONFLICT (id) DO UPDATE SET
         code = excluded.code, subject_id = excluded.subject_id,
         relationship_id = excluded.relationship_id, object_id = excluded.object_id,
         diagram_id = excluded.diagram_id, confidence_score = excluded.confidence_score,
         context = excluded.context, created_at = excluded.created_at",
      params![
        e.id,
        e.code,
        e.subject_id,
        e.relationship_id,
        e.object_id,
        e.diagram_id,
        e.confidence_score.map(f64::from),
        e.context,
        encode_dt(e.created_at),
      ],
    )?,
  };
  match record {
    Record::Subject(e) => refresh_triple_codes(conn, "subject_id = ?1 OR object_id = ?1", e.id),
    Record::Relationship(e) => refresh_triple_codes(conn, "relationship_id = ?1", e.id),
    _ => Ok(()),
  }
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Exact name or synonym first, then the shortest name containing `name`.
fn find_subject(conn: &Connection, name: &str) -> Result<Option<Subject>> {
  if name.trim().is_empty() {
    return Ok(None);
  }
  let exact = select_one(
    conn,
    "WHERE lower(s.name) = lower(?1)
        OR EXISTS (SELECT 1 FROM json_each(s.synonyms) j WHERE lower(j.value) = lower(?1))
     ORDER BY CASE WHEN lower(s.name) = lower(?1) THEN 0 ELSE 1 END, s.id
     LIMIT 1",
    [name],
  )?;
  if exact.is_some() {
    return Ok(exact);
  }
  select_one(
    conn,
    "WHERE instr(lower(s.name), lower(?1)) > 0 ORDER BY length(s.name), s.id LIMIT 1",
    [name],
  )
}

const TRIPLE_SEARCH: &str = "
SELECT c.id, c.name, rc.name,
       COUNT(*)                               AS match_count,
       COALESCE(AVG(t.confidence_score), 0.0) AS avg_confidence
FROM triples t
JOIN subjects s         ON s.id  = t.subject_id
JOIN relationships r    ON r.id  = t.relationship_id
JOIN subjects o         ON o.id  = t.object_id
JOIN diagrams d         ON d.id  = t.diagram_id
JOIN categories c       ON c.id  = d.category_id
JOIN root_categories rc ON rc.id = c.root_category_id
WHERE (instr(lower(s.name), lower(?1)) > 0
       OR EXISTS (SELECT 1 FROM json_each(s.synonyms) j
                  WHERE instr(lower(j.value), lower(?1)) > 0))
  AND (instr(lower(r.name), lower(?2)) > 0
       OR instr(lower(r.code), lower(?2)) > 0
       OR instr(lower(coalesce(r.inverse_relationship, '')), lower(?2)) > 0)
  AND (instr(lower(o.name), lower(?3)) > 0
       OR EXISTS (SELECT 1 FROM json_each(o.synonyms) j
                  WHERE instr(lower(j.value), lower(?3)) > 0))
GROUP BY c.id, c.name, rc.name
";

fn search_by_triple(conn: &Connection, query: &TripleQuery) -> Result<Vec<CategoryMatch>> {
  let mut stmt = conn.prepare(TRIPLE_SEARCH)?;
  let mut matches = stmt
    .query_map(
      params![query.subject.trim(), query.relationship.trim(), query.object.trim()],
      |row| {
        let match_count: i64 = row.get(3)?;
        let avg_confidence: f64 = row.get(4)?;
        Ok(CategoryMatch {
          category_id: row.get(0)?,
          category_name: row.get(1)?,
          root_category: row.get(2)?,
          match_count,
          avg_confidence,
          relevance_score: CategoryMatch::relevance(match_count, avg_confidence),
        })
      },
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  matches.sort_by(|a, b| {
    b.relevance_score
      .total_cmp(&a.relevance_score)
      .then(a.category_id.cmp(&b.category_id))
  });
  Ok(matches)
}
