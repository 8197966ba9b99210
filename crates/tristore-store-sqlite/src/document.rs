//! [`SqliteDocumentStore`]: schemaless JSON documents and the query log.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, params};
use serde_json::{Map, Value};
use tristore_core::store::{Document, DocumentStore, NewQueryLog, QueryLog, QueryType};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{decode_dt, decode_json, decode_object, encode_dt, encode_json, encode_object, merge_into},
  schema,
};

/// Key under which every document records its own sync id.
pub const SYNC_ID_FIELD: &str = "_sync_id";

#[derive(Clone)]
pub struct SqliteDocumentStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteDocumentStore {
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
        conn.execute_batch(schema::DOCUMENT)?;
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

struct RawDocument {
  collection: String,
  sync_id:    String,
  body:       String,
  updated_at: String,
}

impl RawDocument {
  fn into_document(self) -> Result<Document> {
    Ok(Document {
      collection: self.collection,
      sync_id:    self.sync_id,
      body:       decode_object(&self.body)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

struct RawQueryLog {
  log_id:      String,
  query_type:  String,
  input:       String,
  triples:     String,
  recorded_at: String,
}

impl RawQueryLog {
  fn into_log(self) -> Result<QueryLog> {
    let query_type: QueryType = self
      .query_type
      .parse()
      .map_err(|_| Error::Decode(format!("unknown query type {:?}", self.query_type)))?;
    Ok(QueryLog {
      log_id: Uuid::parse_str(&self.log_id)
        .map_err(|e| Error::Decode(format!("log id: {e}")))?,
      query_type,
      input: decode_json(&self.input)?,
      triples: serde_json::from_str(&self.triples)?,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

impl DocumentStore for SqliteDocumentStore {
  type Error = Error;

  async fn upsert(
    &self,
    collection: &str,
    sync_id: &str,
    fields: Map<String, Value>,
  ) -> Result<Document> {
    let (collection, sync_id) = (collection.to_owned(), sync_id.to_owned());
    let now = Utc::now();

    let raw = self
      .run(move |conn| {
        let existing: Option<String> = conn
          .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND sync_id = ?2",
            params![collection, sync_id],
            |row| row.get(0),
          )
          .optional()?;

        let mut body = match existing {
          Some(s) => decode_object(&s)?,
          None => Map::new(),
        };
        merge_into(&mut body, fields);
        body.insert(SYNC_ID_FIELD.into(), Value::String(sync_id.clone()));
        body.insert("updated_at".into(), Value::String(encode_dt(now)));
        let encoded = encode_object(&body)?;

        conn.execute(
          "INSERT INTO documents (collection, sync_id, body, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (collection, sync_id) DO UPDATE SET
             body = excluded.body, updated_at = excluded.updated_at",
          params![collection, sync_id, encoded, encode_dt(now)],
        )?;
        Ok(RawDocument { collection, sync_id, body: encoded, updated_at: encode_dt(now) })
      })
      .await?;

    tracing::debug!(collection = %raw.collection, sync_id = %raw.sync_id, "document upserted");
    raw.into_document()
  }

  async fn get(&self, collection: &str, sync_id: &str) -> Result<Option<Document>> {
    let (collection, sync_id) = (collection.to_owned(), sync_id.to_owned());
    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT collection, sync_id, body, updated_at FROM documents
               WHERE collection = ?1 AND sync_id = ?2",
              params![collection, sync_id],
              |row| {
                Ok(RawDocument {
                  collection: row.get(0)?,
                  sync_id:    row.get(1)?,
                  body:       row.get(2)?,
                  updated_at: row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn find_many(&self, collection: &str, sync_ids: &[String]) -> Result<Vec<Document>> {
    if sync_ids.is_empty() {
      return Ok(Vec::new());
    }
    let collection = collection.to_owned();
    let ids = encode_json(&Value::from(sync_ids.to_vec()))?;

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT collection, sync_id, body, updated_at FROM documents
           WHERE collection = ?1 AND sync_id IN (SELECT value FROM json_each(?2))
           ORDER BY sync_id",
        )?;
        let rows = stmt
          .query_map(params![collection, ids], |row| {
            Ok(RawDocument {
              collection: row.get(0)?,
              sync_id:    row.get(1)?,
              body:       row.get(2)?,
              updated_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  async fn find_where(
    &self,
    collection: &str,
    field: &str,
    value: &Value,
  ) -> Result<Vec<Document>> {
    let collection = collection.to_owned();
    let path = format!("$.\"{}\"", field.replace('"', ""));
    let value = encode_json(value)?;

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT collection, sync_id, body, updated_at FROM documents
           WHERE collection = ?1 AND json_extract(body, ?2) = json_extract(?3, '$')
           ORDER BY updated_at, sync_id",
        )?;
        let rows = stmt
          .query_map(params![collection, path, value], |row| {
            Ok(RawDocument {
              collection: row.get(0)?,
              sync_id:    row.get(1)?,
              body:       row.get(2)?,
              updated_at: row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  async fn delete(&self, collection: &str, sync_id: &str) -> Result<bool> {
    let (collection, sync_id) = (collection.to_owned(), sync_id.to_owned());
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM documents WHERE collection = ?1 AND sync_id = ?2",
          params![collection, sync_id],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }

  async fn log_query(&self, entry: NewQueryLog) -> Result<QueryLog> {
    let log = QueryLog {
      log_id:      Uuid::new_v4(),
      query_type:  entry.query_type,
      input:       entry.input,
      triples:     entry.triples,
      recorded_at: Utc::now(),
    };

    let id_str = log.log_id.hyphenated().to_string();
    let type_str = log.query_type.to_string();
    let input_str = encode_json(&log.input)?;
    let triples_str = serde_json::to_string(&log.triples)?;
    let at_str = encode_dt(log.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO query_logs (log_id, query_type, input, triples, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![id_str, type_str, input_str, triples_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(log)
  }

  async fn query_logs(&self, limit: usize) -> Result<Vec<QueryLog>> {
    let limit = limit as i64;
    let raws: Vec<RawQueryLog> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT log_id, query_type, input, triples, recorded_at FROM query_logs
           ORDER BY seq DESC LIMIT ?1",
        )?;
        let rows = stmt
          .query_map([limit], |row| {
            Ok(RawQueryLog {
              log_id:      row.get(0)?,
              query_type:  row.get(1)?,
              input:       row.get(2)?,
              triples:     row.get(3)?,
              recorded_at: row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawQueryLog::into_log).collect()
  }
}
