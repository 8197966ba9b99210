//! SQLite backends for the three tristore stores.
//!
//! Each store owns its own database through [`tokio_rusqlite`], so all
//! database access runs on a dedicated thread without blocking the async
//! runtime, and the relational, graph and document stores fail independently.

mod encode;
mod rows;
mod schema;
mod statement;

pub mod document;
pub mod error;
pub mod graph;
pub mod relational;

pub use document::SqliteDocumentStore;
pub use error::{Error, Result};
pub use graph::SqliteGraphStore;
pub use relational::SqliteRelationalStore;
use tristore_core::store::{Backend, Stores};

/// The all-SQLite [`Backend`].
pub struct Sqlite;

impl Backend for Sqlite {
  type Relational = SqliteRelationalStore;
  type Graph = SqliteGraphStore;
  type Document = SqliteDocumentStore;
}

/// Open all three stores at the given paths.
pub async fn open(
  relational: impl AsRef<std::path::Path>,
  graph: impl AsRef<std::path::Path>,
  document: impl AsRef<std::path::Path>,
) -> Result<Stores<Sqlite>> {
  Ok(Stores::new(
    SqliteRelationalStore::open(relational).await?,
    SqliteGraphStore::open(graph).await?,
    SqliteDocumentStore::open(document).await?,
  ))
}

/// Three fresh in-memory stores.
pub async fn open_in_memory() -> Result<Stores<Sqlite>> {
  Ok(Stores::new(
    SqliteRelationalStore::open_in_memory().await?,
    SqliteGraphStore::open_in_memory().await?,
    SqliteDocumentStore::open_in_memory().await?,
  ))
}

#[cfg(test)]
mod tests;
