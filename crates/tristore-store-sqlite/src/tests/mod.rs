//! Integration tests for the SQLite stores against in-memory databases.

mod graph;
