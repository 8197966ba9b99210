//! Core types and trait definitions for the tristore knowledge graph.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the entity model, the business-key derivation rules, the identifier
//! validator used by graph backends, and the three store traits that the
//! synchronization layer drives.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod code;
pub mod entity;
pub mod error;
pub mod ident;
pub mod label;
pub mod patch;
pub mod record;
pub mod store;

pub use error::{Error, ErrorKind, Result, StoreError};
