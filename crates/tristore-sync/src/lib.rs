//! Cross-store synchronization for tristore.
//!
//! The [`Orchestrator`] runs every mutation as a saga: the relational store
//! commits first and hands out ids and codes, then the graph mirror and the
//! document mirror follow. A failed mirror step triggers the compensation
//! policy and the outcome in every store is reported in a [`SyncReport`].
//!
//! The [`QueryEngine`] answers subject–relationship–object queries by fanning
//! out to all three stores and merging what comes back.

pub mod error;
pub mod inference;
pub mod lock;
pub mod mirror;
pub mod orchestrator;
pub mod query;
pub mod saga;

pub use error::{Result, SyncError};
pub use orchestrator::{Orchestrator, SyncedRecord};
pub use query::{QueryEngine, SubjectInference, TripleSearch};
pub use saga::{SagaState, StoreFailure, StoreKind, StoreStatus, SyncReport};

#[cfg(test)]
mod tests;
