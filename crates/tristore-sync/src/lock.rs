//! Per-entity advisory locks.
//!
//! A mutation holds the lock for its entity key from before the relational
//! write until after the document write, so two mutations of the same entity
//! never interleave their mirror steps. Unused entries are dropped as soon as
//! the last holder or waiter lets go.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyLocks {
  locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyLocks {
  pub fn new() -> Self { Self::default() }

  /// Wait for exclusive access to `key`.
  pub async fn acquire(&self, key: impl Into<String>) -> KeyGuard<'_> {
    let key = key.into();
    let lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
    let guard = lock.lock_owned().await;
    KeyGuard { locks: self, key, guard: Some(guard) }
  }

  /// Number of keys currently locked or waited on.
  pub fn len(&self) -> usize { self.locks.len() }

  pub fn is_empty(&self) -> bool { self.locks.is_empty() }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
  locks: &'a KeyLocks,
  key:   String,
  guard: Option<OwnedMutexGuard<()>>,
}

impl KeyGuard<'_> {
  pub fn key(&self) -> &str { &self.key }
}

impl Drop for KeyGuard<'_> {
  fn drop(&mut self) {
    self.guard.take();
    // Only the map's own reference left: nobody holds or awaits this key.
    self
      .locks
      .locks
      .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
  }
}
