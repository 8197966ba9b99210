//! Validated identifiers for graph labels and edge types.
//!
//! Graph engines cannot bind labels or relationship types as parameters, so
//! they end up embedded in statement text. [`Ident`] is the only way to name
//! a label or edge type anywhere in the graph API, and it can only be built
//! from a string matching `^[A-Za-z_][A-Za-z0-9_]*$`.

use std::{borrow::Cow, fmt};

use serde::Serialize;

use crate::{Error, Result};

/// A label or edge-type name that passed the identifier check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Ident(Cow<'static, str>);

impl Ident {
  /// Build an identifier from a literal. Invalid literals fail at compile
  /// time when used in a `const`.
  pub const fn from_static(s: &'static str) -> Self {
    assert!(is_identifier(s), "invalid graph identifier literal");
    Self(Cow::Borrowed(s))
  }

  /// Validate an untrusted string.
  pub fn new(s: impl Into<String>) -> Result<Self> {
    let s = s.into();
    if is_identifier(&s) {
      Ok(Self(Cow::Owned(s)))
    } else {
      Err(Error::IdentifierRejected(s))
    }
  }

  /// Map a relationship code such as `TRP-EATS` to the edge type used for its
  /// triples (`TRP_EATS`). Anything other than `-` must already be valid.
  pub fn for_relationship_code(code: &str) -> Result<Self> {
    Self::new(code.replace('-', "_"))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Ident {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl AsRef<str> for Ident {
  fn as_ref(&self) -> &str { &self.0 }
}

/// `^[A-Za-z_][A-Za-z0-9_]*$`
pub const fn is_identifier(s: &str) -> bool {
  let bytes = s.as_bytes();
  if bytes.is_empty() {
    return false;
  }
  let mut i = 0;
  while i < bytes.len() {
    let c = bytes[i];
    let ok = c == b'_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit());
    if !ok {
      return false;
    }
    i += 1;
  }
  true
}
