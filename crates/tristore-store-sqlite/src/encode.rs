//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings. Sets and JSON objects are stored
//! as compact JSON text.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── String sets ─────────────────────────────────────────────────────────────

pub fn encode_set(set: &BTreeSet<String>) -> Result<String> {
  Ok(serde_json::to_string(set)?)
}

pub fn decode_set(s: &str) -> Result<BTreeSet<String>> { Ok(serde_json::from_str(s)?) }

// ─── JSON ────────────────────────────────────────────────────────────────────

pub fn encode_json(value: &Value) -> Result<String> { Ok(serde_json::to_string(value)?) }

pub fn decode_json(s: &str) -> Result<Value> { Ok(serde_json::from_str(s)?) }

pub fn encode_object(map: &Map<String, Value>) -> Result<String> {
  Ok(serde_json::to_string(map)?)
}

pub fn decode_object(s: &str) -> Result<Map<String, Value>> { Ok(serde_json::from_str(s)?) }

/// Shallow merge: every key of `patch` overwrites the same key of `target`.
pub fn merge_into(target: &mut Map<String, Value>, patch: Map<String, Value>) {
  for (k, v) in patch {
    target.insert(k, v);
  }
}
