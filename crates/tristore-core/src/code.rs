//! Business-key derivation.
//!
//! Codes are deterministic, human-readable identifiers that match the same
//! logical entity across all three stores independently of auto-increment
//! ids. Every function here is pure: the same inputs always yield the same
//! code, and [`derive_root_code`] is a fixed point on its own output.

/// Longest code that [`derive_root_code`] passes through or produces.
pub const MAX_ROOT_CODE_LEN: usize = 6;

const ROOT_CODE_FILL: char = 'X';

/// Derive the short code of a root category or root subject.
///
/// 1. A raw value already shaped like a code (`[A-Z0-9_]{1,6}`) is kept.
/// 2. Otherwise the initials of its alphanumeric tokens are used when there
///    are at least three of them (capped at six).
/// 3. Otherwise the alphanumerics are uppercased and truncated, or padded
///    with `X`, to exactly three characters.
pub fn derive_root_code(raw: &str) -> String {
  if is_root_code(raw) {
    return raw.to_owned();
  }

  let initials: String = raw
    .split(|c: char| !c.is_ascii_alphanumeric())
    .filter_map(|token| token.chars().next())
    .map(|c| c.to_ascii_uppercase())
    .take(MAX_ROOT_CODE_LEN)
    .collect();
  if initials.len() >= 3 {
    return initials;
  }

  let mut code: String = raw
    .chars()
    .filter(char::is_ascii_alphanumeric)
    .map(|c| c.to_ascii_uppercase())
    .take(3)
    .collect();
  while code.len() < 3 {
    code.push(ROOT_CODE_FILL);
  }
  code
}

/// Whether `s` matches `[A-Z0-9_]{1,6}`.
pub fn is_root_code(s: &str) -> bool {
  (1..=MAX_ROOT_CODE_LEN).contains(&s.len())
    && s
      .bytes()
      .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// `CAT-{root_code}-{level}`
pub fn derive_category_code(root_code: &str, level: i64) -> String {
  format!("CAT-{root_code}-{level}")
}

/// Prefix shared by every subject code under `root_code`.
pub fn subject_code_prefix(root_code: &str) -> String { format!("SUB-{root_code}-") }

/// Next subject code under `root_code`, given the codes already in use.
///
/// The sequence continues from the highest suffix in `existing`, so gaps left
/// by deletions are never filled. Callers that must not reissue a deleted
/// highest code include the last code they issued in `existing`.
pub fn derive_subject_code<'a>(
  root_code: &str,
  existing: impl IntoIterator<Item = &'a str>,
) -> String {
  let prefix = subject_code_prefix(root_code);
  let highest = existing
    .into_iter()
    .filter_map(|code| code.strip_prefix(prefix.as_str()))
    .filter_map(|suffix| suffix.parse::<u32>().ok())
    .max()
    .unwrap_or(0);
  format!("{prefix}{:03}", highest + 1)
}

/// Derive a relationship code from its semantic type and name, e.g.
/// `("trophic", "eats")` becomes `TRP-EATS` and `(None, "part of")` becomes
/// `PARTOF`.
pub fn derive_relationship_code(semantic_type: Option<&str>, name: &str) -> String {
  let cleaned = clean_upper(name);
  match semantic_type.and_then(abbreviate) {
    Some(prefix) => format!("{prefix}-{cleaned}"),
    None => cleaned,
  }
}

/// `{subject_code}_{relationship_code}_{object_code}`
pub fn derive_triple_code(
  subject_code: &str,
  relationship_code: &str,
  object_code: &str,
) -> String {
  format!("{subject_code}_{relationship_code}_{object_code}")
}

/// Uppercased ASCII alphanumerics of `s`.
pub fn clean_upper(s: &str) -> String {
  s.chars()
    .filter(char::is_ascii_alphanumeric)
    .map(|c| c.to_ascii_uppercase())
    .collect()
}

/// Three-letter abbreviation of a semantic type: the leading character
/// followed by the next consonants (`trophic` → `TRP`). Falls back to the
/// plain leading characters when there are too few consonants.
fn abbreviate(semantic_type: &str) -> Option<String> {
  let cleaned: Vec<char> = clean_upper(semantic_type).chars().collect();
  let (first, rest) = cleaned.split_first()?;

  let mut abbrev = vec![*first];
  abbrev.extend(rest.iter().filter(|c| !matches!(c, 'A' | 'E' | 'I' | 'O' | 'U')));
  if abbrev.len() < 3 {
    abbrev = cleaned.clone();
  }
  Some(abbrev.into_iter().take(3).collect())
}
