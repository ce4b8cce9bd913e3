//! Record types: the field bags that flow into the upsert engine and the
//! rows that come back out of the live and archive tables.
//!
//! All business values are text. Column names are case-insensitive, so
//! [`Fields`] stores them upper-cased.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

// ─── Reserved columns ────────────────────────────────────────────────────────

/// Surrogate identity, assigned by the store.
pub const ID: &str = "ID";
/// Identity token column (`U_<ID>`).
pub const ID_NUM: &str = "ID_NUM";
/// Date stamp of first entry.
pub const ENTRY: &str = "ENTRY";
/// Date stamp of the last touch.
pub const ACTIVE: &str = "ACTIVE";

/// Prefix of every identity token.
pub const TOKEN_PREFIX: &str = "U_";

/// `strftime` pattern of the `ENTRY` and `ACTIVE` date stamps (`yyMMdd`).
pub const DATE_STAMP_FORMAT: &str = "%y%m%d";

/// Columns whose values are owned by the store rather than the caller.
pub const MARKER_COLUMNS: [&str; 4] = [ID, ID_NUM, ENTRY, ACTIVE];

// ─── Fields ──────────────────────────────────────────────────────────────────

/// Column values for one record, keyed by upper-cased column name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, String>);

impl Fields {
  pub fn new() -> Self { Self::default() }

  /// Set `column` to `value`, returning the previous value if any.
  pub fn insert(
    &mut self,
    column: impl AsRef<str>,
    value: impl Into<String>,
  ) -> Option<String> {
    self.0.insert(column.as_ref().to_uppercase(), value.into())
  }

  pub fn get(&self, column: &str) -> Option<&str> {
    self.0.get(&column.to_uppercase()).map(String::as_str)
  }

  pub fn remove(&mut self, column: &str) -> Option<String> {
    self.0.remove(&column.to_uppercase())
  }

  pub fn columns(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
  K: AsRef<str>,
  V: Into<String>,
{
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    let mut fields = Self::new();
    for (column, value) in iter {
      fields.insert(column, value);
    }
    fields
  }
}

// ─── Identity token ──────────────────────────────────────────────────────────

/// The externally visible identity of a live row: `"U_" + surrogate id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityToken(String);

impl IdentityToken {
  pub fn from_id(id: i64) -> Self { Self(format!("{TOKEN_PREFIX}{id}")) }

  pub fn as_str(&self) -> &str { &self.0 }

  /// The surrogate id this token was minted from, if it is well-formed.
  pub fn surrogate_id(&self) -> Option<i64> {
    self.0.strip_prefix(TOKEN_PREFIX)?.parse().ok()
  }
}

impl From<String> for IdentityToken {
  fn from(s: String) -> Self { Self(s) }
}

impl From<&str> for IdentityToken {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl fmt::Display for IdentityToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Stored rows ─────────────────────────────────────────────────────────────

/// A row read back from the live or archive table.
///
/// `values` holds every non-NULL column except `ID`, including the marker
/// columns and the normalized key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
  pub id:     i64,
  pub values: Fields,
}

impl StoredRecord {
  pub fn get(&self, column: &str) -> Option<&str> { self.values.get(column) }

  pub fn token(&self) -> Option<IdentityToken> {
    self.values.get(ID_NUM).map(IdentityToken::from)
  }

  /// Business values only: the marker columns and `key_column` are dropped.
  pub fn business_values(&self, key_column: &str) -> Fields {
    self
      .values
      .iter()
      .filter(|(column, _)| {
        !MARKER_COLUMNS.contains(column) && !column.eq_ignore_ascii_case(key_column)
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn field_names_are_case_insensitive() {
    let mut fields = Fields::new();
    fields.insert("model", "X");
    assert_eq!(fields.get("MODEL"), Some("X"));
    assert_eq!(fields.get("Model"), Some("X"));
    assert_eq!(fields.columns().collect::<Vec<_>>(), ["MODEL"]);
  }

  #[test]
  fn token_carries_surrogate_id() {
    let token = IdentityToken::from_id(42);
    assert_eq!(token.as_str(), "U_42");
    assert_eq!(token.surrogate_id(), Some(42));
    assert_eq!(IdentityToken::from("X_1").surrogate_id(), None);
  }

  #[test]
  fn business_values_skip_markers_and_key() {
    let record = StoredRecord {
      id:     1,
      values: [
        ("ID_NUM", "U_1"),
        ("ACTIVE", "240101"),
        ("INDEX_COLUMN", "XY"),
        ("MODEL", "X"),
      ]
      .into_iter()
      .collect(),
    };
    let business = record.business_values("INDEX_COLUMN");
    assert_eq!(business.iter().collect::<Vec<_>>(), [("MODEL", "X")]);
    assert_eq!(record.token(), Some(IdentityToken::from("U_1")));
  }
}
