//! The reconciliation configuration record.
//!
//! Loaded once at process start, validated, then passed by reference into
//! every component. Nothing reads configuration from ambient state; the
//! persisted key definition and exclusion set are compared against this
//! value to detect drift (see [`crate::drift`]).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  record::{ACTIVE, ENTRY, ID, ID_NUM, MARKER_COLUMNS},
};

/// Whether `name` can be interpolated into SQL as an identifier.
///
/// Accepts `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_identifier(name: &str) -> Result<()> {
  if is_valid_identifier(name) {
    Ok(())
  } else {
    Err(Error::InvalidIdentifier(name.to_owned()))
  }
}

// ─── Key columns ─────────────────────────────────────────────────────────────

/// Ordered, non-empty list of upper-cased column names whose normalized
/// concatenation must be unique across the live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct KeyColumns(Vec<String>);

impl KeyColumns {
  pub fn new<I, S>(columns: I) -> Result<Self>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let mut out: Vec<String> = Vec::new();
    for column in columns {
      let column = column.as_ref().trim().to_uppercase();
      check_identifier(&column)?;
      if out.contains(&column) {
        return Err(Error::InvalidConfig(format!(
          "key column {column} listed more than once"
        )));
      }
      out.push(column);
    }
    if out.is_empty() {
      return Err(Error::InvalidConfig("at least one key column is required".into()));
    }
    Ok(Self(out))
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> { self.0.iter().map(String::as_str) }

  pub fn as_slice(&self) -> &[String] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn contains(&self, column: &str) -> bool {
    self.0.iter().any(|c| c.eq_ignore_ascii_case(column))
  }

  /// Comma-joined form, as persisted in the key-definition table.
  pub fn encode(&self) -> String { self.0.join(",") }

  pub fn decode(s: &str) -> Result<Self> {
    Self::new(s.split(',').map(str::trim).filter(|c| !c.is_empty()))
  }
}

impl TryFrom<Vec<String>> for KeyColumns {
  type Error = Error;

  fn try_from(columns: Vec<String>) -> Result<Self> { Self::new(columns) }
}

impl From<KeyColumns> for Vec<String> {
  fn from(columns: KeyColumns) -> Self { columns.0 }
}

// ─── Exclusion set ───────────────────────────────────────────────────────────

/// Characters stripped from raw key input during normalization.
///
/// Deserializes from either a string (`"^ -"`) or a list of one-character
/// strings (`["^", " ", "-"]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawExclusions", into = "String")]
pub struct ExclusionSet(BTreeSet<char>);

/// Accepted input shapes for [`ExclusionSet`].
#[derive(Deserialize)]
#[serde(untagged)]
pub enum RawExclusions {
  Text(String),
  Chars(Vec<String>),
}

impl ExclusionSet {
  pub fn new(chars: impl IntoIterator<Item = char>) -> Self {
    Self(chars.into_iter().collect())
  }

  /// Rebuild a set from persisted Unicode scalar values.
  pub fn from_codes(codes: impl IntoIterator<Item = u32>) -> Result<Self> {
    codes
      .into_iter()
      .map(|code| char::from_u32(code).ok_or(Error::InvalidExclusionCode(code)))
      .collect::<Result<BTreeSet<_>>>()
      .map(Self)
  }

  pub fn codes(&self) -> Vec<u32> { self.0.iter().map(|c| u32::from(*c)).collect() }

  pub fn contains(&self, c: char) -> bool { self.0.contains(&c) }

  pub fn iter(&self) -> impl Iterator<Item = char> + '_ { self.0.iter().copied() }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn is_subset(&self, other: &Self) -> bool { self.0.is_subset(&other.0) }
}

impl TryFrom<RawExclusions> for ExclusionSet {
  type Error = Error;

  fn try_from(raw: RawExclusions) -> Result<Self> {
    match raw {
      RawExclusions::Text(s) => Ok(Self::new(s.chars())),
      RawExclusions::Chars(items) => {
        let mut set = BTreeSet::new();
        for item in items {
          let mut chars = item.chars();
          match (chars.next(), chars.next()) {
            (Some(c), None) => {
              set.insert(c);
            }
            _ => {
              return Err(Error::InvalidConfig(format!(
                "exclusion entries must be single characters, got {item:?}"
              )));
            }
          }
        }
        Ok(Self(set))
      }
    }
  }
}

impl From<ExclusionSet> for String {
  fn from(set: ExclusionSet) -> Self { set.0.into_iter().collect() }
}

// ─── Reconcile configuration ─────────────────────────────────────────────────

/// Everything the engine needs to know about the tables it manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
  /// Live table name.
  pub table:         String,
  /// Archive table name; defaults to `BACKUP_<table>`.
  pub archive_table: Option<String>,
  /// Staging table name; defaults to `<table>_TEMP`.
  pub staging_table: Option<String>,
  /// Name of the normalized-key column.
  pub key_column:    String,
  pub key_columns:   KeyColumns,
  pub exclusions:    ExclusionSet,
  /// Desired business columns. Marker columns may be listed; they are
  /// always present regardless.
  pub columns:       Vec<String>,
}

impl Default for ReconcileConfig {
  fn default() -> Self {
    Self {
      table:         "ABC".into(),
      archive_table: None,
      staging_table: None,
      key_column:    "INDEX_COLUMN".into(),
      key_columns:   KeyColumns(vec!["MODEL".into(), "BRAND".into()]),
      exclusions:    ExclusionSet::new(['^', ' ', '-']),
      columns:       [ID_NUM, ENTRY, ACTIVE, "MODEL", "BRAND"]
        .into_iter()
        .map(str::to_owned)
        .collect(),
    }
  }
}

impl ReconcileConfig {
  pub fn archive_table(&self) -> String {
    self
      .archive_table
      .clone()
      .unwrap_or_else(|| format!("BACKUP_{}", self.table))
  }

  pub fn staging_table(&self) -> String {
    self
      .staging_table
      .clone()
      .unwrap_or_else(|| format!("{}_TEMP", self.table))
  }

  pub fn index_name(&self) -> String { format!("{}_IDX", self.table) }

  pub fn archive_trigger(&self) -> String { format!("{}_BACKUP_DELETED", self.table) }

  pub fn token_trigger(&self) -> String { format!("{}_POPULATE_ID", self.table) }

  pub fn key_definition_table(&self) -> String { format!("{}_KEY_DEFINITION", self.table) }

  pub fn exclusion_table(&self) -> String { format!("{}_EXCLUDED_CHARS", self.table) }

  /// Every column the live and archive tables must carry besides `ID`:
  /// marker columns, the normalized-key column, the key columns and the
  /// configured business columns, upper-cased and de-duplicated in order.
  pub fn required_columns(&self) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let candidates = [ID_NUM, ENTRY, ACTIVE, self.key_column.as_str()]
      .into_iter()
      .chain(self.key_columns.iter())
      .chain(self.columns.iter().map(String::as_str));
    for column in candidates {
      let column = column.trim().to_uppercase();
      if column != ID && !out.contains(&column) {
        out.push(column);
      }
    }
    out
  }

  /// Required columns minus the markers and the normalized-key column.
  pub fn business_columns(&self) -> Vec<String> {
    self
      .required_columns()
      .into_iter()
      .filter(|c| !MARKER_COLUMNS.contains(&c.as_str()) && !c.eq_ignore_ascii_case(&self.key_column))
      .collect()
  }

  pub fn validate(&self) -> Result<()> {
    for name in [
      self.table.clone(),
      self.archive_table(),
      self.staging_table(),
      self.key_column.clone(),
    ] {
      check_identifier(&name)?;
    }
    for column in &self.columns {
      check_identifier(column.trim())?;
    }

    let names = [
      self.table.to_uppercase(),
      self.archive_table().to_uppercase(),
      self.staging_table().to_uppercase(),
    ];
    if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
      return Err(Error::InvalidConfig(
        "live, archive and staging tables must be distinct".into(),
      ));
    }

    if MARKER_COLUMNS.iter().any(|m| m.eq_ignore_ascii_case(&self.key_column)) {
      return Err(Error::InvalidConfig(format!(
        "key column {} collides with a marker column",
        self.key_column
      )));
    }
    for column in self.key_columns.iter() {
      if MARKER_COLUMNS.contains(&column) || column.eq_ignore_ascii_case(&self.key_column) {
        return Err(Error::InvalidConfig(format!(
          "{column} cannot be part of the uniqueness key"
        )));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_validate() {
    let config = ReconcileConfig::default();
    config.validate().unwrap();
    assert_eq!(config.archive_table(), "BACKUP_ABC");
    assert_eq!(config.staging_table(), "ABC_TEMP");
    assert_eq!(config.index_name(), "ABC_IDX");
  }

  #[test]
  fn required_columns_are_deduplicated_and_exclude_id() {
    let config = ReconcileConfig {
      columns: vec!["id".into(), "model".into(), "Color".into()],
      ..ReconcileConfig::default()
    };
    assert_eq!(config.required_columns(), [
      "ID_NUM",
      "ENTRY",
      "ACTIVE",
      "INDEX_COLUMN",
      "MODEL",
      "BRAND",
      "COLOR"
    ]);
    assert_eq!(config.business_columns(), ["MODEL", "BRAND", "COLOR"]);
  }

  #[test]
  fn key_columns_reject_duplicates_and_empties() {
    assert!(KeyColumns::new(["MODEL", "model"]).is_err());
    assert!(KeyColumns::new(Vec::<String>::new()).is_err());
    assert!(KeyColumns::new(["bad name"]).is_err());
    let cols = KeyColumns::decode("MODEL, BRAND").unwrap();
    assert_eq!(cols.encode(), "MODEL,BRAND");
  }

  #[test]
  fn marker_columns_cannot_be_keys() {
    let config = ReconcileConfig {
      key_columns: KeyColumns::new(["ACTIVE"]).unwrap(),
      ..ReconcileConfig::default()
    };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
  }

  #[test]
  fn identifiers() {
    assert!(is_valid_identifier("ABC_TEMP"));
    assert!(is_valid_identifier("_x1"));
    assert!(!is_valid_identifier("1abc"));
    assert!(!is_valid_identifier("a\"b"));
    assert!(!is_valid_identifier(""));
  }

  #[test]
  fn exclusions_deserialize_from_string_or_list() {
    let from_text: ExclusionSet = serde_json::from_str("\"^ -\"").unwrap();
    let from_list: ExclusionSet = serde_json::from_str(r#"["^", " ", "-"]"#).unwrap();
    assert_eq!(from_text, from_list);
    assert!(from_text.contains(' '));
    assert!(serde_json::from_str::<ExclusionSet>(r#"["ab"]"#).is_err());
  }

  #[test]
  fn exclusion_codes_roundtrip() {
    let set = ExclusionSet::new(['-', ' ']);
    assert_eq!(set.codes(), [32, 45]);
    assert_eq!(ExclusionSet::from_codes(set.codes()).unwrap(), set);
    assert!(ExclusionSet::from_codes([0xD800]).is_err());
  }
}
