//! Identifier allow-list for the handful of statements that must
//! interpolate table and column names.
//!
//! Values are always bound as parameters. Names can only reach SQL as an
//! [`Ident`], which is either validated against `[A-Za-z_][A-Za-z0-9_]*` or
//! taken from schema introspection, and is always emitted double-quoted.

use std::fmt;

use archivist_core::config::is_valid_identifier;
use rusqlite::Connection;

use crate::{Error, Result};

/// A table or column name that is safe to interpolate into SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident(String);

impl Ident {
  /// Validate a configured or caller-supplied name.
  pub fn new(name: &str) -> Result<Self> {
    if is_valid_identifier(name) {
      Ok(Self(name.to_owned()))
    } else {
      Err(archivist_core::Error::InvalidIdentifier(name.to_owned()).into())
    }
  }

  /// Wrap a name read back from the schema. Quoting escapes it, so it does
  /// not need to pass [`Ident::new`].
  fn introspected(name: String) -> Self { Self(name) }

  pub fn name(&self) -> &str { &self.0 }

  pub fn matches(&self, other: &str) -> bool { self.0.eq_ignore_ascii_case(other) }
}

impl fmt::Display for Ident {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "\"{}\"", self.0.replace('"', "\"\""))
  }
}

/// Join identifiers as a comma-separated column list, each prefixed with
/// `prefix` (e.g. `OLD.`).
pub fn column_list<'a>(prefix: &str, columns: impl IntoIterator<Item = &'a Ident>) -> String {
  columns
    .into_iter()
    .map(|c| format!("{prefix}{c}"))
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── Table shape ─────────────────────────────────────────────────────────────

/// The columns a table actually has, as reported by `PRAGMA table_info`.
///
/// This is the allow-list against which caller-supplied column names are
/// resolved.
#[derive(Debug, Clone)]
pub struct TableShape {
  table:   Ident,
  columns: Vec<Ident>,
}

impl TableShape {
  /// Introspect `table`. A missing table yields an empty shape.
  pub fn load(conn: &Connection, table: &Ident) -> Result<Self> {
    let mut stmt =
      conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
      .query_map([table.name()], |row| row.get::<_, String>(0))?
      .map(|name| name.map(Ident::introspected))
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Self { table: table.clone(), columns })
  }

  pub fn table(&self) -> &Ident { &self.table }

  pub fn columns(&self) -> &[Ident] { &self.columns }

  pub fn exists(&self) -> bool { !self.columns.is_empty() }

  pub fn find(&self, name: &str) -> Option<&Ident> {
    self.columns.iter().find(|c| c.matches(name))
  }

  pub fn has(&self, name: &str) -> bool { self.find(name).is_some() }

  /// Resolve `name` to this table's own spelling of the column.
  pub fn resolve(&self, name: &str) -> Result<&Ident> {
    self.find(name).ok_or_else(|| Error::UnknownColumn {
      table:  self.table.name().to_owned(),
      column: name.to_owned(),
    })
  }

  /// Every column except the surrogate `ID`.
  pub fn without_id(&self) -> impl Iterator<Item = &Ident> {
    self
      .columns
      .iter()
      .filter(|c| !c.matches(archivist_core::record::ID))
  }

  /// Entries of `desired` this table lacks, compared case-insensitively.
  pub fn missing<'a>(&self, desired: &'a [String]) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for name in desired {
      let name = name.trim();
      if !self.has(name) && !out.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        out.push(name);
      }
    }
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_rejects_unsafe_names() {
    assert!(Ident::new("MODEL").is_ok());
    assert!(Ident::new("x; DROP TABLE y").is_err());
    assert!(Ident::new("a\"b").is_err());
  }

  #[test]
  fn display_quotes_and_escapes() {
    assert_eq!(Ident::new("ABC").unwrap().to_string(), "\"ABC\"");
    assert_eq!(Ident::introspected("we\"ird".into()).to_string(), "\"we\"\"ird\"");
  }

  #[test]
  fn shape_resolves_case_insensitively() {
    let conn = Connection::open_in_memory().unwrap();
    conn
      .execute_batch("CREATE TABLE t (ID INTEGER PRIMARY KEY, Model TEXT, BRAND TEXT)")
      .unwrap();
    let shape = TableShape::load(&conn, &Ident::new("t").unwrap()).unwrap();

    assert!(shape.exists());
    assert_eq!(shape.resolve("model").unwrap().name(), "Model");
    assert!(matches!(shape.resolve("COLOR"), Err(Error::UnknownColumn { .. })));
    assert_eq!(
      shape.without_id().map(Ident::name).collect::<Vec<_>>(),
      ["Model", "BRAND"]
    );
    let desired = vec!["brand".to_owned(), "COLOR".to_owned(), "color".to_owned()];
    assert_eq!(shape.missing(&desired), ["COLOR"]);
  }

  #[test]
  fn missing_table_has_empty_shape() {
    let conn = Connection::open_in_memory().unwrap();
    let shape = TableShape::load(&conn, &Ident::new("nope").unwrap()).unwrap();
    assert!(!shape.exists());
    assert_eq!(column_list("OLD.", shape.columns()), "");
  }
}
