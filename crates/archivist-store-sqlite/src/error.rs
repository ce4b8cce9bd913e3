//! Error type for `archivist-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] archivist_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  /// A DDL statement failed. The enclosing transaction is rolled back.
  #[error("schema change on {table} failed: {source}")]
  Schema {
    table:  String,
    #[source]
    source: rusqlite::Error,
  },

  #[error("column {column:?} does not exist on {table}")]
  UnknownColumn { table: String, column: String },

  /// Recomputing keys after widening the key definition would give two
  /// live rows the same normalized key.
  #[error(
    "key columns {columns} give rows {first} and {second} of {table} the same key {key:?}; \
     restore the previous key columns or remove one of the rows"
  )]
  KeyCollision {
    table:   String,
    columns: String,
    key:     String,
    first:   i64,
    second:  i64,
  },

  /// A unique-index violation surfaced from a write. The upsert engine's
  /// check-then-act sequence should make this unreachable.
  #[error("unique constraint violated on {table}: {source}")]
  Constraint {
    table:  String,
    #[source]
    source: rusqlite::Error,
  },
}

impl Error {
  /// Wrap a DDL failure on `table`.
  pub(crate) fn schema(table: &str) -> impl FnOnce(rusqlite::Error) -> Self + '_ {
    move |source| Self::Schema { table: table.to_owned(), source }
  }

  /// Classify a write failure on `table`, separating constraint violations.
  pub(crate) fn write(table: &str) -> impl FnOnce(rusqlite::Error) -> Self + '_ {
    move |source| {
      if source.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
        Self::Constraint { table: table.to_owned(), source }
      } else {
        Self::Sqlite(source)
      }
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
