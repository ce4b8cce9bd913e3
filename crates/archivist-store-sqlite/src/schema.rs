//! Schema synchronizer.
//!
//! Creates the live and archive tables with an identical shape, creates the
//! key-definition and exclusion metadata tables, and grows every table to a
//! superset of the desired columns. Columns are only ever added. All DDL
//! runs on the caller's connection so it shares the run's transaction.

use archivist_core::{config::ReconcileConfig, record::ID};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::info;

use crate::{
  Error, Result, archive,
  ident::{Ident, TableShape},
};

/// Applied once per connection when the store is opened.
pub(crate) const CONNECTION_PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
";

pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        [name],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

/// Drop `name` if it exists. Returns whether a table was dropped.
pub fn drop_table(conn: &Connection, name: &str) -> Result<bool> {
  if !table_exists(conn, name)? {
    return Ok(false);
  }
  let table = Ident::new(name)?;
  conn
    .execute_batch(&format!("DROP TABLE {table}"))
    .map_err(Error::schema(name))?;
  Ok(true)
}

/// DDL for a live or archive table: surrogate identity plus text columns.
fn record_table_ddl(table: &Ident, columns: &[Ident]) -> String {
  let mut ddl = format!(
    "CREATE TABLE IF NOT EXISTS {table} (\n    \"{ID}\" INTEGER PRIMARY KEY AUTOINCREMENT"
  );
  for column in columns {
    ddl.push_str(&format!(",\n    {column} TEXT"));
  }
  ddl.push_str("\n)");
  ddl
}

/// Create live, archive and metadata tables if absent.
///
/// Idempotent. Returns `true` if neither the live nor the archive table
/// existed before.
pub fn ensure_tables(conn: &Connection, config: &ReconcileConfig) -> Result<bool> {
  let live = Ident::new(&config.table)?;
  let archive_table = Ident::new(&config.archive_table())?;
  let columns = config
    .required_columns()
    .iter()
    .map(|c| Ident::new(c))
    .collect::<Result<Vec<_>>>()?;

  let created = !table_exists(conn, live.name())? && !table_exists(conn, archive_table.name())?;

  for table in [&live, &archive_table] {
    conn
      .execute_batch(&record_table_ddl(table, &columns))
      .map_err(Error::schema(table.name()))?;
  }

  let key_definition = Ident::new(&config.key_definition_table())?;
  let exclusions = Ident::new(&config.exclusion_table())?;
  conn
    .execute_batch(&format!(
      "CREATE TABLE IF NOT EXISTS {key_definition} (
           \"ID\"      INTEGER PRIMARY KEY CHECK (\"ID\" = 1),
           \"COLUMNS\" TEXT NOT NULL
       );
       CREATE TABLE IF NOT EXISTS {exclusions} (
           \"CODE\" INTEGER PRIMARY KEY
       );"
    ))
    .map_err(Error::schema(key_definition.name()))?;

  if created {
    info!(table = %live.name(), archive = %archive_table.name(), "created live and archive tables");
  }
  Ok(created)
}

/// Add every column of `desired` that `table` lacks as a nullable `TEXT`
/// column. Returns the names added. Never removes or renames columns.
pub fn reconcile_columns(
  conn: &Connection,
  table: &Ident,
  desired: &[String],
) -> Result<Vec<String>> {
  let shape = TableShape::load(conn, table)?;
  let mut added = Vec::new();
  for name in shape.missing(desired) {
    if name.eq_ignore_ascii_case(ID) {
      continue;
    }
    let column = Ident::new(&name.to_uppercase())?;
    conn
      .execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} TEXT"))
      .map_err(Error::schema(table.name()))?;
    added.push(column.name().to_owned());
  }
  if !added.is_empty() {
    info!(table = %table.name(), columns = %added.join(","), "added columns");
  }
  Ok(added)
}

/// Grow live and archive to the required columns, `desired` and each other's
/// current columns so both end up with the same shape. Rebuilds the archive
/// trigger when the shape moved and installs the token trigger, which needs
/// `ID_NUM` on the live table.
///
/// Returns the columns added, as `TABLE.COLUMN`.
pub fn sync_schema(
  conn: &Connection,
  config: &ReconcileConfig,
  desired: &[String],
) -> Result<Vec<String>> {
  let live = Ident::new(&config.table)?;
  let archive_table = Ident::new(&config.archive_table())?;

  let mut wanted = config.required_columns();
  wanted.extend_from_slice(desired);
  for table in [&live, &archive_table] {
    let shape = TableShape::load(conn, table)?;
    wanted.extend(shape.without_id().map(|c| c.name().to_owned()));
  }

  let mut added = Vec::new();
  for table in [&live, &archive_table] {
    added.extend(
      reconcile_columns(conn, table, &wanted)?
        .into_iter()
        .map(|c| format!("{}.{c}", table.name())),
    );
  }

  if !added.is_empty() {
    archive::rebuild_archive_trigger(conn, config)?;
  }
  archive::ensure_token_trigger(conn, config)?;
  Ok(added)
}

/// Column names of `name`, excluding `ID`. Empty if the table is missing.
pub fn table_columns(conn: &Connection, name: &str) -> Result<Vec<String>> {
  let shape = TableShape::load(conn, &Ident::new(name)?)?;
  Ok(shape.without_id().map(|c| c.name().to_owned()).collect())
}
