//! Staging merge.
//!
//! On the first run the bulk loader fills a staging table. Its rows are split
//! in one pass: for each normalized key, the newest row with complete key
//! columns and both entry/active markers goes live; every other row goes to
//! the archive. A live table that already holds rows is left alone and the
//! whole staging table is archived. The staging table is dropped once both
//! inserts succeed.

use archivist_core::{
  config::ReconcileConfig,
  record::{ACTIVE, ENTRY, ID_NUM},
  report::MergeReport,
};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::{
  Error, Result,
  ident::{Ident, TableShape, column_list},
  index::recompute_keys,
  schema::{drop_table, reconcile_columns, sync_schema, table_columns, table_exists},
};

/// `rowid`s of the staging rows that go live.
fn survivor_query(config: &ReconcileConfig, staging: &TableShape) -> Result<String> {
  let key_column = staging.resolve(&config.key_column)?;

  let mut conditions: Vec<String> = config
    .key_columns
    .iter()
    .map(|column| match staging.find(column) {
      Some(c) => format!("{c} IS NOT NULL"),
      // A key column the import never had can't be complete.
      None => "0".to_owned(),
    })
    .collect();
  for marker in [ENTRY, ACTIVE] {
    if let Some(c) = staging.find(marker) {
      conditions.push(format!("{c} IS NOT NULL"));
    }
  }

  Ok(format!(
    "SELECT rid FROM (
         SELECT rowid AS rid,
                ROW_NUMBER() OVER (PARTITION BY {key_column} ORDER BY rowid DESC) AS rn
         FROM {table}
         WHERE {conditions}
     ) WHERE rn = 1",
    table = staging.table(),
    conditions = conditions.join(" AND "),
  ))
}

/// Move the staging table's rows into live and archive, then drop it.
///
/// A missing or empty staging table is a zero-row merge, not an error.
pub fn merge(conn: &Connection, config: &ReconcileConfig) -> Result<MergeReport> {
  let staging_name = config.staging_table();
  if !table_exists(conn, &staging_name)? {
    warn!(staging = %staging_name, "staging table missing; nothing to merge");
    return Ok(MergeReport::default());
  }
  let staging = Ident::new(&staging_name)?;
  let rows: i64 =
    conn.query_row(&format!("SELECT COUNT(*) FROM {staging}"), [], |row| row.get(0))?;
  if rows == 0 {
    warn!(staging = %staging_name, "staging table is empty; nothing to merge");
    drop_table(conn, &staging_name)?;
    return Ok(MergeReport::default());
  }

  // Live and archive must carry every imported column before copying.
  sync_schema(conn, config, &table_columns(conn, &staging_name)?)?;

  // The loader may not have computed keys, or computed them differently.
  reconcile_columns(conn, &staging, std::slice::from_ref(&config.key_column))?;
  recompute_keys(conn, config, &staging, false)?;

  let staging_shape = TableShape::load(conn, &staging)?;
  let live = TableShape::load(conn, &Ident::new(&config.table)?)?;
  let archive = Ident::new(&config.archive_table())?;

  // Identity tokens are store-assigned, so ID and ID_NUM are never copied.
  let pairs: Vec<(&Ident, &Ident)> = staging_shape
    .without_id()
    .filter(|c| !c.matches(ID_NUM))
    .filter_map(|source| live.find(source.name()).map(|target| (target, source)))
    .collect();
  let targets = column_list("", pairs.iter().map(|(target, _)| *target));
  let sources = column_list("", pairs.iter().map(|(_, source)| *source));
  let survivors = survivor_query(config, &staging_shape)?;

  // Rows already live own their keys; the whole import is history then.
  let populated: bool = conn.query_row(
    &format!("SELECT EXISTS (SELECT 1 FROM {})", live.table()),
    [],
    |row| row.get(0),
  )?;
  let (to_live, archive_filter) = if populated {
    warn!(table = %config.table, staging = %staging_name, "live table already holds rows; archiving every staged row");
    (0, String::new())
  } else {
    let to_live = conn
      .execute(
        &format!(
          "INSERT INTO {live} ({targets})
           SELECT {sources} FROM {staging} WHERE rowid IN ({survivors}) ORDER BY rowid",
          live = live.table()
        ),
        [],
      )
      .map_err(Error::write(&config.table))?;
    (to_live, format!("WHERE rowid NOT IN ({survivors})"))
  };

  let to_archive = conn
    .execute(
      &format!("INSERT INTO {archive} ({targets}) SELECT {sources} FROM {staging} {archive_filter} ORDER BY rowid"),
      [],
    )
    .map_err(Error::write(archive.name()))?;

  drop_table(conn, &staging_name)?;
  info!(
    to_live,
    to_archive,
    staging = %staging_name,
    table = %config.table,
    archive = %archive.name(),
    "merged staging table"
  );
  Ok(MergeReport { to_live, to_archive })
}
