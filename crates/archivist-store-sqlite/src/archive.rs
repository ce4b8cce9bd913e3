//! The archive-on-delete guarantee.
//!
//! An `AFTER DELETE` trigger on the live table copies every deleted row into
//! the archive. The trigger's copy-list is fixed when it is created, so it is
//! rebuilt whenever the archive's shape changes, and re-checked by
//! [`delete_live`] before every delete. All live deletions in this crate go
//! through [`delete_live`].

use archivist_core::{
  config::ReconcileConfig,
  record::{ID, ID_NUM, TOKEN_PREFIX},
};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::{debug, info};

use crate::{
  Error, Result,
  ident::{Ident, TableShape, column_list},
};

/// The `INSERT` the archive trigger runs, built from the current shapes.
///
/// Copies every archive column the live table also has, except `ID`: the
/// archive assigns its own surrogate ids, while `ID_NUM` keeps the token.
fn archive_copy_statement(conn: &Connection, config: &ReconcileConfig) -> Result<String> {
  let live = TableShape::load(conn, &Ident::new(&config.table)?)?;
  let archive = TableShape::load(conn, &Ident::new(&config.archive_table())?)?;
  let columns: Vec<&Ident> = archive.without_id().filter(|c| live.has(c.name())).collect();
  Ok(format!(
    "INSERT INTO {} ({}) VALUES ({});",
    archive.table(),
    column_list("", columns.iter().copied()),
    column_list("OLD.", columns.iter().copied()),
  ))
}

fn trigger_sql(conn: &Connection, name: &str) -> Result<Option<String>> {
  Ok(
    conn
      .query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'trigger' AND name = ?1 COLLATE NOCASE",
        [name],
        |row| row.get(0),
      )
      .optional()?,
  )
}

pub fn trigger_exists(conn: &Connection, name: &str) -> Result<bool> {
  Ok(trigger_sql(conn, name)?.is_some())
}

fn create_archive_trigger(conn: &Connection, config: &ReconcileConfig, copy: &str) -> Result<()> {
  let trigger = Ident::new(&config.archive_trigger())?;
  let live = Ident::new(&config.table)?;
  conn
    .execute_batch(&format!(
      "CREATE TRIGGER {trigger}
       AFTER DELETE ON {live}
       FOR EACH ROW
       BEGIN
           {copy}
       END;"
    ))
    .map_err(Error::schema(live.name()))
}

/// Create the archive trigger, or rebuild it if its copy-list no longer
/// matches the archive's shape.
pub fn ensure_archive_trigger(conn: &Connection, config: &ReconcileConfig) -> Result<()> {
  let copy = archive_copy_statement(conn, config)?;
  match trigger_sql(conn, &config.archive_trigger())? {
    Some(existing) if existing.contains(&copy) => Ok(()),
    Some(_) => {
      debug!(trigger = %config.archive_trigger(), "archive trigger is stale");
      rebuild_archive_trigger(conn, config)
    }
    None => create_archive_trigger(conn, config, &copy),
  }
}

/// Drop and recreate the archive trigger against the current shapes.
pub fn rebuild_archive_trigger(conn: &Connection, config: &ReconcileConfig) -> Result<()> {
  let trigger = Ident::new(&config.archive_trigger())?;
  conn
    .execute_batch(&format!("DROP TRIGGER IF EXISTS {trigger}"))
    .map_err(Error::schema(&config.table))?;
  let copy = archive_copy_statement(conn, config)?;
  create_archive_trigger(conn, config, &copy)?;
  info!(trigger = %trigger.name(), archive = %config.archive_table(), "rebuilt archive trigger");
  Ok(())
}

/// Create the trigger that stamps `ID_NUM = 'U_' || ID` on every live insert.
pub fn ensure_token_trigger(conn: &Connection, config: &ReconcileConfig) -> Result<()> {
  let trigger = Ident::new(&config.token_trigger())?;
  let live = Ident::new(&config.table)?;
  conn
    .execute_batch(&format!(
      "CREATE TRIGGER IF NOT EXISTS {trigger}
       AFTER INSERT ON {live}
       FOR EACH ROW
       BEGIN
           UPDATE {live} SET \"{ID_NUM}\" = '{TOKEN_PREFIX}' || NEW.\"{ID}\" WHERE \"{ID}\" = NEW.\"{ID}\";
       END;"
    ))
    .map_err(Error::schema(live.name()))
}

/// Delete live rows by surrogate id. Each row is copied into the archive by
/// the trigger, which is (re)asserted first. Returns the number deleted.
pub fn delete_live(conn: &Connection, config: &ReconcileConfig, ids: &[i64]) -> Result<usize> {
  if ids.is_empty() {
    return Ok(0);
  }
  ensure_archive_trigger(conn, config)?;

  let live = Ident::new(&config.table)?;
  let mut stmt = conn.prepare_cached(&format!("DELETE FROM {live} WHERE \"{ID}\" = ?1"))?;
  let mut deleted = 0;
  for id in ids {
    deleted += stmt.execute([id])?;
  }
  Ok(deleted)
}
