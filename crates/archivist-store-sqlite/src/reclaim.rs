//! Duplicate reclaimer.

use std::collections::HashMap;

use archivist_core::config::ReconcileConfig;
use rusqlite::Connection;
use tracing::info;

use crate::{
  Result,
  archive::delete_live,
  ident::{Ident, TableShape},
  index::computed_keys,
};

/// Collapse the live table to one row per normalized key under the
/// configured key definition.
///
/// The survivor of each group is the row with the greatest surrogate id.
/// The others are deleted through [`delete_live`], so they land in the
/// archive unmodified. Returns the number of rows moved.
pub fn reclaim(conn: &Connection, config: &ReconcileConfig) -> Result<usize> {
  let live = TableShape::load(conn, &Ident::new(&config.table)?)?;
  if !live.exists() {
    return Ok(0);
  }

  // Ascending id order: later rows overwrite earlier ones.
  let keys = computed_keys(conn, config, &live)?;
  let mut survivors: HashMap<&str, i64> = HashMap::with_capacity(keys.len());
  for (id, key) in &keys {
    survivors.insert(key, *id);
  }

  let duplicates: Vec<i64> = keys
    .iter()
    .filter(|(id, key)| survivors.get(key.as_str()) != Some(id))
    .map(|(id, _)| *id)
    .collect();

  let moved = delete_live(conn, config, &duplicates)?;
  if moved > 0 {
    info!(
      moved,
      table = %config.table,
      archive = %config.archive_table(),
      "moved duplicate records to archive"
    );
  }
  Ok(moved)
}
