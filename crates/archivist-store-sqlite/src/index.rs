//! Uniqueness index manager.
//!
//! The live table carries a unique index over the normalized-key column.
//! The key definition and exclusion set that produced the stored keys are
//! persisted next to the data; each run compares them with the configuration
//! and, on drift, reclaims duplicates (when keys may merge), recomputes the
//! stored keys and recreates the index.

use std::collections::HashMap;

use archivist_core::{
  config::{ExclusionSet, KeyColumns, ReconcileConfig},
  drift::Drift,
  normalize::normalize_values,
  report::KeyDriftReport,
};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::info;

use crate::{
  Error, Result,
  ident::{Ident, TableShape},
  reclaim::reclaim,
  schema::table_exists,
};

// ─── Index ───────────────────────────────────────────────────────────────────

/// Columns covered by the live index, empty if it does not exist.
pub fn index_columns(conn: &Connection, config: &ReconcileConfig) -> Result<Vec<String>> {
  let mut stmt = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
  let columns = stmt
    .query_map([config.index_name()], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(columns)
}

/// Whether `columns` is exactly the configured key column.
fn covers_key_column(columns: &[String], config: &ReconcileConfig) -> bool {
  matches!(columns, [only] if only.eq_ignore_ascii_case(&config.key_column))
}

/// Create the unique index over the key column. An index of the same name
/// over anything else is replaced.
pub fn ensure_index(conn: &Connection, config: &ReconcileConfig) -> Result<()> {
  let existing = index_columns(conn, config)?;
  if covers_key_column(&existing, config) {
    return Ok(());
  }
  if !existing.is_empty() {
    info!(index = %config.index_name(), columns = %existing.join(","), "replacing index");
    drop_index(conn, config)?;
  }

  let index = Ident::new(&config.index_name())?;
  let live = Ident::new(&config.table)?;
  let key = Ident::new(&config.key_column)?;
  conn
    .execute_batch(&format!("CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {live} ({key})"))
    .map_err(Error::write(live.name()))
}

pub fn drop_index(conn: &Connection, config: &ReconcileConfig) -> Result<()> {
  let index = Ident::new(&config.index_name())?;
  conn
    .execute_batch(&format!("DROP INDEX IF EXISTS {index}"))
    .map_err(Error::schema(&config.table))
}

// ─── Persisted key definition ────────────────────────────────────────────────

pub fn load_key_definition(
  conn: &Connection,
  config: &ReconcileConfig,
) -> Result<Option<KeyColumns>> {
  if !table_exists(conn, &config.key_definition_table())? {
    return Ok(None);
  }
  let table = Ident::new(&config.key_definition_table())?;
  let raw: Option<String> = conn
    .query_row(&format!("SELECT \"COLUMNS\" FROM {table} WHERE \"ID\" = 1"), [], |row| {
      row.get(0)
    })
    .optional()?;
  Ok(raw.as_deref().map(KeyColumns::decode).transpose()?)
}

pub fn store_key_definition(
  conn: &Connection,
  config: &ReconcileConfig,
  columns: &KeyColumns,
) -> Result<()> {
  let table = Ident::new(&config.key_definition_table())?;
  conn.execute(
    &format!(
      "INSERT INTO {table} (\"ID\", \"COLUMNS\") VALUES (1, ?1)
       ON CONFLICT (\"ID\") DO UPDATE SET \"COLUMNS\" = excluded.\"COLUMNS\""
    ),
    [columns.encode()],
  )?;
  Ok(())
}

pub fn load_exclusions(conn: &Connection, config: &ReconcileConfig) -> Result<ExclusionSet> {
  if !table_exists(conn, &config.exclusion_table())? {
    return Ok(ExclusionSet::default());
  }
  let table = Ident::new(&config.exclusion_table())?;
  let mut stmt = conn.prepare(&format!("SELECT \"CODE\" FROM {table} ORDER BY \"CODE\""))?;
  let codes = stmt
    .query_map([], |row| row.get::<_, u32>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(ExclusionSet::from_codes(codes)?)
}

/// Replace the persisted exclusion set with `exclusions`.
pub fn store_exclusions(
  conn: &Connection,
  config: &ReconcileConfig,
  exclusions: &ExclusionSet,
) -> Result<()> {
  let table = Ident::new(&config.exclusion_table())?;
  conn.execute(&format!("DELETE FROM {table}"), [])?;
  let mut stmt = conn.prepare(&format!("INSERT INTO {table} (\"CODE\") VALUES (?1)"))?;
  for code in exclusions.codes() {
    stmt.execute([code])?;
  }
  Ok(())
}

// ─── Key computation ─────────────────────────────────────────────────────────

/// Normalized key of every row of `shape` under the configured key, in
/// ascending rowid order. Key columns the table lacks read as empty.
pub(crate) fn computed_keys(
  conn: &Connection,
  config: &ReconcileConfig,
  shape: &TableShape,
) -> Result<Vec<(i64, String)>> {
  let present: Vec<Option<&Ident>> = config
    .key_columns
    .iter()
    .map(|column| shape.find(column))
    .collect();
  let selected: Vec<&Ident> = present.iter().flatten().copied().collect();

  let sql = format!(
    "SELECT {} FROM {} ORDER BY rowid",
    crate::encode::text_select_list(selected.iter().copied()),
    shape.table()
  );
  let mut stmt = conn.prepare(&sql)?;
  let rows = stmt
    .query_map([], |row| {
      let id: i64 = row.get(0)?;
      let mut values: Vec<Option<String>> = Vec::with_capacity(selected.len());
      for i in 0..selected.len() {
        values.push(row.get(i + 1)?);
      }
      Ok((id, values))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(
    rows
      .into_iter()
      .map(|(id, values)| {
        let mut stored = values.iter();
        let ordered = present.iter().map(|column| match column {
          Some(_) => stored.next().and_then(|v| v.as_deref()),
          None => None,
        });
        (id, normalize_values(ordered, &config.exclusions))
      })
      .collect(),
  )
}

/// Rewrite the key column of `table` from its key columns. With `unique`,
/// fails with [`Error::KeyCollision`] instead of writing colliding keys.
///
/// Returns the number of rows whose stored key changed.
pub fn recompute_keys(
  conn: &Connection,
  config: &ReconcileConfig,
  table: &Ident,
  unique: bool,
) -> Result<usize> {
  let shape = TableShape::load(conn, table)?;
  if !shape.exists() {
    return Ok(0);
  }
  let keys = computed_keys(conn, config, &shape)?;

  if unique {
    let mut seen: HashMap<&str, i64> = HashMap::with_capacity(keys.len());
    for (id, key) in &keys {
      if let Some(first) = seen.insert(key, *id) {
        return Err(Error::KeyCollision {
          table:   table.name().to_owned(),
          columns: config.key_columns.encode(),
          key:     key.clone(),
          first,
          second:  *id,
        });
      }
    }
  }

  let key_column = shape.resolve(&config.key_column)?;
  let mut stmt = conn.prepare(&format!(
    "UPDATE {table} SET {key_column} = ?1 WHERE rowid = ?2 AND {key_column} IS NOT ?1"
  ))?;
  let mut changed = 0;
  for (id, key) in &keys {
    changed += stmt
      .execute(rusqlite::params![key, id])
      .map_err(Error::write(table.name()))?;
  }
  Ok(changed)
}

// ─── Drift ───────────────────────────────────────────────────────────────────

/// Drop the index, optionally reclaim duplicates under the configured key,
/// rewrite live and archive keys, then recreate the index.
///
/// Returns `(recomputed, reclaimed)`.
fn rebuild_keys(conn: &Connection, config: &ReconcileConfig, reclaim_first: bool) -> Result<(usize, usize)> {
  drop_index(conn, config)?;
  let reclaimed = if reclaim_first { reclaim(conn, config)? } else { 0 };
  let live = Ident::new(&config.table)?;
  let archive = Ident::new(&config.archive_table())?;
  let recomputed =
    recompute_keys(conn, config, &live, true)? + recompute_keys(conn, config, &archive, false)?;
  ensure_index(conn, config)?;
  Ok((recomputed, reclaimed))
}

/// Bring the stored keys, the index and the persisted metadata in line with
/// the configured key columns and exclusion set.
///
/// - first run: persist both, then key any rows already present.
/// - key grew: recompute without deleting anything.
/// - key shrank or was replaced, or exclusions were added: reclaim
///   duplicates under the new key first, then recompute.
/// - index missing or over another column (the key column was renamed):
///   reclaim, then recompute into the configured column.
pub fn sync_key_definition(conn: &Connection, config: &ReconcileConfig) -> Result<KeyDriftReport> {
  let Some(persisted_key) = load_key_definition(conn, config)? else {
    store_key_definition(conn, config, &config.key_columns)?;
    store_exclusions(conn, config, &config.exclusions)?;
    // Tables that predate key tracking may hold unkeyed or duplicate rows.
    let (recomputed, reclaimed) = rebuild_keys(conn, config, true)?;
    info!(key = %config.key_columns.encode(), recomputed, reclaimed, "recorded initial key definition");
    return Ok(KeyDriftReport { initialized: true, recomputed, reclaimed, ..KeyDriftReport::default() });
  };
  let persisted_exclusions = load_exclusions(conn, config)?;

  let drift = Drift::between(
    &persisted_key,
    &persisted_exclusions,
    &config.key_columns,
    &config.exclusions,
  );
  let indexed = index_columns(conn, config)?;
  let reindexed = !covers_key_column(&indexed, config);
  if !drift.needs_recompute() && !reindexed {
    return Ok(KeyDriftReport { drift, ..KeyDriftReport::default() });
  }

  if drift.needs_recompute() {
    info!(
      from = %persisted_key.encode(),
      to = %config.key_columns.encode(),
      key = %drift.key,
      exclusions = %drift.exclusions,
      "key definition changed"
    );
    store_key_definition(conn, config, &config.key_columns)?;
    store_exclusions(conn, config, &config.exclusions)?;
  }
  if reindexed {
    info!(
      index = %config.index_name(),
      from = %indexed.join(","),
      to = %config.key_column,
      "index does not cover the key column"
    );
  }

  let (recomputed, reclaimed) = rebuild_keys(conn, config, drift.may_merge_keys() || reindexed)?;
  info!(recomputed, reclaimed, "recomputed normalized keys");
  Ok(KeyDriftReport { initialized: false, reindexed, drift, recomputed, reclaimed })
}
