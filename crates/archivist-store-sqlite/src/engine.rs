//! One reconciliation run.
//!
//! [`run`] performs every step of a run on one connection. Callers wrap it
//! in a single transaction (see [`crate::SqliteStore::run`]) so a failure
//! anywhere rolls back schema, index, archive, merge and upsert changes
//! together. Every step is idempotent, so the recovery for a failed run is
//! simply running it again.

use archivist_core::{
  config::ReconcileConfig,
  record::ID,
  report::{RunReport, UpsertTally},
  store::RunPlan,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;

use crate::{
  Result,
  archive::ensure_archive_trigger,
  index::sync_key_definition,
  merge::merge,
  schema::{ensure_tables, sync_schema, table_columns},
  upsert::Upserter,
};

/// Columns the run needs on live and archive: configured columns, the
/// staging table's columns when merging, and every field of every record.
fn desired_columns(conn: &Connection, config: &ReconcileConfig, plan: &RunPlan) -> Result<Vec<String>> {
  let mut desired = config.required_columns();
  let mut push = |column: &str| {
    if !column.eq_ignore_ascii_case(ID) && !desired.iter().any(|d| d.eq_ignore_ascii_case(column)) {
      desired.push(column.to_uppercase());
    }
  };

  if plan.merge_staging {
    for column in table_columns(conn, &config.staging_table())? {
      push(&column);
    }
  }
  for record in &plan.records {
    for column in record.columns() {
      push(column);
    }
  }
  Ok(desired)
}

/// Execute `plan` against `conn`. `today` is the date stamped on touched,
/// resurrected and inserted rows.
pub fn run(
  conn: &Connection,
  config: &ReconcileConfig,
  plan: RunPlan,
  today: NaiveDate,
) -> Result<RunReport> {
  let tables_created = ensure_tables(conn, config)?;

  let desired = desired_columns(conn, config, &plan)?;
  let columns_added = sync_schema(conn, config, &desired)?;
  ensure_archive_trigger(conn, config)?;

  // Also owns the index, so a renamed key column is seen before it moves.
  let key_drift = sync_key_definition(conn, config)?;

  let merge = if plan.merge_staging { Some(merge(conn, config)?) } else { None };

  let mut upserts = UpsertTally::default();
  if !plan.records.is_empty() {
    let upserter = Upserter::new(conn, config, today)?;
    for fields in plan.records {
      if fields.is_empty() {
        continue;
      }
      upserts.record(&upserter.upsert(fields)?);
    }
    info!(
      inserted = upserts.inserted,
      resurrected = upserts.resurrected,
      touched = upserts.touched,
      table = %config.table,
      "upserted records"
    );
  }

  Ok(RunReport { tables_created, columns_added, key_drift, merge, upserts })
}
