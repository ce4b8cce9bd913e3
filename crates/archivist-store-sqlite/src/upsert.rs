//! Upsert engine.
//!
//! Each incoming record is reconciled by its normalized key, taking exactly
//! one of three paths:
//!
//! 1. a live row matches → touch its active marker;
//! 2. otherwise an archived row matches → move the newest one back live;
//! 3. otherwise → insert a new live row.
//!
//! The lookups and the write run on the caller's connection, inside the
//! caller's transaction, so no other write can slip between check and act.

use archivist_core::{
  config::ReconcileConfig,
  normalize::normalize,
  record::{ACTIVE, ENTRY, Fields, ID, ID_NUM, IdentityToken},
  report::UpsertOutcome,
};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension as _, params_from_iter};
use tracing::debug;

use crate::{
  Error, Result,
  encode::{encode_date_stamp, insert_statement},
  ident::{Ident, TableShape, column_list},
};

/// Reconciles records against one live/archive pair.
///
/// Holds the introspected shapes, so build it after any schema change.
pub struct Upserter<'c> {
  conn:    &'c Connection,
  config:  &'c ReconcileConfig,
  live:    TableShape,
  archive: TableShape,
  today:   String,
}

impl<'c> Upserter<'c> {
  pub fn new(conn: &'c Connection, config: &'c ReconcileConfig, today: NaiveDate) -> Result<Self> {
    let live = TableShape::load(conn, &Ident::new(&config.table)?)?;
    let archive = TableShape::load(conn, &Ident::new(&config.archive_table())?)?;
    Ok(Self { conn, config, live, archive, today: encode_date_stamp(today) })
  }

  /// Reconcile one record and return its identity token.
  pub fn upsert(&self, mut fields: Fields) -> Result<UpsertOutcome> {
    for reserved in [ID, ID_NUM, self.config.key_column.as_str()] {
      fields.remove(reserved);
    }
    let key = normalize(&fields, &self.config.key_columns, &self.config.exclusions);

    let outcome = if let Some(token) = self.touch(&key)? {
      UpsertOutcome::Touched(token)
    } else if let Some(archived) = self.newest_archived(&key)? {
      UpsertOutcome::Resurrected(self.resurrect(archived)?)
    } else {
      UpsertOutcome::Inserted(self.insert(&fields, &key)?)
    };
    debug!(key = %key, outcome = ?outcome, "upserted record");
    Ok(outcome)
  }

  /// Stamp today's date on the live row with `key`, returning its token.
  fn touch(&self, key: &str) -> Result<Option<IdentityToken>> {
    let table = self.live.table();
    let active = self.live.resolve(ACTIVE)?;
    let key_column = self.live.resolve(&self.config.key_column)?;
    let token_column = self.live.resolve(ID_NUM)?;
    let id = self.live.resolve(ID)?;
    let mut stmt = self.conn.prepare_cached(&format!(
      "UPDATE {table} SET {active} = ?1 WHERE {key_column} = ?2
       RETURNING COALESCE({token_column}, '{prefix}' || {id})",
      prefix = archivist_core::record::TOKEN_PREFIX,
    ))?;
    let token: Option<String> = stmt
      .query_row([self.today.as_str(), key], |row| row.get(0))
      .optional()?;
    Ok(token.map(IdentityToken::from))
  }

  /// Archive id of the most recently archived row with `key`.
  fn newest_archived(&self, key: &str) -> Result<Option<i64>> {
    let table = self.archive.table();
    let key_column = self.archive.resolve(&self.config.key_column)?;
    let id = self.archive.resolve(ID)?;
    let mut stmt = self.conn.prepare_cached(&format!(
      "SELECT {id} FROM {table} WHERE {key_column} = ?1 ORDER BY {id} DESC LIMIT 1"
    ))?;
    Ok(stmt.query_row([key], |row| row.get(0)).optional()?)
  }

  /// Move archive row `archived` into the live table with a fresh surrogate
  /// id and today's active marker, then remove it from the archive.
  fn resurrect(&self, archived: i64) -> Result<IdentityToken> {
    let live = self.live.table();
    let archive = self.archive.table();

    let pairs: Vec<(&Ident, &Ident)> = self
      .archive
      .without_id()
      .filter(|c| !c.matches(ID_NUM))
      .filter_map(|source| self.live.find(source.name()).map(|target| (target, source)))
      .collect();
    let targets = column_list("", pairs.iter().map(|(target, _)| *target));
    let sources = pairs
      .iter()
      .map(|(_, source)| {
        if source.matches(ACTIVE) { "?2".to_owned() } else { source.to_string() }
      })
      .collect::<Vec<_>>()
      .join(", ");
    let archive_id = self.archive.resolve(ID)?;

    self
      .conn
      .prepare_cached(&format!(
        "INSERT INTO {live} ({targets}) SELECT {sources} FROM {archive} WHERE {archive_id} = ?1"
      ))?
      .execute(rusqlite::params![archived, self.today])
      .map_err(Error::write(live.name()))?;
    let id = self.conn.last_insert_rowid();

    self
      .conn
      .prepare_cached(&format!("DELETE FROM {archive} WHERE {archive_id} = ?1"))?
      .execute([archived])?;

    self.token_of(id)
  }

  /// Insert `fields` as a new live row keyed by `key`.
  fn insert(&self, fields: &Fields, key: &str) -> Result<IdentityToken> {
    let mut columns: Vec<&Ident> = Vec::with_capacity(fields.len() + 3);
    let mut values: Vec<&str> = Vec::with_capacity(fields.len() + 3);
    for (column, value) in fields.iter() {
      if column == ACTIVE || (column == ENTRY && value.trim().is_empty()) {
        continue;
      }
      columns.push(self.live.resolve(column)?);
      values.push(value);
    }
    if !columns.iter().any(|c| c.matches(ENTRY)) {
      columns.push(self.live.resolve(ENTRY)?);
      values.push(&self.today);
    }
    columns.push(self.live.resolve(ACTIVE)?);
    values.push(&self.today);
    columns.push(self.live.resolve(&self.config.key_column)?);
    values.push(key);

    self
      .conn
      .prepare_cached(&insert_statement(self.live.table(), &columns))?
      .execute(params_from_iter(values))
      .map_err(Error::write(self.live.table().name()))?;
    self.token_of(self.conn.last_insert_rowid())
  }

  fn token_of(&self, id: i64) -> Result<IdentityToken> {
    let table = self.live.table();
    let token_column = self.live.resolve(ID_NUM)?;
    let id_column = self.live.resolve(ID)?;
    let token: Option<String> = self
      .conn
      .prepare_cached(&format!("SELECT {token_column} FROM {table} WHERE {id_column} = ?1"))?
      .query_row([id], |row| row.get(0))?;
    Ok(token.map_or_else(|| IdentityToken::from_id(id), IdentityToken::from))
  }
}
