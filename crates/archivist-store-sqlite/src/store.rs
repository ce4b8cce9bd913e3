//! [`SqliteStore`], the SQLite implementation of [`RecordStore`].

use std::{path::Path, sync::Arc};

use archivist_core::{
  config::{KeyColumns, ReconcileConfig},
  record::{Fields, ID, ID_NUM, IdentityToken, StoredRecord},
  report::{MergeReport, RunReport, UpsertOutcome},
  store::{RecordStore, RunPlan},
};
use chrono::{Local, NaiveDate};
use rusqlite::{Connection, OptionalExtension as _};

use crate::{
  Result, archive, encode, engine,
  ident::{Ident, TableShape},
  index, merge, reclaim,
  schema::{self, CONNECTION_PRAGMAS},
  upsert::Upserter,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A live/archive record store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted. All clones
/// share one connection, so operations never run concurrently.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  config:          Arc<ReconcileConfig>,
  today:           Option<NaiveDate>,
}

impl SqliteStore {
  /// Open (or create) the database at `path`. Tables are created by the
  /// first [`RecordStore::run`].
  pub async fn open(path: impl AsRef<Path>, config: ReconcileConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, config).await
  }

  /// Open an in-memory store. Useful for testing.
  pub async fn open_in_memory(config: ReconcileConfig) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, config).await
  }

  async fn init(conn: tokio_rusqlite::Connection, config: ReconcileConfig) -> Result<Self> {
    config.validate()?;
    conn
      .call(|conn| {
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(Self { conn, config: Arc::new(config), today: None })
  }

  pub fn config(&self) -> &ReconcileConfig { &self.config }

  /// A handle on the same database that reconciles under `config`, as the
  /// next run would after a configuration change.
  pub fn with_config(&self, config: ReconcileConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config: Arc::new(config), ..self.clone() })
  }

  /// Pin the date stamped on touched and inserted rows instead of using the
  /// local date.
  pub fn with_today(mut self, today: NaiveDate) -> Self {
    self.today = Some(today);
    self
  }

  fn today(&self) -> NaiveDate { self.today.unwrap_or_else(|| Local::now().date_naive()) }

  /// Run `f` inside one transaction. It commits only if `f` succeeds.
  async fn transact<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection, &ReconcileConfig) -> Result<T> + Send + 'static,
  {
    let config = Arc::clone(&self.config);
    self
      .conn
      .call(move |conn| {
        let tx = match conn.transaction() {
          Ok(tx) => tx,
          Err(e) => return Ok(Err(e.into())),
        };
        let result = f(&tx, &config).and_then(|out| {
          tx.commit()?;
          Ok(out)
        });
        Ok(result)
      })
      .await?
  }

  /// Drop the staging table left over from an interrupted first run.
  pub async fn drop_staging(&self) -> Result<bool> {
    self
      .transact(|conn, config| schema::drop_table(conn, &config.staging_table()))
      .await
  }

  /// Columns of `table` (excluding `ID`), empty if it does not exist.
  pub async fn table_columns(&self, table: String) -> Result<Vec<String>> {
    self
      .transact(move |conn, _| schema::table_columns(conn, &table))
      .await
  }

  /// Whether the archive trigger is installed.
  pub async fn archive_trigger_exists(&self) -> Result<bool> {
    self
      .transact(|conn, config| archive::trigger_exists(conn, &config.archive_trigger()))
      .await
  }

  /// Columns covered by the live uniqueness index.
  pub async fn index_columns(&self) -> Result<Vec<String>> {
    self.transact(index::index_columns).await
  }

  async fn records(&self, archive: bool) -> Result<Vec<StoredRecord>> {
    self
      .transact(move |conn, config| {
        let name = if archive { config.archive_table() } else { config.table.clone() };
        read_records(conn, &Ident::new(&name)?)
      })
      .await
  }
}

fn read_records(conn: &Connection, table: &Ident) -> Result<Vec<StoredRecord>> {
  let shape = TableShape::load(conn, table)?;
  if !shape.exists() {
    return Ok(Vec::new());
  }
  let columns: Vec<&Ident> = shape.without_id().collect();
  let id = shape.resolve(ID)?;
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM {table} ORDER BY {id}",
    encode::text_select_list(columns.iter().copied())
  ))?;
  let records = stmt
    .query_map([], |row| encode::decode_record(row, &columns))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(records)
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = crate::Error;

  async fn run(&self, plan: RunPlan) -> Result<RunReport> {
    let today = self.today();
    self
      .transact(move |conn, config| engine::run(conn, config, plan, today))
      .await
  }

  async fn upsert(&self, fields: Fields) -> Result<UpsertOutcome> {
    let today = self.today();
    self
      .transact(move |conn, config| Upserter::new(conn, config, today)?.upsert(fields))
      .await
  }

  async fn delete(&self, token: IdentityToken) -> Result<bool> {
    self
      .transact(move |conn, config| {
        let live = Ident::new(&config.table)?;
        let id: Option<i64> = conn
          .query_row(
            &format!("SELECT \"{ID}\" FROM {live} WHERE \"{ID_NUM}\" = ?1"),
            [token.as_str()],
            |row| row.get(0),
          )
          .optional()?;
        match id {
          Some(id) => Ok(archive::delete_live(conn, config, &[id])? == 1),
          None => Ok(false),
        }
      })
      .await
  }

  async fn reclaim(&self) -> Result<usize> { self.transact(reclaim::reclaim).await }

  async fn merge_staging(&self) -> Result<MergeReport> { self.transact(merge::merge).await }

  async fn sync_schema(&self, columns: Vec<String>) -> Result<Vec<String>> {
    self
      .transact(move |conn, config| {
        schema::ensure_tables(conn, config)?;
        let added = schema::sync_schema(conn, config, &columns)?;
        archive::ensure_archive_trigger(conn, config)?;
        Ok(added)
      })
      .await
  }

  async fn table_exists(&self, name: String) -> Result<bool> {
    self
      .transact(move |conn, _| schema::table_exists(conn, &name))
      .await
  }

  async fn live_records(&self) -> Result<Vec<StoredRecord>> { self.records(false).await }

  async fn archive_records(&self) -> Result<Vec<StoredRecord>> { self.records(true).await }

  async fn key_definition(&self) -> Result<Option<KeyColumns>> {
    self.transact(index::load_key_definition).await
  }
}
