//! The `RecordStore` trait and the run plan it executes.
//!
//! The trait is implemented by storage backends (e.g.
//! `archivist-store-sqlite`). The CLI depends on this abstraction for the
//! shape of a run; each method is its own transaction.

use std::future::Future;

use crate::{
  config::KeyColumns,
  record::{Fields, IdentityToken, StoredRecord},
  report::{MergeReport, RunReport, UpsertOutcome},
};

/// Work for one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
  /// Merge the staging table into live/archive (first run only).
  pub merge_staging: bool,
  /// Records to upsert after schema, index and merge work is done.
  pub records:       Vec<Fields>,
}

/// Abstraction over a live/archive record store.
///
/// Every method runs atomically: either all of its changes are committed
/// or none are.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Execute a full run: ensure tables, synchronize schema, ensure the
  /// archive trigger and uniqueness index, reconcile key drift, merge
  /// staging if planned, then upsert every record. One transaction.
  fn run(
    &self,
    plan: RunPlan,
  ) -> impl Future<Output = Result<RunReport, Self::Error>> + Send + '_;

  /// Reconcile a single record into the live table.
  fn upsert(
    &self,
    fields: Fields,
  ) -> impl Future<Output = Result<UpsertOutcome, Self::Error>> + Send + '_;

  /// Delete the live row carrying `token`. The row is archived first.
  /// Returns `false` if no live row carries the token.
  fn delete(
    &self,
    token: IdentityToken,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Collapse the live table to one row per normalized key, archiving the
  /// rest. Returns the number of rows moved.
  fn reclaim(&self) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Merge the staging table into live/archive and drop it.
  fn merge_staging(
    &self,
  ) -> impl Future<Output = Result<MergeReport, Self::Error>> + Send + '_;

  /// Ensure live and archive carry every column in `columns`. Returns the
  /// columns added, as `TABLE.COLUMN`.
  fn sync_schema(
    &self,
    columns: Vec<String>,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  fn table_exists(
    &self,
    name: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// All live rows, ordered by surrogate id.
  fn live_records(
    &self,
  ) -> impl Future<Output = Result<Vec<StoredRecord>, Self::Error>> + Send + '_;

  /// All archive rows, ordered by archive surrogate id.
  fn archive_records(
    &self,
  ) -> impl Future<Output = Result<Vec<StoredRecord>, Self::Error>> + Send + '_;

  /// The persisted key definition, if one has been recorded.
  fn key_definition(
    &self,
  ) -> impl Future<Output = Result<Option<KeyColumns>, Self::Error>> + Send + '_;
}
