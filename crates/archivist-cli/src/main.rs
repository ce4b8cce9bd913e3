//! `archivist` reconciles a delimited export into a live/archive table pair.
//!
//! The first run bulk-loads the export through the `sqlite3` shell into a
//! staging table and merges it. Every later run upserts the export row by
//! row: matching live rows are touched, archived rows are resurrected and
//! everything else is inserted.
//!
//! # Usage
//!
//! ```
//! archivist --config archivist.toml
//! archivist --database Data.db --input ImportData.csv --json
//! ```

mod input;
mod loader;
mod seed;
mod settings;

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use archivist_core::{
  report::RunReport,
  store::{RecordStore, RunPlan},
};
use archivist_store_sqlite::SqliteStore;
use chrono::Local;
use clap::Parser;
use settings::Settings;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "archivist", version, about = "Reconcile a delimited export into SQLite")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "archivist.toml")]
  config: PathBuf,

  /// SQLite database file (overrides the config file).
  #[arg(long, value_name = "FILE")]
  database: Option<PathBuf>,

  /// Delimited input file (overrides the config file).
  #[arg(long, value_name = "FILE")]
  input: Option<PathBuf>,

  /// Upsert N generated records instead of the input file's rows.
  #[arg(long, value_name = "N")]
  seed: Option<usize>,

  /// Print the run report as JSON on stdout.
  #[arg(long)]
  json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so `--json` output stays parseable.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut settings = Settings::load(&cli.config)?;
  if let Some(database) = cli.database {
    settings.database = database;
  }
  if let Some(input) = cli.input {
    settings.input = input;
  }
  if !settings.input.is_file() {
    bail!("input file {:?} does not exist", settings.input);
  }

  let store = SqliteStore::open(&settings.database, settings.reconcile.clone())
    .await
    .with_context(|| format!("failed to open database {:?}", settings.database))?;

  let mut plan = RunPlan::default();
  if is_first_run(&store).await? {
    if store.drop_staging().await? {
      warn!(staging = %settings.reconcile.staging_table(), "dropped staging table from an unfinished import");
    }
    let status = loader::import(&settings).await?;
    if !status.success() {
      std::process::exit(status.code().unwrap_or(1));
    }
    plan.merge_staging = true;
  }

  if let Some(count) = cli.seed {
    let today = Local::now().date_naive();
    plan.records = seed::records(&settings.reconcile, count, today);
  } else if !plan.merge_staging {
    plan.records = input::read_records(&settings.input, settings.delimiter)?;
    info!(records = plan.records.len(), input = ?settings.input, "read input");
  }

  let report = store.run(plan).await.context("reconciliation run failed")?;

  if cli.json {
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    log_report(&report);
  }
  Ok(())
}

/// Only a database holding neither the live nor the archive table gets the
/// bulk import. A lone live table keeps its rows and is upserted into.
async fn is_first_run(store: &SqliteStore) -> anyhow::Result<bool> {
  let config = store.config();
  let live = store.table_exists(config.table.clone()).await?;
  let archive = store.table_exists(config.archive_table()).await?;
  Ok(!live && !archive)
}

fn log_report(report: &RunReport) {
  let (to_live, to_archive) = report
    .merge
    .map_or((0, 0), |m| (m.to_live, m.to_archive));
  info!(
    columns_added = report.columns_added.len(),
    key_change = %report.key_drift.drift.key,
    exclusion_change = %report.key_drift.drift.exclusions,
    recomputed = report.key_drift.recomputed,
    reclaimed = report.key_drift.reclaimed,
    to_live,
    to_archive,
    inserted = report.upserts.inserted,
    resurrected = report.upserts.resurrected,
    touched = report.upserts.touched,
    "run complete"
  );
}

#[cfg(test)]
mod tests {
  use archivist_core::config::ReconcileConfig;

  use super::*;

  #[test]
  fn flags_override_defaults() {
    let cli = Cli::try_parse_from(["archivist", "--input", "in.csv", "--seed", "5", "--json"])
      .unwrap();
    assert_eq!(cli.config, PathBuf::from("archivist.toml"));
    assert_eq!(cli.input, Some(PathBuf::from("in.csv")));
    assert_eq!(cli.seed, Some(5));
    assert!(cli.json);
    assert!(cli.database.is_none());
  }

  #[tokio::test]
  async fn first_run_lasts_until_tables_exist() {
    let store = SqliteStore::open_in_memory(ReconcileConfig::default())
      .await
      .unwrap();
    assert!(is_first_run(&store).await.unwrap());

    store.run(RunPlan::default()).await.unwrap();
    assert!(!is_first_run(&store).await.unwrap());
  }

  #[tokio::test]
  async fn lost_archive_is_not_a_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Data.db");
    let store = SqliteStore::open(&path, ReconcileConfig::default())
      .await
      .unwrap();
    store.run(RunPlan::default()).await.unwrap();
    store
      .upsert([("MODEL", "X"), ("BRAND", "Y")].into_iter().collect())
      .await
      .unwrap();

    rusqlite::Connection::open(&path)
      .unwrap()
      .execute_batch("DROP TABLE BACKUP_ABC")
      .unwrap();
    assert!(!is_first_run(&store).await.unwrap());

    // The archive comes back and the live row is still matched.
    let input = dir.path().join("ImportData.csv");
    std::fs::write(&input, "MODEL;BRAND\nx;y\n").unwrap();
    let records = input::read_records(&input, ';').unwrap();
    let report = store
      .run(RunPlan { records, ..RunPlan::default() })
      .await
      .unwrap();
    assert!(!report.tables_created);
    assert_eq!(report.upserts.touched, 1);
    assert!(store.table_exists(store.config().archive_table()).await.unwrap());
    assert!(!is_first_run(&store).await.unwrap());
  }

  #[tokio::test]
  async fn seeded_csv_run_against_a_file_database() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("Data.db"), ReconcileConfig::default())
      .await
      .unwrap();
    store.run(RunPlan::default()).await.unwrap();

    let input = dir.path().join("ImportData.csv");
    std::fs::write(&input, "MODEL;BRAND\nX;Y\nx;y\nZ;Z\n").unwrap();
    let mut records = input::read_records(&input, ';').unwrap();
    records.extend(seed::records(store.config(), 2, Local::now().date_naive()));

    let report = store
      .run(RunPlan { records, ..RunPlan::default() })
      .await
      .unwrap();
    assert_eq!(report.upserts.inserted, 4);
    assert_eq!(report.upserts.touched, 1);
    assert_eq!(store.live_records().await.unwrap().len(), 4);
  }
}
