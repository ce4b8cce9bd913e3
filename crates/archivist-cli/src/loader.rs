//! Bulk import of the first export through the `sqlite3` shell.
//!
//! The shell's `.import` creates the staging table from the file's header
//! row and loads every row as text, which is far faster than row-by-row
//! inserts for a large initial file.

use std::{path::Path, process::ExitStatus};

use anyhow::Context as _;
use tokio::process::Command;
use tracing::{error, info};

use crate::settings::Settings;

/// Quote an argument for a `sqlite3` dot-command.
fn quote(arg: &str) -> String {
  format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
}

/// The arguments passed to the loader after the database path.
fn dot_commands(input: &Path, delimiter: char, staging: &str) -> [String; 2] {
  [
    format!(".separator {}", quote(&delimiter.to_string())),
    format!(".import {} {staging}", quote(&input.to_string_lossy())),
  ]
}

/// Load `settings.input` into the staging table. Returns the loader's exit
/// status; a failed status has already been logged with its stderr.
pub async fn import(settings: &Settings) -> anyhow::Result<ExitStatus> {
  let staging = settings.reconcile.staging_table();
  let output = Command::new(&settings.loader)
    .arg(&settings.database)
    .args(dot_commands(&settings.input, settings.delimiter, &staging))
    .output()
    .await
    .with_context(|| format!("failed to start loader {:?}", settings.loader))?;

  if output.status.success() {
    info!(input = ?settings.input, staging = %staging, "imported input into staging table");
  } else {
    error!(
      status = %output.status,
      stderr = %String::from_utf8_lossy(&output.stderr).trim(),
      "loader failed"
    );
  }
  Ok(output.status)
}
