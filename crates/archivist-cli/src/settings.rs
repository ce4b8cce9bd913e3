//! Process configuration.
//!
//! A TOML file layered under `ARCHIVIST_`-prefixed environment variables.
//! Nested keys use `__`, so `ARCHIVIST_RECONCILE__TABLE=PARTS` sets
//! `reconcile.table`. List-valued keys take comma-separated values.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, bail};
use archivist_core::config::ReconcileConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// SQLite database file. Created if absent.
  pub database:  PathBuf,
  /// Delimited export read on every run.
  pub input:     PathBuf,
  pub delimiter: char,
  /// Bulk loader used for the first import (the `sqlite3` shell).
  pub loader:    PathBuf,
  pub reconcile: ReconcileConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      database:  "Data.db".into(),
      input:     "ImportData.csv".into(),
      delimiter: ';',
      loader:    "sqlite3".into(),
      reconcile: ReconcileConfig::default(),
    }
  }
}

fn environment() -> config::Environment {
  config::Environment::with_prefix("ARCHIVIST")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
    .list_separator(",")
    .with_list_parse_key("reconcile.key_columns")
    .with_list_parse_key("reconcile.columns")
}

impl Settings {
  /// Load `path` (optional) and the process environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> { Self::build(path, environment()) }

  fn build(path: &Path, env: config::Environment) -> anyhow::Result<Self> {
    let settings: Self = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(env)
      .build()
      .with_context(|| format!("failed to read config file {path:?}"))?
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.validate()?;
    Ok(settings)
  }

  fn validate(&self) -> anyhow::Result<()> {
    if !self.delimiter.is_ascii() || matches!(self.delimiter, '"' | '\r' | '\n') {
      bail!("delimiter {:?} cannot separate fields", self.delimiter);
    }
    self.reconcile.validate()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use archivist_core::config::{ExclusionSet, KeyColumns};

  use super::*;

  fn write_config(contents: &str) -> tempfile::TempPath {
    let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    std::fs::write(file.path(), contents).unwrap();
    file.into_temp_path()
  }

  fn no_env() -> config::Environment { environment().source(Some(HashMap::new())) }

  #[test]
  fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::build(&dir.path().join("absent.toml"), no_env()).unwrap();

    assert_eq!(settings.database, PathBuf::from("Data.db"));
    assert_eq!(settings.input, PathBuf::from("ImportData.csv"));
    assert_eq!(settings.delimiter, ';');
    assert_eq!(settings.reconcile, ReconcileConfig::default());
  }

  #[test]
  fn file_overrides_nested_reconcile_settings() {
    let path = write_config(
      r#"
database = "parts.db"
delimiter = ","

[reconcile]
table = "PARTS"
key_columns = ["MODEL"]
exclusions = ["-"]
"#,
    );
    let settings = Settings::build(&path, no_env()).unwrap();

    assert_eq!(settings.database, PathBuf::from("parts.db"));
    assert_eq!(settings.delimiter, ',');
    assert_eq!(settings.reconcile.table, "PARTS");
    assert_eq!(settings.reconcile.archive_table(), "BACKUP_PARTS");
    assert_eq!(settings.reconcile.key_columns, KeyColumns::new(["MODEL"]).unwrap());
    assert_eq!(settings.reconcile.exclusions, ExclusionSet::new(['-']));
    // Unset fields keep their defaults.
    assert_eq!(settings.reconcile.key_column, "INDEX_COLUMN");
  }

  #[test]
  fn environment_overrides_file() {
    let path = write_config("database = \"file.db\"\n");
    let env = environment().source(Some(HashMap::from([
      ("ARCHIVIST_DATABASE".to_owned(), "env.db".to_owned()),
      ("ARCHIVIST_RECONCILE__KEY_COLUMNS".to_owned(), "MODEL,COLOR".to_owned()),
    ])));
    let settings = Settings::build(&path, env).unwrap();

    assert_eq!(settings.database, PathBuf::from("env.db"));
    assert_eq!(
      settings.reconcile.key_columns,
      KeyColumns::new(["MODEL", "COLOR"]).unwrap()
    );
  }

  #[test]
  fn invalid_reconcile_settings_are_rejected() {
    let path = write_config("[reconcile]\nkey_columns = [\"ACTIVE\"]\n");
    assert!(Settings::build(&path, no_env()).is_err());

    let path = write_config("delimiter = '\"'\n");
    assert!(Settings::build(&path, no_env()).is_err());

    let path = write_config("delimiter = '§'\n");
    assert!(Settings::build(&path, no_env()).is_err());
  }
}
