//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Date stamps are stored as `yyMMdd` in local time. Rows are read with
//! every column cast to text, so business columns of any affinity decode
//! the same way.

use archivist_core::record::{DATE_STAMP_FORMAT, Fields, StoredRecord};
use chrono::NaiveDate;
use rusqlite::Row;

use crate::ident::{Ident, column_list};

// ─── Date stamp ──────────────────────────────────────────────────────────────

pub fn encode_date_stamp(date: NaiveDate) -> String { date.format(DATE_STAMP_FORMAT).to_string() }

// ─── Rows ────────────────────────────────────────────────────────────────────

/// Select list that reads the rowid followed by every column in `columns`
/// as text.
pub fn text_select_list<'a>(columns: impl IntoIterator<Item = &'a Ident>) -> String {
  let cast: Vec<String> = columns
    .into_iter()
    .map(|c| format!("CAST({c} AS TEXT)"))
    .collect();
  if cast.is_empty() {
    "rowid".to_owned()
  } else {
    format!("rowid, {}", cast.join(", "))
  }
}

/// Decode a row selected with [`text_select_list`] over `columns`.
pub fn decode_record(row: &Row<'_>, columns: &[&Ident]) -> rusqlite::Result<StoredRecord> {
  let id: i64 = row.get(0)?;
  let mut values = Fields::new();
  for (i, column) in columns.iter().enumerate() {
    if let Some(value) = row.get::<_, Option<String>>(i + 1)? {
      values.insert(column.name(), value);
    }
  }
  Ok(StoredRecord { id, values })
}

/// Placeholder list `?1, ?2, …, ?n`.
pub fn placeholders(n: usize) -> String {
  (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

/// `INSERT INTO table (cols) VALUES (?1, …)` for the given columns.
pub fn insert_statement(table: &Ident, columns: &[&Ident]) -> String {
  format!(
    "INSERT INTO {table} ({}) VALUES ({})",
    column_list("", columns.iter().copied()),
    placeholders(columns.len())
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn date_stamp_is_two_digit_year_month_day() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
    assert_eq!(encode_date_stamp(date), "240307");
  }

  #[test]
  fn insert_statement_numbers_placeholders() {
    let a = Ident::new("A").unwrap();
    let b = Ident::new("B").unwrap();
    let t = Ident::new("T").unwrap();
    assert_eq!(
      insert_statement(&t, &[&a, &b]),
      "INSERT INTO \"T\" (\"A\", \"B\") VALUES (?1, ?2)"
    );
  }
}
