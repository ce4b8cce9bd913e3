//! Reader for the delimited export.
//!
//! The first row names the columns. Fields may be wrapped in double quotes
//! to carry the delimiter, line breaks or `""`-escaped quotes. Column names
//! are trimmed and upper-cased; values are kept verbatim.

use std::path::Path;

use anyhow::Context as _;
use archivist_core::record::Fields;
use csv::ReaderBuilder;

/// Read every data row of `path` as a field bag.
pub fn read_records(path: &Path, delimiter: char) -> anyhow::Result<Vec<Fields>> {
  let text =
    std::fs::read_to_string(path).with_context(|| format!("failed to read input file {path:?}"))?;
  parse(&text, delimiter).with_context(|| format!("failed to parse input file {path:?}"))
}

/// Parse `text` into one [`Fields`] per non-blank data row.
///
/// Short rows leave the remaining columns empty; surplus fields and columns
/// with a blank header are dropped.
pub fn parse(text: &str, delimiter: char) -> anyhow::Result<Vec<Fields>> {
  let delimiter = u8::try_from(delimiter)
    .ok()
    .filter(u8::is_ascii)
    .with_context(|| format!("delimiter {delimiter:?} is not an ASCII character"))?;
  let text = text.strip_prefix('\u{feff}').unwrap_or(text);

  let mut reader = ReaderBuilder::new()
    .delimiter(delimiter)
    .flexible(true)
    .from_reader(text.as_bytes());
  let header: Vec<String> = reader
    .headers()?
    .iter()
    .map(|h| h.trim().to_uppercase())
    .collect();

  let mut records = Vec::new();
  for row in reader.records() {
    let row = row?;
    if row.iter().all(|field| field.trim().is_empty()) {
      continue;
    }
    records.push(
      header
        .iter()
        .enumerate()
        .filter(|(_, column)| !column.is_empty())
        .map(|(i, column)| (column.as_str(), row.get(i).unwrap_or("")))
        .collect(),
    );
  }
  Ok(records)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn values(record: &Fields) -> Vec<(&str, &str)> { record.iter().collect() }

  #[test]
  fn header_names_columns() {
    let records = parse("model;Brand\nX;Y\nZ;W\n", ';').unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(values(&records[0]), [("BRAND", "Y"), ("MODEL", "X")]);
    assert_eq!(records[1].get("MODEL"), Some("Z"));
  }

  #[test]
  fn quotes_protect_delimiters_and_line_breaks() {
    let records = parse("MODEL;NOTE\n\"A;1\";\"say \"\"hi\"\"\nthere\"\n", ';').unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("MODEL"), Some("A;1"));
    assert_eq!(records[0].get("NOTE"), Some("say \"hi\"\nthere"));
  }

  #[test]
  fn quote_inside_unquoted_field_is_literal() {
    let records = parse("MODEL;BRAND\n12\" pipe;Y\n", ';').unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("MODEL"), Some("12\" pipe"));
    assert_eq!(records[0].get("BRAND"), Some("Y"));
  }

  #[test]
  fn bom_crlf_and_missing_trailing_newline() {
    let records = parse("\u{feff}MODEL;BRAND\r\nX;Y\r\nZ;W", ';').unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("MODEL"), Some("X"));
    assert_eq!(records[1].get("BRAND"), Some("W"));
  }

  #[test]
  fn short_and_blank_rows() {
    let records = parse("MODEL;BRAND;\nX\n\n ; \nA;B;extra\n", ';').unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(values(&records[0]), [("BRAND", ""), ("MODEL", "X")]);
    assert_eq!(values(&records[1]), [("BRAND", "B"), ("MODEL", "A")]);
  }

  #[test]
  fn other_delimiters() {
    let records = parse("MODEL,BRAND\nX;1,Y\n", ',').unwrap();
    assert_eq!(records[0].get("MODEL"), Some("X;1"));
  }

  #[test]
  fn non_ascii_delimiter_is_rejected() {
    assert!(parse("MODEL§BRAND\nX§Y\n", '§').is_err());
  }

  #[test]
  fn empty_input_has_no_records() {
    assert!(parse("", ';').unwrap().is_empty());
    assert!(parse("MODEL;BRAND\n", ';').unwrap().is_empty());
  }

  #[test]
  fn reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("import.csv");
    std::fs::write(&path, "MODEL;BRAND\nX;Y\n").unwrap();

    let records = read_records(&path, ';').unwrap();
    assert_eq!(records.len(), 1);
    assert!(read_records(&dir.path().join("absent.csv"), ';').is_err());
  }
}
