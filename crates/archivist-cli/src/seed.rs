//! Synthetic records for exercising a database.

use archivist_core::{
  config::ReconcileConfig,
  record::{ACTIVE, DATE_STAMP_FORMAT, ENTRY, Fields},
};
use chrono::NaiveDate;
use uuid::Uuid;

/// `count` records whose business columns each hold a fresh UUID, stamped
/// as entered and active on `today`.
pub fn records(config: &ReconcileConfig, count: usize, today: NaiveDate) -> Vec<Fields> {
  let stamp = today.format(DATE_STAMP_FORMAT).to_string();
  let columns = config.business_columns();
  (0..count)
    .map(|_| {
      let mut fields: Fields = columns
        .iter()
        .map(|column| (column.as_str(), Uuid::new_v4().to_string()))
        .collect();
      fields.insert(ENTRY, stamp.as_str());
      fields.insert(ACTIVE, stamp.as_str());
      fields
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  #[test]
  fn fills_every_business_column_uniquely() {
    let today = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
    let records = records(&ReconcileConfig::default(), 3, today);

    assert_eq!(records.len(), 3);
    assert_eq!(
      records[0].columns().collect::<Vec<_>>(),
      ["ACTIVE", "BRAND", "ENTRY", "MODEL"]
    );
    assert_eq!(records[0].get("ACTIVE"), Some("240506"));
    let models: HashSet<_> = records.iter().filter_map(|r| r.get("MODEL")).collect();
    assert_eq!(models.len(), 3);
  }
}
