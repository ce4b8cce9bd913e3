//! The key normalizer.
//!
//! A normalized key is the concatenation of the trimmed key-column values in
//! configured order, upper-cased, with every excluded character removed. The
//! same function computes keys for incoming records and recomputes stored
//! keys in bulk, so both paths always agree.

use crate::{
  config::{ExclusionSet, KeyColumns},
  record::Fields,
};

/// Compute the normalized key of `fields` under `key_columns`.
///
/// Missing columns contribute an empty string.
pub fn normalize(fields: &Fields, key_columns: &KeyColumns, exclusions: &ExclusionSet) -> String {
  normalize_values(key_columns.iter().map(|column| fields.get(column)), exclusions)
}

/// Normalize raw key-column values already extracted in key order.
///
/// `None` stands for a missing or NULL value.
pub fn normalize_values<'a, I>(values: I, exclusions: &ExclusionSet) -> String
where
  I: IntoIterator<Item = Option<&'a str>>,
{
  let joined: String = values
    .into_iter()
    .map(|value| value.unwrap_or_default().trim())
    .collect();
  joined
    .to_uppercase()
    .chars()
    .filter(|c| !exclusions.contains(*c))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn key_columns() -> KeyColumns { KeyColumns::new(["MODEL", "BRAND"]).unwrap() }

  fn exclusions() -> ExclusionSet { ExclusionSet::new(['^', ' ', '-']) }

  fn fields(pairs: &[(&str, &str)]) -> Fields { pairs.iter().copied().collect() }

  #[test]
  fn concatenates_in_key_order() {
    let f = fields(&[("BRAND", "acme"), ("MODEL", "x-1")]);
    assert_eq!(normalize(&f, &key_columns(), &exclusions()), "X1ACME");
  }

  #[test]
  fn trims_each_value_before_joining() {
    let f = fields(&[("MODEL", "  a b "), ("BRAND", " c ")]);
    assert_eq!(normalize(&f, &key_columns(), &ExclusionSet::default()), "A BC");
    assert_eq!(normalize(&f, &key_columns(), &exclusions()), "ABC");
  }

  #[test]
  fn missing_columns_are_empty() {
    let f = fields(&[("MODEL", "x")]);
    assert_eq!(normalize(&f, &key_columns(), &exclusions()), "X");
    assert_eq!(normalize(&Fields::new(), &key_columns(), &exclusions()), "");
  }

  #[test]
  fn column_lookup_ignores_case() {
    let f = fields(&[("model", "x"), ("Brand", "y")]);
    assert_eq!(normalize(&f, &key_columns(), &exclusions()), "XY");
  }

  #[test]
  fn output_is_upper_case_and_free_of_exclusions() {
    let exclusions = exclusions();
    let inputs = [
      ("a^b", "c d-e"),
      ("--", "^^"),
      ("Mixed Case", "with-dash"),
      ("ünïcode", "straße"),
    ];
    for (model, brand) in inputs {
      let f = fields(&[("MODEL", model), ("BRAND", brand)]);
      let key = normalize(&f, &key_columns(), &exclusions);
      assert_eq!(key, key.to_uppercase(), "{key:?} is not upper-case");
      assert!(!key.chars().any(|c| exclusions.contains(c)), "{key:?} kept an excluded char");
      assert_eq!(key, normalize(&f, &key_columns(), &exclusions));
    }
  }

  #[test]
  fn bulk_form_matches_record_form() {
    let f = fields(&[("MODEL", " x-1"), ("BRAND", "acme ")]);
    let bulk = normalize_values([Some(" x-1"), Some("acme ")], &exclusions());
    assert_eq!(bulk, normalize(&f, &key_columns(), &exclusions()));
    assert_eq!(normalize_values([None, Some("y")], &exclusions()), "Y");
  }
}
