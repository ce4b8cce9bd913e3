//! Drift between the persisted key definition and the configured one.
//!
//! The classification decides what a synchronization pass must do:
//! widening the key only needs stored keys recomputed, while anything that
//! can merge previously distinct keys must reclaim duplicates first.

use std::collections::BTreeSet;

use serde::Serialize;
use strum::Display;

use crate::config::{ExclusionSet, KeyColumns};

/// How the configured key columns relate to the persisted ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeyChange {
  #[default]
  Unchanged,
  /// Configured columns are a strict superset of the persisted ones.
  Grew,
  /// Configured columns are a strict subset of the persisted ones.
  Shrank,
  /// Reordered or otherwise edited. Handled like [`KeyChange::Shrank`].
  Replaced,
}

impl KeyChange {
  pub fn classify(persisted: &KeyColumns, configured: &KeyColumns) -> Self {
    if persisted == configured {
      return Self::Unchanged;
    }
    let old: BTreeSet<&str> = persisted.iter().collect();
    let new: BTreeSet<&str> = configured.iter().collect();
    if old.is_subset(&new) && old != new {
      Self::Grew
    } else if new.is_subset(&old) && old != new {
      Self::Shrank
    } else {
      Self::Replaced
    }
  }
}

/// How the configured exclusion set relates to the persisted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExclusionChange {
  #[default]
  Unchanged,
  Added,
  Removed,
  Replaced,
}

impl ExclusionChange {
  pub fn classify(persisted: &ExclusionSet, configured: &ExclusionSet) -> Self {
    if persisted == configured {
      Self::Unchanged
    } else if persisted.is_subset(configured) {
      Self::Added
    } else if configured.is_subset(persisted) {
      Self::Removed
    } else {
      Self::Replaced
    }
  }
}

/// Combined drift of key columns and exclusion set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Drift {
  pub key:        KeyChange,
  pub exclusions: ExclusionChange,
}

impl Drift {
  pub fn between(
    persisted_key: &KeyColumns,
    persisted_exclusions: &ExclusionSet,
    configured_key: &KeyColumns,
    configured_exclusions: &ExclusionSet,
  ) -> Self {
    Self {
      key:        KeyChange::classify(persisted_key, configured_key),
      exclusions: ExclusionChange::classify(persisted_exclusions, configured_exclusions),
    }
  }

  /// Stored normalized keys no longer match the configuration.
  pub fn needs_recompute(&self) -> bool {
    self.key != KeyChange::Unchanged || self.exclusions != ExclusionChange::Unchanged
  }

  /// Recomputing may map distinct rows onto the same key, so duplicates
  /// must be reclaimed before the new keys are written.
  pub fn may_merge_keys(&self) -> bool {
    matches!(self.key, KeyChange::Shrank | KeyChange::Replaced)
      || matches!(self.exclusions, ExclusionChange::Added | ExclusionChange::Replaced)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cols(names: &[&str]) -> KeyColumns { KeyColumns::new(names).unwrap() }

  #[test]
  fn key_change_classification() {
    let base = cols(&["MODEL", "BRAND"]);
    assert_eq!(KeyChange::classify(&base, &base), KeyChange::Unchanged);
    assert_eq!(
      KeyChange::classify(&base, &cols(&["MODEL", "BRAND", "COLOR"])),
      KeyChange::Grew
    );
    assert_eq!(KeyChange::classify(&base, &cols(&["MODEL"])), KeyChange::Shrank);
    assert_eq!(KeyChange::classify(&base, &cols(&["BRAND", "MODEL"])), KeyChange::Replaced);
    assert_eq!(KeyChange::classify(&base, &cols(&["MODEL", "COLOR"])), KeyChange::Replaced);
  }

  #[test]
  fn exclusion_change_classification() {
    let base = ExclusionSet::new(['-']);
    assert_eq!(ExclusionChange::classify(&base, &base), ExclusionChange::Unchanged);
    assert_eq!(
      ExclusionChange::classify(&base, &ExclusionSet::new(['-', ' '])),
      ExclusionChange::Added
    );
    assert_eq!(
      ExclusionChange::classify(&base, &ExclusionSet::default()),
      ExclusionChange::Removed
    );
    assert_eq!(
      ExclusionChange::classify(&base, &ExclusionSet::new(['^'])),
      ExclusionChange::Replaced
    );
  }

  #[test]
  fn widening_alone_never_requires_reclaim() {
    let drift = Drift::between(
      &cols(&["MODEL"]),
      &ExclusionSet::default(),
      &cols(&["MODEL", "BRAND"]),
      &ExclusionSet::default(),
    );
    assert!(drift.needs_recompute());
    assert!(!drift.may_merge_keys());
  }

  #[test]
  fn narrowing_or_new_exclusions_require_reclaim() {
    let shrink = Drift::between(
      &cols(&["MODEL", "BRAND"]),
      &ExclusionSet::default(),
      &cols(&["MODEL"]),
      &ExclusionSet::default(),
    );
    assert!(shrink.may_merge_keys());

    let added = Drift::between(
      &cols(&["MODEL"]),
      &ExclusionSet::default(),
      &cols(&["MODEL"]),
      &ExclusionSet::new(['-']),
    );
    assert_eq!(added.key, KeyChange::Unchanged);
    assert!(added.may_merge_keys());
  }

  #[test]
  fn display_is_snake_case() {
    assert_eq!(KeyChange::Grew.to_string(), "grew");
    assert_eq!(ExclusionChange::Unchanged.to_string(), "unchanged");
  }
}
