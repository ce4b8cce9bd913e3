//! Outcome and report types returned by the reconciliation operations.

use serde::Serialize;

use crate::{drift::Drift, record::IdentityToken};

/// Which of the three upsert paths a record took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "token", rename_all = "snake_case")]
pub enum UpsertOutcome {
  /// No live or archived row matched; a new live row was inserted.
  Inserted(IdentityToken),
  /// An archived row matched and was moved back into the live table.
  Resurrected(IdentityToken),
  /// A live row matched; only its active marker was updated.
  Touched(IdentityToken),
}

impl UpsertOutcome {
  pub fn token(&self) -> &IdentityToken {
    match self {
      Self::Inserted(t) | Self::Resurrected(t) | Self::Touched(t) => t,
    }
  }

  pub fn into_token(self) -> IdentityToken {
    match self {
      Self::Inserted(t) | Self::Resurrected(t) | Self::Touched(t) => t,
    }
  }
}

/// Per-outcome counts over a batch of upserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertTally {
  pub inserted:    usize,
  pub resurrected: usize,
  pub touched:     usize,
}

impl UpsertTally {
  pub fn record(&mut self, outcome: &UpsertOutcome) {
    match outcome {
      UpsertOutcome::Inserted(_) => self.inserted += 1,
      UpsertOutcome::Resurrected(_) => self.resurrected += 1,
      UpsertOutcome::Touched(_) => self.touched += 1,
    }
  }

  pub fn total(&self) -> usize { self.inserted + self.resurrected + self.touched }
}

/// Rows moved out of the staging table by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
  pub to_live:    usize,
  pub to_archive: usize,
}

/// What a key-definition synchronization pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyDriftReport {
  /// `true` when no key definition had been persisted yet.
  pub initialized: bool,
  /// `true` when the index did not cover the configured key column, so
  /// keys were rebuilt into it.
  pub reindexed:   bool,
  pub drift:       Drift,
  /// Rows (live and archive) whose stored key was rewritten.
  pub recomputed:  usize,
  /// Live rows moved to the archive as duplicates of the new key.
  pub reclaimed:   usize,
}

/// Summary of one full reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
  /// Neither the live nor the archive table existed before this run.
  pub tables_created: bool,
  /// Columns added, as `TABLE.COLUMN`.
  pub columns_added:  Vec<String>,
  pub key_drift:      KeyDriftReport,
  pub merge:          Option<MergeReport>,
  pub upserts:        UpsertTally,
}
