//! Error types for `archivist-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  /// A table or column name that cannot be safely interpolated into SQL.
  #[error("invalid identifier: {0:?}")]
  InvalidIdentifier(String),

  #[error("invalid exclusion character code: {0}")]
  InvalidExclusionCode(u32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
