//! Error type for `tally-tracker`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A usage error from the record model: unknown record, empty or duplicate
  /// target set, refused retry, and so on.
  #[error(transparent)]
  Record(#[from] tally_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
