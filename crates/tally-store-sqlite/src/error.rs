//! Error type for `tally-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// A stored snapshot failed to decode, or violated a record invariant.
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// The `record_id` column disagrees with the id inside the snapshot.
  #[error("row {row} holds a snapshot of record {snapshot}")]
  IdMismatch { row: uuid::Uuid, snapshot: uuid::Uuid },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
