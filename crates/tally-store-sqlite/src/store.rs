//! [`SqliteStore`]: the SQLite implementation of [`RecordStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use tally_core::{
  record::{OverallStatus, SubmissionRecord},
  store::RecordStore,
};
use uuid::Uuid;

use crate::{
  Result,
  encode::{RawRecord, RecordRow, encode_uuid},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A record store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Stored records whose last written overall status is `status`, oldest
  /// update first.
  pub async fn list_by_status(&self, status: OverallStatus) -> Result<Vec<SubmissionRecord>> {
    let status_str = status.to_string();

    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT record_id, record_json FROM records
           WHERE overall_status = ?1
           ORDER BY last_updated_at ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![status_str], |row| {
            Ok(RawRecord { record_id: row.get(0)?, record_json: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::decode).collect()
  }
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteStore {
  type Error = crate::Error;

  async fn put_record(&self, record: &SubmissionRecord) -> Result<()> {
    let row = RecordRow::encode(record)?;
    let record_id = record.id();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO records (
             record_id, item_label, owner_label, overall_status,
             created_at, last_updated_at, record_json
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (record_id) DO UPDATE SET
             item_label      = excluded.item_label,
             owner_label     = excluded.owner_label,
             overall_status  = excluded.overall_status,
             last_updated_at = excluded.last_updated_at,
             record_json     = excluded.record_json",
          rusqlite::params![
            row.record_id,
            row.item_label,
            row.owner_label,
            row.overall_status,
            row.created_at,
            row.last_updated_at,
            row.record_json,
          ],
        )?;
        Ok(())
      })
      .await?;

    tracing::trace!(%record_id, "record written");
    Ok(())
  }

  async fn get_record(&self, id: Uuid) -> Result<Option<SubmissionRecord>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT record_id, record_json FROM records WHERE record_id = ?1",
              rusqlite::params![id_str],
              |row| Ok(RawRecord { record_id: row.get(0)?, record_json: row.get(1)? }),
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRecord::decode).transpose()
  }

  async fn list_records(&self) -> Result<Vec<SubmissionRecord>> {
    let raws: Vec<RawRecord> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT record_id, record_json FROM records")?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawRecord { record_id: row.get(0)?, record_json: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRecord::decode).collect()
  }
}
