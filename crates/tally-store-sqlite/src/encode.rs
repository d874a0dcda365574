//! Conversions between records and the plain-text columns stored in SQLite.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings, and
//! the record itself compact JSON.

use chrono::{DateTime, Utc};
use tally_core::record::SubmissionRecord;
use uuid::Uuid;

use crate::{Error, Result};

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

/// The column values of one `records` row.
pub struct RecordRow {
  pub record_id:       String,
  pub item_label:      String,
  pub owner_label:     String,
  pub overall_status:  String,
  pub created_at:      String,
  pub last_updated_at: String,
  pub record_json:     String,
}

impl RecordRow {
  pub fn encode(record: &SubmissionRecord) -> Result<Self> {
    Ok(Self {
      record_id:       encode_uuid(record.id()),
      item_label:      record.item_label().to_owned(),
      owner_label:     record.owner_label().to_owned(),
      overall_status:  record.overall_status().to_string(),
      created_at:      encode_dt(record.created_at()),
      last_updated_at: encode_dt(record.last_updated_at()),
      record_json:     serde_json::to_string(record)?,
    })
  }
}

/// The two columns needed to rebuild a record.
pub struct RawRecord {
  pub record_id:   String,
  pub record_json: String,
}

impl RawRecord {
  /// Deserialise the snapshot; the record type re-checks its own invariants.
  pub fn decode(self) -> Result<SubmissionRecord> {
    let row = decode_uuid(&self.record_id)?;
    let record: SubmissionRecord = serde_json::from_str(&self.record_json)?;
    if record.id() != row {
      return Err(Error::IdMismatch { row, snapshot: record.id() });
    }
    Ok(record)
  }
}
