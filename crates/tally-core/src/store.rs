//! The `RecordStore` trait: durable snapshots of submission records.
//!
//! The tracker's in-memory store is the single authority over records; a
//! `RecordStore` only receives a copy of each record after every settled
//! batch of transitions and hands them back at startup. Backends (e.g.
//! `tally-store-sqlite`) implement this trait; the tracker depends only on
//! the abstraction.

use std::{convert::Infallible, future::Future};

use uuid::Uuid;

use crate::record::SubmissionRecord;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a durable record backend.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait RecordStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Insert or replace the snapshot of `record`.
  fn put_record<'a>(
    &'a self,
    record: &'a SubmissionRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Retrieve a snapshot by id. Returns `None` if not found.
  fn get_record(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<SubmissionRecord>, Self::Error>> + Send + '_;

  /// Every stored snapshot, in no particular order.
  fn list_records(
    &self,
  ) -> impl Future<Output = Result<Vec<SubmissionRecord>, Self::Error>> + Send + '_;
}

// ─── No-op backend ───────────────────────────────────────────────────────────

/// A store that keeps nothing; records live only as long as the tracker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ephemeral;

impl RecordStore for Ephemeral {
  type Error = Infallible;

  async fn put_record(&self, _record: &SubmissionRecord) -> Result<(), Infallible> {
    Ok(())
  }

  async fn get_record(&self, _id: Uuid) -> Result<Option<SubmissionRecord>, Infallible> {
    Ok(None)
  }

  async fn list_records(&self) -> Result<Vec<SubmissionRecord>, Infallible> {
    Ok(Vec::new())
  }
}
