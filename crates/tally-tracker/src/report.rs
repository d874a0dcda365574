//! Read-only projections for callers: status counts, per-target breakdown
//! and elapsed-time labels.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_core::{
  record::{OverallStatus, SubmissionRecord},
  store::RecordStore,
  submission::{FailureKind, TargetState},
  target::TargetKind,
};
use uuid::Uuid;

use crate::{Tracker, query::RecordFilter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
  pub total:                 usize,
  pub pending:               usize,
  pub active:                usize,
  pub completed:             usize,
  pub failed:                usize,
  pub requires_intervention: usize,
}

impl StatusCounts {
  pub fn tally(records: &[SubmissionRecord]) -> Self {
    let mut counts = Self::default();
    for r in records {
      counts.total += 1;
      match r.overall_status() {
        OverallStatus::Pending => counts.pending += 1,
        OverallStatus::Active => counts.active += 1,
        OverallStatus::Completed => counts.completed += 1,
        OverallStatus::Failed => counts.failed += 1,
      }
      if r.requires_intervention() {
        counts.requires_intervention += 1;
      }
    }
    counts
  }
}

/// How one target kind is doing across all records that include it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetBreakdown {
  pub target:      TargetKind,
  pub not_started: usize,
  pub pending:     usize,
  pub completed:   usize,
  pub failed:      usize,
}

impl TargetBreakdown {
  fn new(target: TargetKind) -> Self {
    Self { target, not_started: 0, pending: 0, completed: 0, failed: 0 }
  }
}

/// Per-kind state counts, ordered by kind. Kinds no record uses are omitted.
pub fn breakdown(records: &[SubmissionRecord]) -> Vec<TargetBreakdown> {
  let mut by_kind: BTreeMap<TargetKind, TargetBreakdown> = BTreeMap::new();
  for t in records.iter().flat_map(SubmissionRecord::targets) {
    let entry = by_kind
      .entry(t.target())
      .or_insert_with(|| TargetBreakdown::new(t.target()));
    match t.state() {
      TargetState::NotStarted => entry.not_started += 1,
      TargetState::Pending => entry.pending += 1,
      TargetState::Completed => entry.completed += 1,
      TargetState::Failed => entry.failed += 1,
    }
  }
  by_kind.into_values().collect()
}

/// A short "how long ago" label, e.g. `"5m ago"`.
pub fn format_elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let elapsed = now - since;
  let minutes = elapsed.num_minutes();
  if minutes < 1 {
    "just now".to_owned()
  } else if minutes < 60 {
    format!("{minutes}m ago")
  } else if elapsed.num_hours() < 24 {
    format!("{}h ago", elapsed.num_hours())
  } else {
    format!("{}d ago", elapsed.num_days())
  }
}

/// A point-in-time summary of the tracker.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
  pub as_of:              DateTime<Utc>,
  pub counts:             StatusCounts,
  pub targets:            Vec<TargetBreakdown>,
  /// Records needing a human, in the order given.
  pub needs_intervention: Vec<Uuid>,
  /// Records with a rejected target that still has retry budget. The sweep
  /// never retries these, so they wait on an explicit retry.
  pub awaiting_retry:     Vec<Uuid>,
}

/// Whether any target was rejected and can still be retried by hand.
pub fn awaits_manual_retry(record: &SubmissionRecord) -> bool {
  record
    .targets()
    .iter()
    .any(|t| t.failure() == Some(FailureKind::Rejected) && t.is_retryable())
}

impl Report {
  pub fn build(records: &[SubmissionRecord], now: DateTime<Utc>) -> Self {
    Self {
      as_of:              now,
      counts:             StatusCounts::tally(records),
      targets:            breakdown(records),
      needs_intervention: records
        .iter()
        .filter(|r| r.requires_intervention())
        .map(SubmissionRecord::id)
        .collect(),
      awaiting_retry:     records
        .iter()
        .filter(|r| awaits_manual_retry(r))
        .map(SubmissionRecord::id)
        .collect(),
    }
  }
}

impl<S: RecordStore> Tracker<S> {
  /// Summarise every record the tracker holds.
  pub async fn report(&self) -> Report {
    let records = self.list_records(&RecordFilter::default()).await;
    Report::build(&records, Utc::now())
  }
}
