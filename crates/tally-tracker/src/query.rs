//! Filtering and ordering of record snapshots.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tally_core::{
  record::{OverallStatus, SubmissionRecord},
  submission::TargetState,
  target::TargetKind,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
  #[default]
  LastUpdatedDesc,
  LastUpdatedAsc,
  CreatedDesc,
  ItemLabelAsc,
}

/// Parameters for [`Tracker::list_records`](crate::Tracker::list_records).
/// Every `None` field matches everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
  pub status:       Option<OverallStatus>,
  /// Only records that include this target.
  pub target:       Option<TargetKind>,
  /// With `target`: only records whose target is in this state. Alone: any
  /// target in this state.
  pub target_state: Option<TargetState>,
  /// Case-insensitive substring of the item or owner label.
  pub text:         Option<String>,
  /// Only records not updated for at least this long.
  pub stale_for:    Option<Duration>,
  pub sort:         SortOrder,
  pub limit:        Option<usize>,
  pub offset:       Option<usize>,
}

impl RecordFilter {
  pub fn matches(&self, record: &SubmissionRecord, now: DateTime<Utc>) -> bool {
    if self.status.is_some_and(|s| s != record.overall_status()) {
      return false;
    }

    let state_ok = |state: TargetState| self.target_state.is_none_or(|want| want == state);
    let target_ok = match self.target {
      Some(kind) => record.target(kind).is_some_and(|t| state_ok(t.state())),
      None if self.target_state.is_some() => {
        record.targets().iter().any(|t| state_ok(t.state()))
      }
      None => true,
    };
    if !target_ok {
      return false;
    }

    if let Some(text) = &self.text {
      let needle = text.to_lowercase();
      if !record.item_label().to_lowercase().contains(&needle)
        && !record.owner_label().to_lowercase().contains(&needle)
      {
        return false;
      }
    }

    if let Some(age) = self.stale_for
      && now - record.last_updated_at() < age
    {
      return false;
    }

    true
  }

  /// Keep matching records, sort them and apply `offset`/`limit`.
  pub fn apply(
    &self,
    records: Vec<SubmissionRecord>,
    now: DateTime<Utc>,
  ) -> Vec<SubmissionRecord> {
    let mut kept: Vec<SubmissionRecord> =
      records.into_iter().filter(|r| self.matches(r, now)).collect();
    kept.sort_by(|a, b| compare(self.sort, a, b));

    kept
      .into_iter()
      .skip(self.offset.unwrap_or(0))
      .take(self.limit.unwrap_or(usize::MAX))
      .collect()
  }
}

fn compare(order: SortOrder, a: &SubmissionRecord, b: &SubmissionRecord) -> Ordering {
  let primary = match order {
    SortOrder::LastUpdatedDesc => b.last_updated_at().cmp(&a.last_updated_at()),
    SortOrder::LastUpdatedAsc => a.last_updated_at().cmp(&b.last_updated_at()),
    SortOrder::CreatedDesc => b.created_at().cmp(&a.created_at()),
    SortOrder::ItemLabelAsc => a
      .item_label()
      .to_lowercase()
      .cmp(&b.item_label().to_lowercase()),
  };
  primary.then_with(|| a.id().cmp(&b.id()))
}
