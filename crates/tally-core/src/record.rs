//! Submission records and the aggregation that rolls their targets up into
//! one overall status.
//!
//! The overall status is derived, never stored as independent truth: it is
//! recomputed after every transition and again whenever a snapshot is loaded.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{
  Error, Result,
  submission::{PerTargetSubmission, TargetState, Transition},
  target::TargetKind,
};

// ─── Overall status ──────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverallStatus {
  /// Nothing has been submitted yet.
  Pending,
  /// Some progress, no unrecoverable failure.
  Active,
  Completed,
  /// At least one target failed beyond recovery.
  Failed,
}

impl OverallStatus {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Completed | Self::Failed) }
}

/// Roll per-target states up into an [`OverallStatus`]. First match wins:
///
/// 1. any target failed with its budget exhausted → `Failed`
/// 2. every target completed → `Completed`
/// 3. any target pending or failed-but-retryable → `Active`
/// 4. otherwise (all not started) → `Pending`
pub fn aggregate(targets: &[PerTargetSubmission]) -> OverallStatus {
  if targets.iter().any(PerTargetSubmission::is_exhausted) {
    return OverallStatus::Failed;
  }
  if !targets.is_empty()
    && targets.iter().all(|t| t.state() == TargetState::Completed)
  {
    return OverallStatus::Completed;
  }
  if targets
    .iter()
    .any(|t| t.state() == TargetState::Pending || t.is_retryable())
  {
    return OverallStatus::Active;
  }
  OverallStatus::Pending
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// One logical item (e.g. a song) and its registration with every target.
///
/// The target list is fixed at creation. Derived fields (`overall_status`,
/// `requires_intervention`, `last_updated_at`) are kept in sync by
/// [`Self::apply`] and are serialised for readers, but ignored and recomputed
/// on deserialisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RecordSnapshot")]
pub struct SubmissionRecord {
  id:                    Uuid,
  item_label:            String,
  owner_label:           String,
  targets:               Vec<PerTargetSubmission>,
  overall_status:        OverallStatus,
  requires_intervention: bool,
  created_at:            DateTime<Utc>,
  last_updated_at:       DateTime<Utc>,
}

impl SubmissionRecord {
  /// Create a record with every target `NotStarted`.
  ///
  /// `targets` pairs each kind with its retry budget; order is preserved.
  pub fn new(
    item_label: impl Into<String>,
    owner_label: impl Into<String>,
    targets: impl IntoIterator<Item = (TargetKind, u32)>,
    now: DateTime<Utc>,
  ) -> Result<Self> {
    let targets: Vec<PerTargetSubmission> = targets
      .into_iter()
      .map(|(kind, max_retries)| PerTargetSubmission::new(kind, max_retries, now))
      .collect();
    check_target_set(&targets)?;

    let mut record = Self {
      id: Uuid::new_v4(),
      item_label: item_label.into(),
      owner_label: owner_label.into(),
      targets,
      overall_status: OverallStatus::Pending,
      requires_intervention: false,
      created_at: now,
      last_updated_at: now,
    };
    record.recompute();
    Ok(record)
  }

  pub fn id(&self) -> Uuid { self.id }

  pub fn item_label(&self) -> &str { &self.item_label }

  pub fn owner_label(&self) -> &str { &self.owner_label }

  pub fn targets(&self) -> &[PerTargetSubmission] { &self.targets }

  pub fn target(&self, kind: TargetKind) -> Option<&PerTargetSubmission> {
    self.targets.iter().find(|t| t.target() == kind)
  }

  pub fn overall_status(&self) -> OverallStatus { self.overall_status }

  pub fn requires_intervention(&self) -> bool { self.requires_intervention }

  pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

  pub fn last_updated_at(&self) -> DateTime<Utc> { self.last_updated_at }

  /// Every target has reached a terminal state; nothing will change without
  /// outside intervention.
  ///
  /// This can lag behind [`OverallStatus::Failed`]: one exhausted target fails
  /// the record immediately while its siblings may still be pending.
  pub fn is_settled(&self) -> bool {
    self.targets.iter().all(PerTargetSubmission::is_terminal)
  }

  /// Apply `transition` to the target of kind `kind` and recompute derived
  /// fields. Returns `true` if the target changed.
  pub fn apply(
    &mut self,
    kind: TargetKind,
    transition: Transition,
    now: DateTime<Utc>,
  ) -> Result<bool> {
    let record_id = self.id;
    let target = self
      .targets
      .iter_mut()
      .find(|t| t.target() == kind)
      .ok_or(Error::TargetNotFound { record_id, target: kind })?;

    let changed = target.apply(transition, now)?;
    if changed {
      self.recompute();
    }
    Ok(changed)
  }

  fn recompute(&mut self) {
    self.overall_status = aggregate(&self.targets);
    self.requires_intervention = self.overall_status == OverallStatus::Failed;
    self.last_updated_at = self
      .targets
      .iter()
      .map(PerTargetSubmission::last_updated_at)
      .max()
      .unwrap_or(self.created_at);
  }
}

fn check_target_set(targets: &[PerTargetSubmission]) -> Result<()> {
  if targets.is_empty() {
    return Err(Error::EmptyTargetSet);
  }
  let mut seen = HashSet::new();
  for t in targets {
    if !seen.insert(t.target()) {
      return Err(Error::DuplicateTarget(t.target()));
    }
  }
  Ok(())
}

// ─── Snapshot loading ────────────────────────────────────────────────────────

/// Wire shape of a record. Derived fields may be present but are ignored.
#[derive(Deserialize)]
struct RecordSnapshot {
  id:          Uuid,
  item_label:  String,
  owner_label: String,
  targets:     Vec<PerTargetSubmission>,
  created_at:  DateTime<Utc>,
}

impl TryFrom<RecordSnapshot> for SubmissionRecord {
  type Error = Error;

  fn try_from(raw: RecordSnapshot) -> Result<Self> {
    check_target_set(&raw.targets)
      .map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
    for t in &raw.targets {
      t.validate().map_err(Error::InvalidSnapshot)?;
    }

    let mut record = Self {
      id:                    raw.id,
      item_label:            raw.item_label,
      owner_label:           raw.owner_label,
      targets:               raw.targets,
      overall_status:        OverallStatus::Pending,
      requires_intervention: false,
      created_at:            raw.created_at,
      last_updated_at:       raw.created_at,
    };
    record.recompute();
    Ok(record)
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
