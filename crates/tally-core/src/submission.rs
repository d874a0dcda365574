//! Per-target submissions and the state machine that moves them.
//!
//! ```text
//! NotStarted ──Dispatched──▶ Pending ──Completed──▶ Completed
//!                              │  ▲
//!                        Failed│  │Rearmed (authorised retry only)
//!                              ▼  │
//!                             Failed
//! ```
//!
//! `Acknowledged` is a self-loop on `Pending` that records the external
//! reference once the target issues one. Every other combination is an
//! [`Error::InvalidTransition`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, adapter::SubmissionHandle, target::TargetKind};

// ─── States ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetState {
  NotStarted,
  Pending,
  Completed,
  Failed,
}

/// Why a target ended up `Failed`; decides how it may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
  /// Timeout or transient adapter error. Retried automatically while budget
  /// remains.
  Transient,
  /// The target reported the registration as failed. Retryable on request
  /// only: the sweep leaves it alone, so the record stays `Active` (without
  /// `requires_intervention`) until someone retries it or the budget runs
  /// out. Reports list such records as awaiting retry.
  Rejected,
  /// The adapter refused the submission for good; the budget is exhausted.
  Permanent,
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// An event applied to a [`PerTargetSubmission`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
  /// The submission was handed to the adapter.
  Dispatched,
  /// The target confirmed receipt, possibly issuing a reference.
  Acknowledged { reference: Option<String> },
  Completed { reference: String },
  Failed { kind: FailureKind, detail: String },
  /// An authorised retry.
  Rearmed,
}

impl fmt::Display for Transition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Dispatched => "dispatched",
      Self::Acknowledged { .. } => "acknowledged",
      Self::Completed { .. } => "completed",
      Self::Failed { .. } => "failed",
      Self::Rearmed => "rearmed",
    };
    f.write_str(name)
  }
}

// ─── Submission ──────────────────────────────────────────────────────────────

/// One item's registration with one target.
///
/// Fields are private: every change goes through [`Self::apply`] so the
/// reference/detail invariants cannot be broken from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerTargetSubmission {
  target:             TargetKind,
  state:              TargetState,
  external_reference: Option<String>,
  error_detail:       Option<String>,
  failure:            Option<FailureKind>,
  attempt_count:      u32,
  /// Retry budget snapshotted from configuration when the record was created.
  max_retries:        u32,
  submitted_at:       Option<DateTime<Utc>>,
  completed_at:       Option<DateTime<Utc>>,
  last_updated_at:    DateTime<Utc>,
}

impl PerTargetSubmission {
  pub fn new(target: TargetKind, max_retries: u32, now: DateTime<Utc>) -> Self {
    Self {
      target,
      state: TargetState::NotStarted,
      external_reference: None,
      error_detail: None,
      failure: None,
      attempt_count: 0,
      max_retries,
      submitted_at: None,
      completed_at: None,
      last_updated_at: now,
    }
  }

  pub fn target(&self) -> TargetKind { self.target }

  pub fn state(&self) -> TargetState { self.state }

  pub fn external_reference(&self) -> Option<&str> {
    self.external_reference.as_deref()
  }

  pub fn error_detail(&self) -> Option<&str> { self.error_detail.as_deref() }

  pub fn failure(&self) -> Option<FailureKind> { self.failure }

  pub fn attempt_count(&self) -> u32 { self.attempt_count }

  pub fn max_retries(&self) -> u32 { self.max_retries }

  pub fn submitted_at(&self) -> Option<DateTime<Utc>> { self.submitted_at }

  pub fn completed_at(&self) -> Option<DateTime<Utc>> { self.completed_at }

  pub fn last_updated_at(&self) -> DateTime<Utc> { self.last_updated_at }

  /// `Failed` with budget left, whatever the failure kind except permanent.
  pub fn is_retryable(&self) -> bool {
    self.state == TargetState::Failed
      && self.failure != Some(FailureKind::Permanent)
      && self.attempt_count < self.max_retries
  }

  /// `Failed` and no retry will ever be authorised.
  pub fn is_exhausted(&self) -> bool {
    self.state == TargetState::Failed && !self.is_retryable()
  }

  /// Completed, or failed beyond recovery.
  pub fn is_terminal(&self) -> bool {
    self.state == TargetState::Completed || self.is_exhausted()
  }

  /// Whether the background sweep may retry this target without a human.
  pub fn is_auto_retryable(&self) -> bool {
    self.is_retryable() && self.failure == Some(FailureKind::Transient)
  }

  /// Human-readable reason a retry would be refused, or `None` if it would be
  /// accepted.
  pub fn retry_refusal(&self) -> Option<String> {
    if self.state != TargetState::Failed {
      return Some(format!("target is {}, not failed", self.state));
    }
    if self.failure == Some(FailureKind::Permanent) {
      return Some("failure is permanent".to_owned());
    }
    if self.attempt_count >= self.max_retries {
      return Some(format!(
        "retry budget exhausted ({}/{})",
        self.attempt_count, self.max_retries
      ));
    }
    None
  }

  /// The adapter-side handle for this submission.
  pub fn handle(&self, record_id: Uuid) -> SubmissionHandle {
    SubmissionHandle {
      record_id,
      target: self.target,
      external_reference: self.external_reference.clone(),
    }
  }

  /// Apply `transition`. Returns `true` if anything observable changed.
  ///
  /// An `Acknowledged` that carries no new reference is a no-op and does not
  /// touch `last_updated_at`, so an unchanged `Pending` target ages normally.
  pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> Result<bool> {
    use TargetState as S;

    match (self.state, transition) {
      (S::NotStarted, Transition::Dispatched) => {
        self.state = S::Pending;
        self.submitted_at = Some(now);
      }
      (S::Pending, Transition::Acknowledged { reference }) => {
        match reference {
          Some(r) if self.external_reference.as_deref() != Some(r.as_str()) => {
            self.external_reference = Some(r);
          }
          _ => return Ok(false),
        }
      }
      (S::Pending, Transition::Completed { reference }) => {
        self.state = S::Completed;
        self.external_reference = Some(reference);
        self.completed_at = Some(now);
      }
      (S::Pending, Transition::Failed { kind, detail }) => {
        self.state = S::Failed;
        self.external_reference = None;
        self.error_detail = Some(detail);
        self.failure = Some(kind);
      }
      (S::Failed, Transition::Rearmed) if self.is_retryable() => {
        self.state = S::Pending;
        self.attempt_count += 1;
        self.error_detail = None;
        self.failure = None;
        self.submitted_at = Some(now);
      }
      (from, event) => {
        return Err(Error::InvalidTransition {
          target: self.target,
          from,
          event,
        });
      }
    }

    self.last_updated_at = now;
    Ok(true)
  }

  /// Check the field invariants; used when loading snapshots from outside.
  pub fn validate(&self) -> Result<(), String> {
    let has_ref = self.external_reference.is_some();
    let failed = self.state == TargetState::Failed;

    match self.state {
      TargetState::Completed if !has_ref => {
        return Err(format!("{}: completed without a reference", self.target));
      }
      TargetState::NotStarted | TargetState::Failed if has_ref => {
        return Err(format!("{}: {} with a reference", self.target, self.state));
      }
      _ => {}
    }
    if failed != self.error_detail.is_some() || failed != self.failure.is_some() {
      return Err(format!(
        "{}: error detail must be present exactly when failed",
        self.target
      ));
    }
    if self.attempt_count > self.max_retries {
      return Err(format!(
        "{}: attempt count {} exceeds budget {}",
        self.target, self.attempt_count, self.max_retries
      ));
    }
    Ok(())
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
