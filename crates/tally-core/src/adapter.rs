//! The Target Adapter capability.
//!
//! One implementation exists per [`TargetKind`]. Adapters are stateless from
//! the tracker's point of view: they receive read-only payloads, talk to their
//! external system and report outcomes. They never own or mutate records.
//!
//! The trait is object-safe (via [`async_trait`]) so that a registry can hold
//! a heterogeneous set of adapters as `Arc<dyn TargetAdapter>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{submission::FailureKind, target::TargetKind};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// What an adapter is asked to register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionPayload {
  pub record_id:   Uuid,
  pub target:      TargetKind,
  pub item_label:  String,
  pub owner_label: String,
  /// Zero for the first submission, incremented by every retry.
  pub attempt:     u32,
}

/// Identifies one submission on the adapter's side.
///
/// Built entirely from data the record already holds, so polling can resume
/// after a restart without persisting anything adapter-specific.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionHandle {
  pub record_id:          Uuid,
  pub target:             TargetKind,
  pub external_reference: Option<String>,
}

// ─── Outputs ─────────────────────────────────────────────────────────────────

/// Returned by a successful [`TargetAdapter::submit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
  /// The external system's id for the registration, if it issued one yet.
  pub external_reference: Option<String>,
}

/// Result of a non-blocking status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollStatus {
  Pending {
    reference: Option<String>,
  },
  /// A completed registration always has a reference.
  Completed {
    reference: String,
  },
  Failed {
    detail: String,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
  /// The external system could not be reached at all.
  #[error("adapter unavailable: {0}")]
  Unavailable(String),

  #[error("transient adapter error: {0}")]
  Transient(String),

  /// The external system refused the submission outright, e.g. invalid
  /// metadata. Retrying cannot help.
  #[error("permanent adapter error: {0}")]
  Permanent(String),
}

impl AdapterError {
  pub fn failure_kind(&self) -> FailureKind {
    match self {
      Self::Unavailable(_) | Self::Transient(_) => FailureKind::Transient,
      Self::Permanent(_) => FailureKind::Permanent,
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Uniform interface over one external registrar.
#[async_trait]
pub trait TargetAdapter: Send + Sync {
  /// The kind of target this adapter serves.
  fn kind(&self) -> TargetKind;

  /// Start registering an item and return immediately.
  ///
  /// Must be idempotent per `(payload.record_id, payload.target)`: a second
  /// call for the same pair must not create a second external registration.
  async fn submit(
    &self,
    payload: &SubmissionPayload,
  ) -> Result<SubmitAck, AdapterError>;

  /// Check on a submission without blocking on the external system.
  async fn poll_status(
    &self,
    handle: &SubmissionHandle,
  ) -> Result<PollStatus, AdapterError>;

  /// Best-effort withdrawal of a submission.
  async fn cancel(&self, handle: &SubmissionHandle) -> Result<(), AdapterError>;
}
