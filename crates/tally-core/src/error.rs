//! Error types for `tally-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  submission::{TargetState, Transition},
  target::TargetKind,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("record not found: {0}")]
  RecordNotFound(Uuid),

  #[error("record {record_id} has no {target} target")]
  TargetNotFound {
    record_id: Uuid,
    target:    TargetKind,
  },

  #[error("a record needs at least one target")]
  EmptyTargetSet,

  #[error("target {0} listed more than once")]
  DuplicateTarget(TargetKind),

  #[error("no adapter registered for target {0}")]
  UnregisteredTarget(TargetKind),

  /// A transition the state machine does not allow. Reaching this is a bug in
  /// the caller, never an expected runtime condition.
  #[error("invalid transition for {target}: {event} while {from}")]
  InvalidTransition {
    target: TargetKind,
    from:   TargetState,
    event:  Transition,
  },

  #[error("{target} on record {record_id} is not retryable: {reason}")]
  NotRetryable {
    record_id: Uuid,
    target:    TargetKind,
    reason:    String,
  },

  #[error("invalid record snapshot: {0}")]
  InvalidSnapshot(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
