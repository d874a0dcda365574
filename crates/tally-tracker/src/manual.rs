//! Manual attestation: targets whose outcome is asserted by a person.
//!
//! Some registrations happen outside any API, e.g. a bulk upload to a
//! registrar's portal after which someone marks the song as registered.
//! Rather than special-casing those targets in the tracker, they get an
//! adapter like any other: [`ManualAdapter::poll_status`] reports whatever
//! was last recorded on the shared [`AttestationDesk`].

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tally_core::{
  adapter::{
    AdapterError, PollStatus, SubmissionHandle, SubmissionPayload, SubmitAck, TargetAdapter,
  },
  target::TargetKind,
};
use tokio::sync::Mutex;
use uuid::Uuid;

/// What a person recorded about one registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Attestation {
  Pending,
  Completed { reference: String },
  Failed { detail: String },
}

impl From<Attestation> for PollStatus {
  fn from(a: Attestation) -> Self {
    match a {
      Attestation::Pending => PollStatus::Pending { reference: None },
      Attestation::Completed { reference } => PollStatus::Completed { reference },
      Attestation::Failed { detail } => PollStatus::Failed { detail },
    }
  }
}

#[derive(Debug, Clone)]
struct Entry {
  attestation: Attestation,
  /// The submission attempt this entry belongs to.
  attempt:     u32,
}

/// Shared register of human-recorded outcomes, keyed by record and target.
#[derive(Debug, Default)]
pub struct AttestationDesk {
  entries: Mutex<HashMap<(Uuid, TargetKind), Entry>>,
}

impl AttestationDesk {
  pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

  /// Record an outcome. Overwrites whatever was there before.
  pub async fn attest(&self, record_id: Uuid, target: TargetKind, attestation: Attestation) {
    let mut entries = self.entries.lock().await;
    let entry = entries.entry((record_id, target)).or_insert(Entry {
      attestation: Attestation::Pending,
      attempt:     0,
    });
    tracing::info!(%record_id, %target, ?attestation, "attestation recorded");
    entry.attestation = attestation;
  }

  pub async fn get(&self, record_id: Uuid, target: TargetKind) -> Option<Attestation> {
    self
      .entries
      .lock()
      .await
      .get(&(record_id, target))
      .map(|e| e.attestation.clone())
  }

  /// Open an entry for `attempt`. A repeat of the same (or an older) attempt
  /// changes nothing; a newer attempt starts over as pending.
  async fn open(&self, record_id: Uuid, target: TargetKind, attempt: u32) {
    let mut entries = self.entries.lock().await;
    match entries.get_mut(&(record_id, target)) {
      Some(entry) if attempt <= entry.attempt => {}
      Some(entry) => {
        entry.attempt = attempt;
        entry.attestation = Attestation::Pending;
      }
      None => {
        entries.insert(
          (record_id, target),
          Entry { attestation: Attestation::Pending, attempt },
        );
      }
    }
  }
}

/// Adapter for one target kind whose outcomes come from an [`AttestationDesk`].
#[derive(Debug, Clone)]
pub struct ManualAdapter {
  kind: TargetKind,
  desk: Arc<AttestationDesk>,
}

impl ManualAdapter {
  pub fn new(kind: TargetKind, desk: Arc<AttestationDesk>) -> Self { Self { kind, desk } }
}

#[async_trait]
impl TargetAdapter for ManualAdapter {
  fn kind(&self) -> TargetKind { self.kind }

  async fn submit(&self, payload: &SubmissionPayload) -> Result<SubmitAck, AdapterError> {
    self
      .desk
      .open(payload.record_id, payload.target, payload.attempt)
      .await;
    Ok(SubmitAck::default())
  }

  async fn poll_status(&self, handle: &SubmissionHandle) -> Result<PollStatus, AdapterError> {
    Ok(
      self
        .desk
        .get(handle.record_id, handle.target)
        .await
        .map_or(PollStatus::Pending { reference: None }, PollStatus::from),
    )
  }

  async fn cancel(&self, handle: &SubmissionHandle) -> Result<(), AdapterError> {
    self
      .desk
      .attest(
        handle.record_id,
        handle.target,
        Attestation::Failed { detail: "withdrawn".to_owned() },
      )
      .await;
    Ok(())
  }
}
