//! [`Tracker`]: the authoritative store of submission records.
//!
//! Every record sits in its own [`Slot`]: a mutex serialising transition
//! batches, and a published snapshot that readers clone without waiting on
//! that mutex. A batch (submit, poll, retry) takes the mutex, fans adapter
//! calls out concurrently, joins them, applies all outcomes, writes the
//! record through the store and only then publishes, so readers never see a
//! half-applied batch or one the store does not hold.

use std::{
  collections::HashMap,
  future::Future,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use chrono::Utc;
use futures::future::join_all;
use tally_core::{
  adapter::{AdapterError, PollStatus, SubmissionPayload},
  record::SubmissionRecord,
  store::{Ephemeral, RecordStore},
  submission::{FailureKind, TargetState, Transition},
  target::TargetKind,
};
use tokio::sync::{Mutex, RwLock, watch};
use uuid::Uuid;

use crate::{
  AdapterRegistry, Error, Result, TrackerConfig,
  query::RecordFilter,
};

// ─── Slot ────────────────────────────────────────────────────────────────────

pub(crate) struct Slot {
  /// Held for the whole of a transition batch.
  pub(crate) work: Mutex<SubmissionRecord>,
  view:            watch::Sender<SubmissionRecord>,
  /// Set while `work` holds changes the store has not accepted yet.
  dirty:           AtomicBool,
}

impl Slot {
  fn new(record: SubmissionRecord) -> Self {
    let (view, _) = watch::channel(record.clone());
    Self {
      work: Mutex::new(record),
      view,
      dirty: AtomicBool::new(false),
    }
  }

  pub(crate) fn is_dirty(&self) -> bool { self.dirty.load(Ordering::SeqCst) }

  /// The last settled state of the record.
  pub(crate) fn snapshot(&self) -> SubmissionRecord { self.view.borrow().clone() }

  fn publish(&self, record: &SubmissionRecord) { self.view.send_replace(record.clone()); }
}

// ─── Tracker ─────────────────────────────────────────────────────────────────

/// Submits items to their targets and tracks every per-target lifecycle.
pub struct Tracker<S: RecordStore = Ephemeral> {
  pub(crate) registry: AdapterRegistry,
  pub(crate) config:   TrackerConfig,
  store:               S,
  slots:               RwLock<HashMap<Uuid, Arc<Slot>>>,
}

impl Tracker<Ephemeral> {
  /// A tracker that keeps records in memory only.
  pub fn new(registry: AdapterRegistry, config: TrackerConfig) -> Self {
    Self::with_store(registry, config, Ephemeral)
  }
}

impl<S: RecordStore> Tracker<S> {
  /// An empty tracker that writes every settled record through `store`.
  pub fn with_store(registry: AdapterRegistry, config: TrackerConfig, store: S) -> Self {
    Self {
      registry,
      config,
      store,
      slots: RwLock::new(HashMap::new()),
    }
  }

  /// Load every record held by `store`.
  ///
  /// Fails with [`UnregisteredTarget`](tally_core::Error::UnregisteredTarget)
  /// if a stored record names a kind `registry` has no adapter for.
  pub async fn restore(
    registry: AdapterRegistry,
    config: TrackerConfig,
    store: S,
  ) -> Result<Self> {
    let records = store
      .list_records()
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;

    let mut slots = HashMap::with_capacity(records.len());
    for record in records {
      if let Some(missing) = record
        .targets()
        .iter()
        .map(|t| t.target())
        .find(|k| !registry.contains(*k))
      {
        return Err(tally_core::Error::UnregisteredTarget(missing).into());
      }
      slots.insert(record.id(), Arc::new(Slot::new(record)));
    }
    tracing::info!(records = slots.len(), "restored submission records");

    Ok(Self {
      registry,
      config,
      store,
      slots: RwLock::new(slots),
    })
  }

  pub fn registry(&self) -> &AdapterRegistry { &self.registry }

  pub fn config(&self) -> &TrackerConfig { &self.config }

  // ── Records ───────────────────────────────────────────────────────────────

  /// Create a record with every target `NotStarted`.
  ///
  /// Nothing is stored if this fails.
  pub async fn create_record(
    &self,
    item_label: impl Into<String>,
    owner_label: impl Into<String>,
    targets: &[TargetKind],
  ) -> Result<SubmissionRecord> {
    let budgets = targets
      .iter()
      .map(|k| (*k, self.config.max_retries_for(*k)));
    let record = SubmissionRecord::new(item_label, owner_label, budgets, Utc::now())?;

    if let Some(missing) = targets.iter().find(|k| !self.registry.contains(**k)) {
      return Err(tally_core::Error::UnregisteredTarget(*missing).into());
    }

    self.persist(&record).await?;
    self
      .slots
      .write()
      .await
      .insert(record.id(), Arc::new(Slot::new(record.clone())));

    tracing::info!(
      record_id = %record.id(),
      item = record.item_label(),
      targets = targets.len(),
      "created submission record"
    );
    Ok(record)
  }

  /// The last settled snapshot of a record.
  pub async fn get_record(&self, id: Uuid) -> Result<SubmissionRecord> {
    Ok(self.slot(id).await?.snapshot())
  }

  /// Snapshots of every record matching `filter`, in the filter's order.
  pub async fn list_records(&self, filter: &RecordFilter) -> Vec<SubmissionRecord> {
    filter.apply(self.snapshots().await, Utc::now())
  }

  // ── Operations ────────────────────────────────────────────────────────────

  /// Submit every `NotStarted` target of the record concurrently.
  ///
  /// Targets that are already pending or terminal are left alone, so calling
  /// this repeatedly is safe. Adapter failures land in the targets' error
  /// details; they are not returned.
  pub async fn submit_all(&self, id: Uuid) -> Result<SubmissionRecord> {
    let slot = self.slot(id).await?;
    let mut record = slot.work.lock().await;

    let fresh: Vec<TargetKind> = record
      .targets()
      .iter()
      .filter(|t| t.state() == TargetState::NotStarted)
      .map(|t| t.target())
      .collect();

    if fresh.is_empty() {
      tracing::debug!(record_id = %id, "nothing to submit");
      self.flush(&slot, &record).await?;
      return Ok(record.clone());
    }

    let now = Utc::now();
    for kind in &fresh {
      transition(&mut record, *kind, Transition::Dispatched, now)?;
    }
    self.dispatch(&mut record, &fresh).await?;

    self.settle(&slot, &record).await?;
    Ok(record.clone())
  }

  /// Poll every `Pending` target of the record concurrently and apply the
  /// results. Terminal and not-started targets are untouched.
  pub async fn refresh(&self, id: Uuid) -> Result<SubmissionRecord> {
    let slot = self.slot(id).await?;
    let mut record = slot.work.lock().await;

    if self.poll_pending(&mut record).await? {
      self.settle(&slot, &record).await?;
    } else {
      self.flush(&slot, &record).await?;
    }
    Ok(record.clone())
  }

  /// Retry one failed target.
  ///
  /// Fails with [`NotRetryable`](tally_core::Error::NotRetryable) unless the
  /// target is `Failed`, its failure is not permanent and its attempt count is
  /// below its budget. Otherwise the target goes back to `Pending` with one
  /// more attempt and is resubmitted.
  pub async fn retry(&self, id: Uuid, kind: TargetKind) -> Result<SubmissionRecord> {
    let slot = self.slot(id).await?;
    let mut record = slot.work.lock().await;

    let target = record
      .target(kind)
      .ok_or(tally_core::Error::TargetNotFound { record_id: id, target: kind })?;
    if let Some(reason) = target.retry_refusal() {
      return Err(
        tally_core::Error::NotRetryable { record_id: id, target: kind, reason }.into(),
      );
    }

    self.rearm(&mut record, &[kind]).await?;

    self.settle(&slot, &record).await?;
    Ok(record.clone())
  }

  /// Ask the adapter to withdraw a pending submission.
  ///
  /// Best effort: adapter failures are logged, never returned, and the
  /// target's state is not changed. A withdrawn submission shows up through
  /// the next poll.
  pub async fn cancel(&self, id: Uuid, kind: TargetKind) -> Result<()> {
    let slot = self.slot(id).await?;
    let record = slot.work.lock().await;

    let target = record
      .target(kind)
      .ok_or(tally_core::Error::TargetNotFound { record_id: id, target: kind })?;
    if target.state() != TargetState::Pending {
      tracing::debug!(record_id = %id, target = %kind, state = %target.state(), "nothing to cancel");
      return Ok(());
    }

    let Some(adapter) = self.registry.get(kind) else {
      tracing::warn!(record_id = %id, target = %kind, "cannot cancel: no adapter registered");
      return Ok(());
    };

    let handle = target.handle(id);
    if let Err(e) = self.call(adapter.cancel(&handle)).await {
      tracing::warn!(record_id = %id, target = %kind, error = %e, "cancel failed");
    }
    Ok(())
  }

  // ── Batch internals (caller holds the record lock) ────────────────────────

  /// Rearm each of `kinds` and resubmit them.
  pub(crate) async fn rearm(
    &self,
    record: &mut SubmissionRecord,
    kinds: &[TargetKind],
  ) -> Result<()> {
    let now = Utc::now();
    for kind in kinds {
      transition(record, *kind, Transition::Rearmed, now)?;
    }
    self.dispatch(record, kinds).await
  }

  /// Call `submit` for each of `kinds` (all `Pending`) and apply the results.
  async fn dispatch(
    &self,
    record: &mut SubmissionRecord,
    kinds: &[TargetKind],
  ) -> Result<()> {
    let payloads: Vec<SubmissionPayload> = record
      .targets()
      .iter()
      .filter(|t| kinds.contains(&t.target()))
      .map(|t| SubmissionPayload {
        record_id:   record.id(),
        target:      t.target(),
        item_label:  record.item_label().to_owned(),
        owner_label: record.owner_label().to_owned(),
        attempt:     t.attempt_count(),
      })
      .collect();

    let calls = payloads.iter().map(|payload| async move {
      let outcome = match self.registry.get(payload.target) {
        Some(adapter) => self.call(adapter.submit(payload)).await,
        None => Err(unregistered()),
      };
      (payload.target, outcome)
    });
    let outcomes = join_all(calls).await;

    let now = Utc::now();
    for (kind, outcome) in outcomes {
      let event = match outcome {
        Ok(ack) => Transition::Acknowledged { reference: ack.external_reference },
        Err(e) => {
          tracing::warn!(record_id = %record.id(), target = %kind, error = %e, "submit failed");
          Transition::Failed { kind: e.failure_kind(), detail: e.to_string() }
        }
      };
      transition(record, kind, event, now)?;
    }
    Ok(())
  }

  /// Poll every `Pending` target and apply the results. Returns whether any
  /// target changed.
  pub(crate) async fn poll_pending(&self, record: &mut SubmissionRecord) -> Result<bool> {
    let record_id = record.id();
    let handles: Vec<_> = record
      .targets()
      .iter()
      .filter(|t| t.state() == TargetState::Pending)
      .map(|t| t.handle(record_id))
      .collect();

    if handles.is_empty() {
      return Ok(false);
    }

    let calls = handles.iter().map(|handle| async move {
      let outcome = match self.registry.get(handle.target) {
        Some(adapter) => self.call(adapter.poll_status(handle)).await,
        None => Err(unregistered()),
      };
      (handle.target, outcome)
    });
    let outcomes = join_all(calls).await;

    let now = Utc::now();
    let mut changed = false;
    for (kind, outcome) in outcomes {
      let event = match outcome {
        Ok(PollStatus::Pending { reference }) => Transition::Acknowledged { reference },
        Ok(PollStatus::Completed { reference }) => Transition::Completed { reference },
        Ok(PollStatus::Failed { detail }) => {
          tracing::warn!(record_id = %record.id(), target = %kind, %detail, "target reported failure");
          Transition::Failed { kind: FailureKind::Rejected, detail }
        }
        Err(e) => {
          tracing::warn!(record_id = %record.id(), target = %kind, error = %e, "poll failed");
          Transition::Failed { kind: e.failure_kind(), detail: e.to_string() }
        }
      };
      changed |= transition(record, kind, event, now)?;
    }
    Ok(changed)
  }

  /// Write the settled record through the store, then publish it to readers.
  ///
  /// If the write fails the record stays unpublished and the slot is marked
  /// dirty; the next batch on it writes again (see [`Self::flush`]).
  pub(crate) async fn settle(&self, slot: &Slot, record: &SubmissionRecord) -> Result<()> {
    if let Err(e) = self.persist(record).await {
      slot.dirty.store(true, Ordering::SeqCst);
      return Err(e);
    }
    slot.dirty.store(false, Ordering::SeqCst);
    slot.publish(record);
    Ok(())
  }

  /// Settle a batch that changed nothing. Only writes if an earlier write
  /// failed.
  pub(crate) async fn flush(&self, slot: &Slot, record: &SubmissionRecord) -> Result<()> {
    if slot.is_dirty() {
      tracing::debug!(record_id = %record.id(), "rewriting record after failed write");
      self.settle(slot, record).await
    } else {
      Ok(())
    }
  }

  // ── Helpers ───────────────────────────────────────────────────────────────

  async fn persist(&self, record: &SubmissionRecord) -> Result<()> {
    self.store.put_record(record).await.map_err(|e| {
      tracing::error!(record_id = %record.id(), error = %e, "failed to persist record");
      Error::Store(Box::new(e))
    })
  }

  async fn slot(&self, id: Uuid) -> Result<Arc<Slot>> {
    self
      .slots
      .read()
      .await
      .get(&id)
      .cloned()
      .ok_or_else(|| tally_core::Error::RecordNotFound(id).into())
  }

  pub(crate) async fn slots(&self) -> Vec<Arc<Slot>> {
    self.slots.read().await.values().cloned().collect()
  }

  async fn snapshots(&self) -> Vec<SubmissionRecord> {
    self.slots().await.iter().map(|s| s.snapshot()).collect()
  }

  /// Run one adapter call under the configured timeout. An elapsed timeout is
  /// a transient error.
  async fn call<T>(
    &self,
    fut: impl Future<Output = Result<T, AdapterError>>,
  ) -> Result<T, AdapterError> {
    let limit = self.config.call_timeout;
    tokio::time::timeout(limit, fut)
      .await
      .unwrap_or_else(|_| Err(AdapterError::Transient(format!("timed out after {limit:?}"))))
  }
}

fn unregistered() -> AdapterError {
  AdapterError::Unavailable("no adapter registered for this target".to_owned())
}

/// Apply one transition, logging it. An invalid transition is a bug in this
/// crate: it panics in debug builds and is returned otherwise.
fn transition(
  record: &mut SubmissionRecord,
  kind: TargetKind,
  event: Transition,
  now: chrono::DateTime<Utc>,
) -> Result<bool> {
  match record.apply(kind, event, now) {
    Ok(changed) => {
      if changed {
        tracing::debug!(
          record_id = %record.id(),
          target = %kind,
          overall = %record.overall_status(),
          "target transition"
        );
      }
      Ok(changed)
    }
    Err(e @ tally_core::Error::InvalidTransition { .. }) => {
      tracing::error!(record_id = %record.id(), error = %e, "invalid transition");
      if cfg!(debug_assertions) {
        panic!("{e}");
      }
      Err(e.into())
    }
    Err(e) => Err(e.into()),
  }
}
