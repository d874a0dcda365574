//! Integration tests for `Tracker` against scripted adapters.

use std::{
  collections::{HashMap, VecDeque},
  sync::{
    Arc,
    Mutex as StdMutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use tally_core::{
  adapter::{
    AdapterError, PollStatus, SubmissionHandle, SubmissionPayload, SubmitAck, TargetAdapter,
  },
  record::{OverallStatus, SubmissionRecord},
  store::RecordStore,
  submission::{FailureKind, TargetState},
  target::TargetKind::{self, MechanicalLicensing as A, PerformanceRights as B, RoyaltyCollection as C},
};
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

use crate::{
  AdapterRegistry, Error, Tracker, TrackerConfig,
  manual::{Attestation, AttestationDesk, ManualAdapter},
  query::RecordFilter,
};

// ─── Scripted adapter ────────────────────────────────────────────────────────

/// Plays back queued submit and poll results. An empty submit queue acks
/// without a reference; an empty poll queue reports pending.
struct ScriptedAdapter {
  kind:         TargetKind,
  submits:      StdMutex<VecDeque<Result<SubmitAck, AdapterError>>>,
  polls:        StdMutex<VecDeque<Result<PollStatus, AdapterError>>>,
  cancel_error: Option<AdapterError>,
  submit_delay: Option<Duration>,
  poll_delay:   Option<Duration>,
  poll_gate:    Option<Arc<Semaphore>>,
  submit_calls: AtomicUsize,
  poll_calls:   AtomicUsize,
  cancel_calls: AtomicUsize,
}

impl ScriptedAdapter {
  fn new(kind: TargetKind) -> Self {
    Self {
      kind,
      submits: StdMutex::new(VecDeque::new()),
      polls: StdMutex::new(VecDeque::new()),
      cancel_error: None,
      submit_delay: None,
      poll_delay: None,
      poll_gate: None,
      submit_calls: AtomicUsize::new(0),
      poll_calls: AtomicUsize::new(0),
      cancel_calls: AtomicUsize::new(0),
    }
  }

  fn submits(self, script: impl IntoIterator<Item = Result<SubmitAck, AdapterError>>) -> Self {
    self.submits.lock().unwrap().extend(script);
    self
  }

  fn polls(self, script: impl IntoIterator<Item = Result<PollStatus, AdapterError>>) -> Self {
    self.polls.lock().unwrap().extend(script);
    self
  }

  fn submit_calls(&self) -> usize { self.submit_calls.load(Ordering::SeqCst) }

  fn poll_calls(&self) -> usize { self.poll_calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl TargetAdapter for ScriptedAdapter {
  fn kind(&self) -> TargetKind { self.kind }

  async fn submit(&self, _payload: &SubmissionPayload) -> Result<SubmitAck, AdapterError> {
    self.submit_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.submit_delay {
      tokio::time::sleep(delay).await;
    }
    let next = self.submits.lock().unwrap().pop_front();
    next.unwrap_or(Ok(SubmitAck::default()))
  }

  async fn poll_status(&self, _handle: &SubmissionHandle) -> Result<PollStatus, AdapterError> {
    self.poll_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(gate) = &self.poll_gate {
      let _permit = gate.acquire().await.unwrap();
    }
    if let Some(delay) = self.poll_delay {
      tokio::time::sleep(delay).await;
    }
    let next = self.polls.lock().unwrap().pop_front();
    next.unwrap_or(Ok(PollStatus::Pending { reference: None }))
  }

  async fn cancel(&self, _handle: &SubmissionHandle) -> Result<(), AdapterError> {
    self.cancel_calls.fetch_add(1, Ordering::SeqCst);
    match &self.cancel_error {
      Some(e) => Err(e.clone()),
      None => Ok(()),
    }
  }
}

fn done(reference: &str) -> Result<PollStatus, AdapterError> {
  Ok(PollStatus::Completed { reference: reference.into() })
}

fn still_pending() -> Result<PollStatus, AdapterError> {
  Ok(PollStatus::Pending { reference: None })
}

fn transient() -> AdapterError { AdapterError::Transient("503 from upstream".into()) }

fn tracker_with(adapters: Vec<Arc<ScriptedAdapter>>) -> Tracker {
  let registry = adapters
    .into_iter()
    .try_fold(AdapterRegistry::new(), |r, a| r.register(a))
    .unwrap();
  Tracker::new(registry, TrackerConfig::default())
}

async fn record(tracker: &Tracker, kinds: &[TargetKind]) -> SubmissionRecord {
  tracker
    .create_record("Blue Hour", "Ada Lovelace", kinds)
    .await
    .unwrap()
}

fn state(r: &SubmissionRecord, kind: TargetKind) -> TargetState {
  r.target(kind).unwrap().state()
}

// ─── Creation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn empty_target_set_stores_nothing() {
  let tracker = tracker_with(vec![Arc::new(ScriptedAdapter::new(A))]);

  let err = tracker.create_record("x", "y", &[]).await.unwrap_err();
  assert!(matches!(err, Error::Record(tally_core::Error::EmptyTargetSet)));
  assert!(tracker.list_records(&RecordFilter::default()).await.is_empty());
}

#[tokio::test]
async fn duplicate_and_unregistered_targets_are_rejected() {
  let tracker = tracker_with(vec![Arc::new(ScriptedAdapter::new(A))]);

  let err = tracker.create_record("x", "y", &[A, A]).await.unwrap_err();
  assert!(matches!(err, Error::Record(tally_core::Error::DuplicateTarget(A))));

  let err = tracker.create_record("x", "y", &[A, B]).await.unwrap_err();
  assert!(matches!(err, Error::Record(tally_core::Error::UnregisteredTarget(B))));

  assert!(tracker.list_records(&RecordFilter::default()).await.is_empty());
}

#[tokio::test]
async fn registry_rejects_two_adapters_for_one_kind() {
  let err = AdapterRegistry::new()
    .register(Arc::new(ScriptedAdapter::new(A)))
    .unwrap()
    .register(Arc::new(ScriptedAdapter::new(A)))
    .unwrap_err();
  assert!(matches!(err, tally_core::Error::DuplicateTarget(A)));
}

#[tokio::test]
async fn budgets_come_from_config() {
  let registry = AdapterRegistry::new()
    .register(Arc::new(ScriptedAdapter::new(A)))
    .unwrap()
    .register(Arc::new(ScriptedAdapter::new(B)))
    .unwrap();
  let tracker = Tracker::new(registry, TrackerConfig::default().with_max_retries(B, 1));

  let r = record(&tracker, &[A, B]).await;
  assert_eq!(r.target(A).unwrap().max_retries(), 3);
  assert_eq!(r.target(B).unwrap().max_retries(), 1);
}

#[tokio::test]
async fn unknown_record_is_not_found() {
  let tracker = tracker_with(vec![]);
  let id = Uuid::new_v4();
  for err in [
    tracker.submit_all(id).await.unwrap_err(),
    tracker.refresh(id).await.unwrap_err(),
    tracker.retry(id, A).await.unwrap_err(),
    tracker.get_record(id).await.unwrap_err(),
  ] {
    assert!(matches!(err, Error::Record(tally_core::Error::RecordNotFound(x)) if x == id));
  }
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn permanent_failure_dominates_completed_sibling() {
  let a = Arc::new(
    ScriptedAdapter::new(A).polls([Err(AdapterError::Permanent("invalid ISWC".into()))]),
  );
  let b = Arc::new(ScriptedAdapter::new(B).polls([done("BMI-1")]));
  let tracker = tracker_with(vec![a, b]);

  let r = record(&tracker, &[A, B]).await;
  assert_eq!(r.overall_status(), OverallStatus::Pending);

  let r = tracker.submit_all(r.id()).await.unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Active);

  let r = tracker.refresh(r.id()).await.unwrap();
  assert_eq!(state(&r, A), TargetState::Failed);
  assert_eq!(state(&r, B), TargetState::Completed);
  assert_eq!(r.overall_status(), OverallStatus::Failed);
  assert!(r.requires_intervention());
  assert!(r.target(A).unwrap().error_detail().unwrap().contains("invalid ISWC"));
}

#[tokio::test]
async fn three_targets_complete_after_two_refreshes() {
  let adapters: Vec<_> = [A, B, C]
    .into_iter()
    .map(|k| Arc::new(ScriptedAdapter::new(k).polls([still_pending(), done("ok")])))
    .collect();
  let tracker = tracker_with(adapters);

  let r = record(&tracker, &[A, B, C]).await;
  tracker.submit_all(r.id()).await.unwrap();

  let r = tracker.refresh(r.id()).await.unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Active);

  let r = tracker.refresh(r.id()).await.unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Completed);
  assert!(r.targets().iter().all(|t| t.external_reference() == Some("ok")));

  // Completed records stay completed.
  let r = tracker.refresh(r.id()).await.unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Completed);
}

#[tokio::test]
async fn submit_all_is_idempotent() {
  let a = Arc::new(ScriptedAdapter::new(A));
  let b = Arc::new(ScriptedAdapter::new(B));
  let tracker = tracker_with(vec![a.clone(), b.clone()]);

  let r = record(&tracker, &[A, B]).await;
  tracker.submit_all(r.id()).await.unwrap();
  tracker.submit_all(r.id()).await.unwrap();

  assert_eq!(a.submit_calls(), 1);
  assert_eq!(b.submit_calls(), 1);
}

#[tokio::test]
async fn one_failing_submit_does_not_block_siblings() {
  let a = Arc::new(ScriptedAdapter::new(A).submits([Err(AdapterError::Unavailable("down".into()))]));
  let b = Arc::new(
    ScriptedAdapter::new(B).submits([Ok(SubmitAck { external_reference: Some("PRO-5".into()) })]),
  );
  let tracker = tracker_with(vec![a, b]);

  let r = record(&tracker, &[A, B]).await;
  let r = tracker.submit_all(r.id()).await.unwrap();

  assert_eq!(state(&r, A), TargetState::Failed);
  assert_eq!(r.target(A).unwrap().failure(), Some(FailureKind::Transient));
  assert_eq!(state(&r, B), TargetState::Pending);
  assert_eq!(r.target(B).unwrap().external_reference(), Some("PRO-5"));
  assert_eq!(r.overall_status(), OverallStatus::Active);
}

#[tokio::test]
async fn pending_poll_records_late_reference() {
  let a = Arc::new(
    ScriptedAdapter::new(A).polls([Ok(PollStatus::Pending { reference: Some("MLC-3".into()) })]),
  );
  let tracker = tracker_with(vec![a]);

  let r = record(&tracker, &[A]).await;
  let r = tracker.submit_all(r.id()).await.unwrap();
  assert!(r.target(A).unwrap().external_reference().is_none());

  let r = tracker.refresh(r.id()).await.unwrap();
  assert_eq!(r.target(A).unwrap().external_reference(), Some("MLC-3"));
}

// ─── Retry ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn retry_until_budget_is_exhausted() {
  let a = Arc::new(ScriptedAdapter::new(A).submits((0..4).map(|_| Err(transient()))));
  let tracker = tracker_with(vec![a.clone()]);

  let r = record(&tracker, &[A]).await;
  let r = tracker.submit_all(r.id()).await.unwrap();
  assert_eq!(state(&r, A), TargetState::Failed);
  assert_eq!(r.overall_status(), OverallStatus::Active);

  for expected in 1..=3 {
    let r = tracker.retry(r.id(), A).await.unwrap();
    assert_eq!(r.target(A).unwrap().attempt_count(), expected);
    assert_eq!(state(&r, A), TargetState::Failed);
  }

  let r = tracker.get_record(r.id()).await.unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Failed);
  assert!(r.requires_intervention());

  let err = tracker.retry(r.id(), A).await.unwrap_err();
  assert!(matches!(err, Error::Record(tally_core::Error::NotRetryable { .. })));
  assert_eq!(a.submit_calls(), 4);
}

#[tokio::test]
async fn successful_retry_goes_back_to_pending() {
  let a = Arc::new(ScriptedAdapter::new(A).submits([Err(transient())]));
  let tracker = tracker_with(vec![a]);

  let r = record(&tracker, &[A]).await;
  tracker.submit_all(r.id()).await.unwrap();
  let r = tracker.retry(r.id(), A).await.unwrap();

  let t = r.target(A).unwrap();
  assert_eq!(t.state(), TargetState::Pending);
  assert_eq!(t.attempt_count(), 1);
  assert!(t.error_detail().is_none());
}

#[tokio::test]
async fn permanent_submit_failure_is_not_retryable() {
  let a = Arc::new(ScriptedAdapter::new(A).submits([Err(AdapterError::Permanent("bad".into()))]));
  let tracker = tracker_with(vec![a]);

  let r = record(&tracker, &[A]).await;
  let r = tracker.submit_all(r.id()).await.unwrap();
  assert_eq!(r.target(A).unwrap().attempt_count(), 0);
  assert_eq!(r.overall_status(), OverallStatus::Failed);

  let err = tracker.retry(r.id(), A).await.unwrap_err();
  assert!(matches!(err, Error::Record(tally_core::Error::NotRetryable { .. })));
}

#[tokio::test]
async fn retry_of_pending_or_missing_target_is_refused() {
  let tracker = tracker_with(vec![Arc::new(ScriptedAdapter::new(A))]);
  let r = record(&tracker, &[A]).await;
  tracker.submit_all(r.id()).await.unwrap();

  let err = tracker.retry(r.id(), A).await.unwrap_err();
  assert!(matches!(err, Error::Record(tally_core::Error::NotRetryable { .. })));

  let err = tracker.retry(r.id(), B).await.unwrap_err();
  assert!(matches!(err, Error::Record(tally_core::Error::TargetNotFound { .. })));
}

#[tokio::test]
async fn rejected_target_can_be_retried_by_hand() {
  let a = Arc::new(
    ScriptedAdapter::new(A).polls([Ok(PollStatus::Failed { detail: "title mismatch".into() })]),
  );
  let tracker = tracker_with(vec![a.clone()]);

  let r = record(&tracker, &[A]).await;
  tracker.submit_all(r.id()).await.unwrap();
  let r = tracker.refresh(r.id()).await.unwrap();
  assert_eq!(r.target(A).unwrap().failure(), Some(FailureKind::Rejected));
  assert_eq!(r.overall_status(), OverallStatus::Active);

  // The sweep leaves rejections alone.
  let report = tracker.sweep_once().await;
  assert_eq!(report.retried, 0);
  assert_eq!(a.submit_calls(), 1);

  let r = tracker.retry(r.id(), A).await.unwrap();
  assert_eq!(state(&r, A), TargetState::Pending);
  assert_eq!(a.submit_calls(), 2);
}

// ─── Timeouts and cancellation ───────────────────────────────────────────────

#[tokio::test]
async fn slow_poll_times_out_as_transient() {
  let mut slow = ScriptedAdapter::new(A).polls([done("late")]);
  slow.poll_delay = Some(Duration::from_millis(500));
  let registry = AdapterRegistry::new().register(Arc::new(slow)).unwrap();
  let tracker = Tracker::new(
    registry,
    TrackerConfig::default().with_call_timeout(Duration::from_millis(20)),
  );

  let r = record(&tracker, &[A]).await;
  tracker.submit_all(r.id()).await.unwrap();
  let r = tracker.refresh(r.id()).await.unwrap();

  let t = r.target(A).unwrap();
  assert_eq!(t.state(), TargetState::Failed);
  assert_eq!(t.failure(), Some(FailureKind::Transient));
  assert!(t.error_detail().unwrap().contains("timed out"));
}

#[tokio::test]
async fn slow_submit_times_out_as_transient() {
  let mut slow = ScriptedAdapter::new(A);
  slow.submit_delay = Some(Duration::from_millis(500));
  let slow = Arc::new(slow);
  let fast = Arc::new(ScriptedAdapter::new(B));
  let registry = AdapterRegistry::new()
    .register(slow.clone())
    .unwrap()
    .register(fast)
    .unwrap();
  let tracker = Tracker::new(
    registry,
    TrackerConfig::default().with_call_timeout(Duration::from_millis(20)),
  );

  let r = record(&tracker, &[A, B]).await;
  let r = tracker.submit_all(r.id()).await.unwrap();

  let t = r.target(A).unwrap();
  assert_eq!(t.state(), TargetState::Failed);
  assert_eq!(t.failure(), Some(FailureKind::Transient));
  assert!(t.error_detail().unwrap().contains("timed out"));
  assert!(t.is_auto_retryable());
  assert_eq!(state(&r, B), TargetState::Pending);
  assert_eq!(slow.submit_calls(), 1);
}

#[tokio::test]
async fn cancel_failures_are_swallowed() {
  let mut a = ScriptedAdapter::new(A);
  a.cancel_error = Some(transient());
  let a = Arc::new(a);
  let tracker = tracker_with(vec![a.clone()]);

  let r = record(&tracker, &[A]).await;

  // Not yet pending: nothing to cancel.
  tracker.cancel(r.id(), A).await.unwrap();
  assert_eq!(a.cancel_calls.load(Ordering::SeqCst), 0);

  tracker.submit_all(r.id()).await.unwrap();
  tracker.cancel(r.id(), A).await.unwrap();
  assert_eq!(a.cancel_calls.load(Ordering::SeqCst), 1);

  let r = tracker.get_record(r.id()).await.unwrap();
  assert_eq!(state(&r, A), TargetState::Pending);
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn racing_refreshes_do_not_double_count() {
  let a = Arc::new(ScriptedAdapter::new(A).polls([Err(transient())]));
  let tracker = tracker_with(vec![a.clone()]);

  let r = record(&tracker, &[A]).await;
  tracker.submit_all(r.id()).await.unwrap();

  let (x, y) = tokio::join!(tracker.refresh(r.id()), tracker.refresh(r.id()));
  x.unwrap();
  y.unwrap();
  // The second refresh found the target already failed and did not poll.
  assert_eq!(a.poll_calls(), 1);

  let (x, y) = tokio::join!(tracker.retry(r.id(), A), tracker.retry(r.id(), A));
  assert_eq!([x.is_ok(), y.is_ok()].iter().filter(|ok| **ok).count(), 1);

  let r = tracker.get_record(r.id()).await.unwrap();
  assert_eq!(r.target(A).unwrap().attempt_count(), 1);
  assert_eq!(a.submit_calls(), 2);
}

#[tokio::test]
async fn readers_do_not_wait_on_a_batch() {
  let gate = Arc::new(Semaphore::new(0));
  let mut a = ScriptedAdapter::new(A).polls([done("x")]);
  a.poll_gate = Some(gate.clone());
  let a = Arc::new(a);
  let tracker = Arc::new(tracker_with(vec![a.clone()]));

  let id = record(&tracker, &[A]).await.id();
  tracker.submit_all(id).await.unwrap();

  let busy = tokio::spawn({
    let tracker = tracker.clone();
    async move { tracker.refresh(id).await }
  });
  while a.poll_calls() == 0 {
    tokio::time::sleep(Duration::from_millis(5)).await;
  }

  // The refresh is parked inside the adapter, holding the record lock.
  let snapshot = tracker.get_record(id).await.unwrap();
  assert_eq!(state(&snapshot, A), TargetState::Pending);

  let report = tracker.sweep_once().await;
  assert_eq!(report.skipped_busy, 1);
  assert_eq!(report.visited, 0);

  gate.add_permits(1);
  let r = busy.await.unwrap().unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Completed);
  assert_eq!(a.poll_calls(), 1);
}

#[tokio::test]
async fn different_records_proceed_in_parallel() {
  let gate = Arc::new(Semaphore::new(0));
  let mut a = ScriptedAdapter::new(A);
  a.poll_gate = Some(gate.clone());
  let a = Arc::new(a);
  let b = Arc::new(ScriptedAdapter::new(B).polls([done("y")]));
  let tracker = Arc::new(tracker_with(vec![a.clone(), b]));

  let blocked = record(&tracker, &[A]).await.id();
  let free = record(&tracker, &[B]).await.id();
  tracker.submit_all(blocked).await.unwrap();
  tracker.submit_all(free).await.unwrap();

  let parked = tokio::spawn({
    let tracker = tracker.clone();
    async move { tracker.refresh(blocked).await }
  });
  while a.poll_calls() == 0 {
    tokio::time::sleep(Duration::from_millis(5)).await;
  }

  let r = tracker.refresh(free).await.unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Completed);

  gate.add_permits(1);
  parked.await.unwrap().unwrap();
}

// ─── Sweep ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sweep_retries_transient_failures_and_polls() {
  let a = Arc::new(ScriptedAdapter::new(A).submits([Err(transient())]).polls([done("MLC-8")]));
  let b = Arc::new(ScriptedAdapter::new(B).polls([done("PRO-8")]));
  let tracker = tracker_with(vec![a.clone(), b]);

  let r = record(&tracker, &[A, B]).await;
  tracker.submit_all(r.id()).await.unwrap();

  let report = tracker.sweep_once().await;
  assert_eq!(report, crate::SweepReport { visited: 1, skipped_busy: 0, retried: 1 });

  let r = tracker.get_record(r.id()).await.unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Completed);
  assert_eq!(r.target(A).unwrap().attempt_count(), 1);
  assert_eq!(a.submit_calls(), 2);

  // Settled records are not visited again.
  let report = tracker.sweep_once().await;
  assert_eq!(report.visited, 0);
}

#[tokio::test]
async fn spawned_sweep_stops_on_shutdown() {
  let tracker = Arc::new(tracker_with(vec![Arc::new(
    ScriptedAdapter::new(A).polls([done("r")]),
  )]));
  let r = record(&tracker, &[A]).await;
  tracker.submit_all(r.id()).await.unwrap();

  let shutdown = tokio_util::sync::CancellationToken::new();
  let task = tracker
    .clone()
    .spawn_sweep(Duration::from_millis(10), shutdown.clone());

  let mut status = OverallStatus::Active;
  for _ in 0..100 {
    status = tracker.get_record(r.id()).await.unwrap().overall_status();
    if status == OverallStatus::Completed {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  assert_eq!(status, OverallStatus::Completed);

  shutdown.cancel();
  task.await.unwrap();
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_is_a_filtered_snapshot() {
  let a = Arc::new(ScriptedAdapter::new(A));
  let tracker = tracker_with(vec![a]);

  let first = record(&tracker, &[A]).await;
  let second = tracker.create_record("Red Line", "Grace", &[A]).await.unwrap();
  tracker.submit_all(first.id()).await.unwrap();

  let all = tracker.list_records(&RecordFilter::default()).await;
  assert_eq!(all.len(), 2);
  // Most recently updated first.
  assert_eq!(all[0].id(), first.id());

  let pending = tracker
    .list_records(&RecordFilter { status: Some(OverallStatus::Pending), ..Default::default() })
    .await;
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].id(), second.id());

  let report = tracker.report().await;
  assert_eq!(report.counts.total, 2);
  assert_eq!(report.counts.active, 1);
}

// ─── Manual attestation ──────────────────────────────────────────────────────

#[tokio::test]
async fn manual_targets_follow_attestations() {
  let desk = AttestationDesk::new();
  let registry = AdapterRegistry::new()
    .register(Arc::new(ManualAdapter::new(A, desk.clone())))
    .unwrap()
    .register(Arc::new(ManualAdapter::new(B, desk.clone())))
    .unwrap();
  let tracker = Tracker::new(registry, TrackerConfig::default());

  let r = record(&tracker, &[A, B]).await;
  tracker.submit_all(r.id()).await.unwrap();

  desk
    .attest(r.id(), A, Attestation::Completed { reference: "bulk-2024-07".into() })
    .await;
  let r = tracker.refresh(r.id()).await.unwrap();
  assert_eq!(state(&r, A), TargetState::Completed);
  assert_eq!(r.overall_status(), OverallStatus::Active);

  desk
    .attest(r.id(), B, Attestation::Completed { reference: "bulk-2024-08".into() })
    .await;
  let r = tracker.refresh(r.id()).await.unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Completed);
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("store offline")]
struct Offline;

/// Counts writes; refuses them while `offline` is set.
#[derive(Clone, Default)]
struct MemoryStore {
  records: Arc<Mutex<HashMap<Uuid, SubmissionRecord>>>,
  puts:    Arc<AtomicUsize>,
  offline: Arc<AtomicBool>,
}

impl MemoryStore {
  fn puts(&self) -> usize { self.puts.load(Ordering::SeqCst) }

  fn set_offline(&self, offline: bool) { self.offline.store(offline, Ordering::SeqCst); }

  async fn stored(&self, id: Uuid) -> SubmissionRecord {
    self.records.lock().await.get(&id).cloned().unwrap()
  }
}

impl RecordStore for MemoryStore {
  type Error = Offline;

  async fn put_record(&self, record: &SubmissionRecord) -> Result<(), Offline> {
    if self.offline.load(Ordering::SeqCst) {
      return Err(Offline);
    }
    self.puts.fetch_add(1, Ordering::SeqCst);
    self.records.lock().await.insert(record.id(), record.clone());
    Ok(())
  }

  async fn get_record(&self, id: Uuid) -> Result<Option<SubmissionRecord>, Offline> {
    Ok(self.records.lock().await.get(&id).cloned())
  }

  async fn list_records(&self) -> Result<Vec<SubmissionRecord>, Offline> {
    Ok(self.records.lock().await.values().cloned().collect())
  }
}

#[tokio::test]
async fn settled_batches_are_persisted_and_restorable() {
  let store = MemoryStore::default();
  let registry = || {
    AdapterRegistry::new()
      .register(Arc::new(ScriptedAdapter::new(A).polls([done("MLC-1")])))
      .unwrap()
  };

  let tracker = Tracker::with_store(registry(), TrackerConfig::default(), store.clone());
  let r = tracker.create_record("Blue Hour", "Ada", &[A]).await.unwrap();
  tracker.submit_all(r.id()).await.unwrap();
  assert_eq!(store.puts(), 2);

  let stored = store.get_record(r.id()).await.unwrap().unwrap();
  assert_eq!(state(&stored, A), TargetState::Pending);

  // A fresh tracker picks up where the first left off.
  let restored = Tracker::restore(registry(), TrackerConfig::default(), store.clone())
    .await
    .unwrap();
  let r = restored.refresh(r.id()).await.unwrap();
  assert_eq!(r.overall_status(), OverallStatus::Completed);
  assert_eq!(r.target(A).unwrap().external_reference(), Some("MLC-1"));
}

#[tokio::test]
async fn restore_requires_adapters_for_stored_kinds() {
  let store = MemoryStore::default();
  let registry = AdapterRegistry::new()
    .register(Arc::new(ScriptedAdapter::new(A)))
    .unwrap()
    .register(Arc::new(ScriptedAdapter::new(B)))
    .unwrap();
  let tracker = Tracker::with_store(registry, TrackerConfig::default(), store.clone());
  tracker.create_record("x", "y", &[A, B]).await.unwrap();

  let only_a = AdapterRegistry::new()
    .register(Arc::new(ScriptedAdapter::new(A)))
    .unwrap();
  let err = Tracker::restore(only_a, TrackerConfig::default(), store)
    .await
    .err()
    .unwrap();
  assert!(matches!(err, Error::Record(tally_core::Error::UnregisteredTarget(B))));
}

#[tokio::test]
async fn failed_write_is_not_published_and_is_retried() {
  let store = MemoryStore::default();
  let a = Arc::new(ScriptedAdapter::new(A));
  let registry = AdapterRegistry::new().register(a.clone()).unwrap();
  let tracker = Tracker::with_store(registry, TrackerConfig::default(), store.clone());

  let id = tracker.create_record("Blue Hour", "Ada", &[A]).await.unwrap().id();

  store.set_offline(true);
  let err = tracker.submit_all(id).await.unwrap_err();
  assert!(matches!(err, Error::Store(_)));
  assert_eq!(a.submit_calls(), 1);

  // Readers still see what the store holds.
  let published = tracker.get_record(id).await.unwrap();
  assert_eq!(state(&published, A), TargetState::NotStarted);
  assert_eq!(state(&store.stored(id).await, A), TargetState::NotStarted);

  // Once the store is back, the next call writes the pending change without
  // submitting again.
  store.set_offline(false);
  let r = tracker.submit_all(id).await.unwrap();
  assert_eq!(state(&r, A), TargetState::Pending);
  assert_eq!(a.submit_calls(), 1);
  assert_eq!(state(&store.stored(id).await, A), TargetState::Pending);
  assert_eq!(state(&tracker.get_record(id).await.unwrap(), A), TargetState::Pending);
}

#[tokio::test]
async fn sweep_flushes_a_failed_write() {
  let store = MemoryStore::default();
  let a = Arc::new(ScriptedAdapter::new(A).polls([done("MLC-4")]));
  let registry = AdapterRegistry::new().register(a).unwrap();
  let tracker = Tracker::with_store(registry, TrackerConfig::default(), store.clone());

  let id = tracker.create_record("Blue Hour", "Ada", &[A]).await.unwrap().id();
  tracker.submit_all(id).await.unwrap();

  store.set_offline(true);
  assert!(tracker.refresh(id).await.is_err());
  assert_eq!(state(&store.stored(id).await, A), TargetState::Pending);

  store.set_offline(false);
  tracker.sweep_once().await;
  let stored = store.stored(id).await;
  assert_eq!(stored.overall_status(), OverallStatus::Completed);
  assert_eq!(tracker.get_record(id).await.unwrap(), stored);
}

#[tokio::test]
async fn unchanged_records_are_not_rewritten() {
  let store = MemoryStore::default();
  let registry = AdapterRegistry::new()
    .register(Arc::new(ScriptedAdapter::new(A)))
    .unwrap()
    .register(Arc::new(
      ScriptedAdapter::new(B).polls([Ok(PollStatus::Failed { detail: "bad title".into() })]),
    ))
    .unwrap();
  let tracker = Tracker::with_store(registry, TrackerConfig::default(), store.clone());

  let fresh = tracker.create_record("one", "Ada", &[A]).await.unwrap().id();
  let pending = tracker.create_record("two", "Ada", &[A]).await.unwrap().id();
  let rejected = tracker.create_record("three", "Ada", &[B]).await.unwrap().id();
  tracker.submit_all(pending).await.unwrap();
  tracker.submit_all(rejected).await.unwrap();
  tracker.refresh(rejected).await.unwrap();
  let writes = store.puts();

  // Not started, still pending with nothing new, and rejected with budget:
  // the sweep visits all three and writes none.
  let report = tracker.sweep_once().await;
  assert_eq!(report.visited, 3);
  assert_eq!(store.puts(), writes);

  tracker.refresh(pending).await.unwrap();
  tracker.submit_all(rejected).await.unwrap();
  assert_eq!(store.puts(), writes);
  assert_eq!(
    state(&tracker.get_record(fresh).await.unwrap(), A),
    TargetState::NotStarted
  );
}
