//! Background sweep: push-free polling of every unsettled record.
//!
//! A sweep visits records concurrently. A record whose lock is held (a caller
//! is mid-batch on it) is skipped for this cycle rather than waited on.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use serde::Serialize;
use tally_core::{store::RecordStore, target::TargetKind};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{Result, Tracker, tracker::Slot};

/// What one sweep cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
  /// Records that were locked and refreshed.
  pub visited:      usize,
  /// Records skipped because another batch held their lock.
  pub skipped_busy: usize,
  /// Targets automatically retried after a transient failure.
  pub retried:      usize,
}

enum Visit {
  Settled,
  Busy,
  Done { retried: usize },
  Failed,
}

impl<S: RecordStore> Tracker<S> {
  /// Run one sweep over every record that is not yet settled.
  ///
  /// For each record it can lock without waiting, the sweep retries targets
  /// whose last failure was transient and still have budget, then polls every
  /// pending target. A record is only written back if one of its targets
  /// changed, or if its last write failed.
  pub async fn sweep_once(&self) -> SweepReport {
    let slots = self.slots().await;
    let visits = join_all(slots.iter().map(|slot| self.visit(slot))).await;

    let mut report = SweepReport::default();
    for visit in visits {
      match visit {
        Visit::Busy => report.skipped_busy += 1,
        Visit::Done { retried } => {
          report.visited += 1;
          report.retried += retried;
        }
        Visit::Settled | Visit::Failed => {}
      }
    }
    report
  }

  async fn visit(&self, slot: &Slot) -> Visit {
    if slot.snapshot().is_settled() && !slot.is_dirty() {
      return Visit::Settled;
    }
    let Ok(mut record) = slot.work.try_lock() else {
      return Visit::Busy;
    };

    let result: Result<usize> = async {
      let retryable: Vec<TargetKind> = record
        .targets()
        .iter()
        .filter(|t| t.is_auto_retryable())
        .map(|t| t.target())
        .collect();
      if !retryable.is_empty() {
        tracing::debug!(record_id = %record.id(), count = retryable.len(), "auto-retrying");
        self.rearm(&mut record, &retryable).await?;
      }
      let polled = self.poll_pending(&mut record).await?;
      if polled || !retryable.is_empty() {
        self.settle(slot, &record).await?;
      } else {
        self.flush(slot, &record).await?;
      }
      Ok(retryable.len())
    }
    .await;

    match result {
      Ok(retried) => Visit::Done { retried },
      Err(e) => {
        tracing::error!(record_id = %record.id(), error = %e, "sweep failed for record");
        Visit::Failed
      }
    }
  }

  /// Run [`Self::sweep_once`] every `every` until `shutdown` is cancelled.
  ///
  /// Ticks missed while a sweep is still running are skipped, not queued.
  pub fn spawn_sweep(
    self: Arc<Self>,
    every: Duration,
    shutdown: CancellationToken,
  ) -> JoinHandle<()>
  where
    S: 'static,
  {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
      tracing::info!(interval = ?every, "sweep started");

      loop {
        tokio::select! {
          _ = shutdown.cancelled() => break,
          _ = ticker.tick() => {
            let report = self.sweep_once().await;
            tracing::debug!(
              visited = report.visited,
              skipped_busy = report.skipped_busy,
              retried = report.retried,
              "sweep finished"
            );
          }
        }
      }

      tracing::info!("sweep stopped");
    })
  }
}
