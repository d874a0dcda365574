//! JSON REST API for tally.
//!
//! Exposes an axum [`Router`] over a [`Tracker`] backed by any
//! [`RecordStore`]. Auth, TLS and transport concerns are the caller's
//! responsibility.

pub mod config;
pub mod error;
pub mod records;
pub mod report;

use std::{collections::BTreeSet, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use tally_core::{store::RecordStore, target::TargetKind};
use tally_tracker::{Tracker, manual::AttestationDesk};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S: RecordStore> {
  pub tracker: Arc<Tracker<S>>,
  /// Where attestations for manually-tracked targets are recorded.
  pub desk:    Arc<AttestationDesk>,
  /// Kinds whose adapter reads from `desk`. Attestations for any other kind
  /// would never be seen, so they are refused.
  pub manual:  Arc<BTreeSet<TargetKind>>,
}

impl<S: RecordStore> AppState<S> {
  pub fn new(
    tracker: Tracker<S>,
    desk: Arc<AttestationDesk>,
    manual: impl IntoIterator<Item = TargetKind>,
  ) -> Self {
    Self {
      tracker: Arc::new(tracker),
      desk,
      manual: Arc::new(manual.into_iter().collect()),
    }
  }
}

impl<S: RecordStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      tracker: self.tracker.clone(),
      desk:    self.desk.clone(),
      manual:  self.manual.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: RecordStore + 'static,
{
  Router::new()
    .route("/records", get(records::list::<S>).post(records::create::<S>))
    .route("/records/{id}", get(records::get_one::<S>))
    .route("/records/{id}/submit", post(records::submit::<S>))
    .route("/records/{id}/refresh", post(records::refresh::<S>))
    .route("/records/{id}/targets/{kind}/retry", post(records::retry::<S>))
    .route("/records/{id}/targets/{kind}/cancel", post(records::cancel::<S>))
    .route("/records/{id}/targets/{kind}/attest", post(records::attest::<S>))
    .route("/report", get(report::handler::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
