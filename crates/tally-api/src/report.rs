//! Handler for `GET /report`.

use axum::{Json, extract::State};
use tally_core::store::RecordStore;
use tally_tracker::report::Report;

use crate::AppState;

/// `GET /report`
pub async fn handler<S>(State(state): State<AppState<S>>) -> Json<Report>
where
  S: RecordStore,
{
  Json(state.tracker.report().await)
}
