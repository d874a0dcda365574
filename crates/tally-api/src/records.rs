//! Handlers for `/records` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/records` | Filters: `status`, `target`, `target_state`, `text`, `stale_secs`, `sort`, `limit`, `offset` |
//! | `POST` | `/records` | Body: `{"item_label":..,"owner_label":..,"targets":[..]}` |
//! | `GET`  | `/records/{id}` | 404 if not found |
//! | `POST` | `/records/{id}/submit` | Submits every not-started target |
//! | `POST` | `/records/{id}/refresh` | Polls every pending target |
//! | `POST` | `/records/{id}/targets/{kind}/retry` | 409 if not retryable |
//! | `POST` | `/records/{id}/targets/{kind}/cancel` | Best effort, 204 |
//! | `POST` | `/records/{id}/targets/{kind}/attest` | Body: `{"outcome":"completed","reference":..}`, 204; 400 unless the kind is manual |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tally_core::{
  record::{OverallStatus, SubmissionRecord},
  store::RecordStore,
  submission::TargetState,
  target::TargetKind,
};
use tally_tracker::{
  manual::Attestation,
  query::{RecordFilter, SortOrder},
  report::format_elapsed,
};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// A record as returned by the list endpoint, with a human-readable age.
#[derive(Debug, Serialize)]
pub struct RecordView {
  #[serde(flatten)]
  pub record:  SubmissionRecord,
  /// E.g. `"5m ago"`.
  pub updated: String,
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub status:       Option<OverallStatus>,
  pub target:       Option<TargetKind>,
  pub target_state: Option<TargetState>,
  pub text:         Option<String>,
  /// Only records not updated for at least this many seconds.
  pub stale_secs:   Option<i64>,
  #[serde(default)]
  pub sort:         SortOrder,
  pub limit:        Option<usize>,
  pub offset:       Option<usize>,
}

impl From<ListParams> for RecordFilter {
  fn from(p: ListParams) -> Self {
    Self {
      status:       p.status,
      target:       p.target,
      target_state: p.target_state,
      text:         p.text.filter(|t| !t.is_empty()),
      stale_for:    p.stale_secs.map(chrono::Duration::seconds),
      sort:         p.sort,
      limit:        p.limit,
      offset:       p.offset,
    }
  }
}

/// `GET /records[?status=..&target=..&text=..]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Json<Vec<RecordView>>
where
  S: RecordStore,
{
  let records = state.tracker.list_records(&params.into()).await;
  let now = Utc::now();
  Json(
    records
      .into_iter()
      .map(|record| RecordView {
        updated: format_elapsed(record.last_updated_at(), now),
        record,
      })
      .collect(),
  )
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub item_label:  String,
  pub owner_label: String,
  pub targets:     Vec<TargetKind>,
}

/// `POST /records`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: RecordStore,
{
  let record = state
    .tracker
    .create_record(body.item_label, body.owner_label, &body.targets)
    .await?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── Single record ────────────────────────────────────────────────────────────

/// `GET /records/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SubmissionRecord>, ApiError>
where
  S: RecordStore,
{
  Ok(Json(state.tracker.get_record(id).await?))
}

/// `POST /records/{id}/submit`
pub async fn submit<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SubmissionRecord>, ApiError>
where
  S: RecordStore,
{
  Ok(Json(state.tracker.submit_all(id).await?))
}

/// `POST /records/{id}/refresh`
pub async fn refresh<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SubmissionRecord>, ApiError>
where
  S: RecordStore,
{
  Ok(Json(state.tracker.refresh(id).await?))
}

// ─── Single target ────────────────────────────────────────────────────────────

/// `POST /records/{id}/targets/{kind}/retry`
pub async fn retry<S>(
  State(state): State<AppState<S>>,
  Path((id, kind)): Path<(Uuid, TargetKind)>,
) -> Result<Json<SubmissionRecord>, ApiError>
where
  S: RecordStore,
{
  Ok(Json(state.tracker.retry(id, kind).await?))
}

/// `POST /records/{id}/targets/{kind}/cancel`
pub async fn cancel<S>(
  State(state): State<AppState<S>>,
  Path((id, kind)): Path<(Uuid, TargetKind)>,
) -> Result<StatusCode, ApiError>
where
  S: RecordStore,
{
  state.tracker.cancel(id, kind).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /records/{id}/targets/{kind}/attest`
///
/// Records a human-asserted outcome. It takes effect on the next refresh.
pub async fn attest<S>(
  State(state): State<AppState<S>>,
  Path((id, kind)): Path<(Uuid, TargetKind)>,
  Json(attestation): Json<Attestation>,
) -> Result<StatusCode, ApiError>
where
  S: RecordStore,
{
  let record = state.tracker.get_record(id).await?;
  if record.target(kind).is_none() {
    return Err(ApiError::NotFound(format!("record {id} has no {kind} target")));
  }
  if !state.manual.contains(&kind) {
    return Err(ApiError::BadRequest(format!("{kind} is not tracked by attestation")));
  }
  state.desk.attest(id, kind, attestation).await;
  Ok(StatusCode::NO_CONTENT)
}
