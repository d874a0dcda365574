//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The request is well-formed but the record's current state refuses it.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<tally_tracker::Error> for ApiError {
  fn from(e: tally_tracker::Error) -> Self {
    use tally_core::Error as E;

    match e {
      tally_tracker::Error::Record(e) => match e {
        E::RecordNotFound(_) | E::TargetNotFound { .. } => Self::NotFound(e.to_string()),
        E::EmptyTargetSet | E::DuplicateTarget(_) | E::UnregisteredTarget(_) => {
          Self::BadRequest(e.to_string())
        }
        E::NotRetryable { .. } => Self::Conflict(e.to_string()),
        E::InvalidTransition { .. } | E::InvalidSnapshot(_) => Self::Internal(Box::new(e)),
      },
      e @ tally_tracker::Error::Store(_) => Self::Internal(Box::new(e)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
