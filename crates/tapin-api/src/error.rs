//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("gone: {0}")]
  Gone(String),

  #[error("store unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<tapin_core::Error> for ApiError {
  fn from(e: tapin_core::Error) -> Self {
    use tapin_core::Error as E;
    match e {
      E::InvalidCardId(_)
      | E::InvalidTtl(_)
      | E::InvalidDateRange { .. }
      | E::InvalidUtcOffset(_) => ApiError::BadRequest(e.to_string()),
      E::UnknownCard(_)
      | E::UnknownMember(_)
      | E::MemberNotBound(_)
      | E::TokenInvalid
      | E::TeamNotFound(_) => ApiError::NotFound(e.to_string()),
      E::CardAlreadyBound(_)
      | E::TokenUsed
      | E::TeamNameTaken(_)
      | E::TeamNotEmpty { .. } => ApiError::Conflict(e.to_string()),
      E::TokenExpired => ApiError::Gone(e.to_string()),
    }
  }
}

impl From<tapin_store_sqlite::Error> for ApiError {
  fn from(e: tapin_store_sqlite::Error) -> Self {
    use tapin_store_sqlite::Error as E;
    match e {
      E::Domain(domain) => domain.into(),
      E::SweepFailed(_) | E::Database(_) => ApiError::Unavailable(e.to_string()),
      other => ApiError::Store(Box::new(other)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Gone(m) => (StatusCode::GONE, m.clone()),
      ApiError::Unavailable(m) => {
        tracing::error!(error = %m, "store unavailable");
        (StatusCode::SERVICE_UNAVAILABLE, m.clone())
      }
      ApiError::Store(e) => {
        tracing::error!(error = %e, "handler failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    let mut res = (status, Json(json!({ "error": message }))).into_response();
    if status == StatusCode::UNAUTHORIZED {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"tapin\""),
      );
    }
    res
  }
}
