//! Handlers for the member roster and per-member history.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/api/members` | Roster with binding, team and latest punch |
//! | `GET` | `/api/members/{id}/sessions` | `?from&to` required; `&live=true` counts the open tail |
//! | `GET` | `/api/members/{id}/calendar` | `?year&month` presence calendar |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tapin_core::{
  roster::MemberPresence,
  session::Session,
  store::{AttendanceStore, DateRange},
};
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::ApiError};

// ─── Roster ───────────────────────────────────────────────────────────────────

/// `GET /api/members`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
) -> Result<Json<Vec<MemberPresence>>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let members = state.store.members().await.map_err(Into::into)?;
  Ok(Json(members))
}

// ─── Sessions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SessionsParams {
  pub from: NaiveDate,
  pub to:   NaiveDate,
  /// Count an open session up to "now" in `total_seconds`.
  #[serde(default)]
  pub live: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
  pub user_id:       Uuid,
  pub from:          NaiveDate,
  pub to:            NaiveDate,
  pub sessions:      Vec<Session>,
  /// Closed durations only, unless `live=true` adds the open tail.
  pub total_seconds: i64,
}

/// `GET /api/members/{id}/sessions?from=2024-06-01&to=2024-06-30[&live=true]`
pub async fn sessions<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(id): Path<Uuid>,
  Query(params): Query<SessionsParams>,
) -> Result<Json<SessionsResponse>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let range = DateRange::new(params.from, params.to)?;
  let sessions =
    state.store.sessions_for(id, range).await.map_err(Into::into)?;

  let total_seconds = if params.live {
    let now = Utc::now();
    sessions.iter().map(|s| s.duration_as_of(now)).sum()
  } else {
    sessions.iter().filter_map(|s| s.duration_seconds).sum()
  };

  Ok(Json(SessionsResponse {
    user_id: id,
    from: range.start(),
    to: range.end(),
    sessions,
    total_seconds,
  }))
}

// ─── Calendar ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CalendarParams {
  pub year:  i32,
  pub month: u32,
}

#[derive(Debug, Serialize)]
pub struct CalendarResponse {
  pub user_id: Uuid,
  pub year:    i32,
  pub month:   u32,
  /// Local dates with at least one IN punch.
  pub dates:   Vec<NaiveDate>,
}

/// `GET /api/members/{id}/calendar?year=2024&month=6`
pub async fn calendar<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(id): Path<Uuid>,
  Query(params): Query<CalendarParams>,
) -> Result<Json<CalendarResponse>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let range = DateRange::month(params.year, params.month).ok_or_else(|| {
    ApiError::BadRequest(format!(
      "invalid month: {}-{}",
      params.year, params.month
    ))
  })?;
  let dates =
    state.store.presence_dates(id, range).await.map_err(Into::into)?;
  Ok(Json(CalendarResponse {
    user_id: id,
    year: params.year,
    month: params.month,
    dates,
  }))
}
