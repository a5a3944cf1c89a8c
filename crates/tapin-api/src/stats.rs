//! Handlers for club-wide statistics.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/api/stats/overview` | `?window_days`, default 30 |
//! | `GET` | `/api/stats/rollup` | `?from&to` required; optional `&grouping` |

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::NaiveDate;
use serde::Deserialize;
use tapin_core::{
  rollup::{DailyRollup, Grouping, OverallStats},
  store::{AttendanceStore, DateRange},
};

use crate::{AppState, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct OverviewParams {
  /// Trailing window length in days.
  #[serde(default = "default_window_days")]
  pub window_days: u32,
}

fn default_window_days() -> u32 { 30 }

/// `GET /api/stats/overview?window_days=30`
pub async fn overview<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Query(params): Query<OverviewParams>,
) -> Result<Json<OverallStats>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let stats = state
    .store
    .overall_stats(params.window_days)
    .await
    .map_err(Into::into)?;
  Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct RollupParams {
  pub from:     NaiveDate,
  pub to:       NaiveDate,
  /// `none`, `team` or `team_and_grade`; defaults to `none`.
  #[serde(default)]
  pub grouping: Grouping,
}

/// `GET /api/stats/rollup?from=2024-06-01&to=2024-06-30&grouping=team`
pub async fn rollup<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Query(params): Query<RollupParams>,
) -> Result<Json<Vec<DailyRollup>>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let range = DateRange::new(params.from, params.to)?;
  let days = state
    .store
    .rollup(range, params.grouping)
    .await
    .map_err(Into::into)?;
  Ok(Json(days))
}
