//! Handlers for team CRUD and per-team statistics.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/api/teams` | Teams with live present/total counts |
//! | `POST` | `/api/teams` | Body: [`TeamBody`]; 201 |
//! | `PUT` | `/api/teams/{id}` | Body: [`TeamBody`]; rename |
//! | `DELETE` | `/api/teams/{id}` | 409 while members are assigned |
//! | `GET` | `/api/teams/{id}/stats` | `?window_days`, default 30 |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tapin_core::{
  rollup::TeamStats,
  roster::{Team, TeamPresence},
  store::AttendanceStore,
};
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::ApiError};

/// JSON body accepted by `POST /api/teams` and `PUT /api/teams/{id}`.
#[derive(Debug, Deserialize)]
pub struct TeamBody {
  pub name: String,
}

fn validated_name(raw: &str) -> Result<String, ApiError> {
  let name = raw.trim();
  if name.is_empty() {
    return Err(ApiError::BadRequest("team name must not be empty".into()));
  }
  Ok(name.to_string())
}

/// `GET /api/teams`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
) -> Result<Json<Vec<TeamPresence>>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let teams = state.store.teams().await.map_err(Into::into)?;
  Ok(Json(teams))
}

/// `POST /api/teams` — returns 201 + the new team.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Json(body): Json<TeamBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let name = validated_name(&body.name)?;
  let team = state.store.add_team(name).await.map_err(Into::into)?;
  Ok((StatusCode::CREATED, Json(team)))
}

/// `PUT /api/teams/{id}` — rename.
pub async fn rename<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(id): Path<Uuid>,
  Json(body): Json<TeamBody>,
) -> Result<Json<Team>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let name = validated_name(&body.name)?;
  let team = state.store.rename_team(id, name).await.map_err(Into::into)?;
  Ok(Json(team))
}

/// `DELETE /api/teams/{id}` — returns 204; 409 while members are assigned.
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  state.store.delete_team(id).await.map_err(Into::into)?;
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
  /// Trailing window length in days.
  #[serde(default = "default_window_days")]
  pub window_days: u32,
}

fn default_window_days() -> u32 { 30 }

/// `GET /api/teams/{id}/stats?window_days=30`
pub async fn stats<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(id): Path<Uuid>,
  Query(params): Query<StatsParams>,
) -> Result<Json<TeamStats>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let stats = state
    .store
    .team_stats(id, params.window_days)
    .await
    .map_err(Into::into)?;
  Ok(Json(stats))
}
