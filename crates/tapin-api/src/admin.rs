//! Handlers for staff-only directory and override operations.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/admin/members` | Body: [`UpsertMemberBody`]; directory sync |
//! | `POST` | `/api/admin/members/{id}/team` | Body: [`AssignTeamBody`] |
//! | `POST` | `/api/admin/members/{id}/toggle` | Forgotten-tap fix |
//! | `PUT`  | `/api/admin/members/{id}/card` | Body: [`RebindBody`] |
//! | `POST` | `/api/admin/force-logout` | Refused outside the configured window |
//! | `GET`  | `/api/admin/logout-log` | `?limit`, default 50 |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tapin_core::{
  event::{AttendanceEvent, CardId},
  roster::{CardBinding, MemberStatus},
  store::{AttendanceStore, LogoutLogEntry, LogoutSweep, NewMember},
};
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::ApiError};

// ─── Directory sync ───────────────────────────────────────────────────────────

/// JSON body accepted by `POST /api/admin/members`.
#[derive(Debug, Deserialize)]
pub struct UpsertMemberBody {
  pub user_id:      Uuid,
  pub display_name: Option<String>,
  pub generation:   i32,
  pub status:       MemberStatus,
}

/// `POST /api/admin/members` — returns 201 + the stored member.
pub async fn upsert_member<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Json(body): Json<UpsertMemberBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let member = state
    .store
    .upsert_member(NewMember {
      user_id:      body.user_id,
      display_name: body.display_name,
      generation:   body.generation,
      status:       body.status,
    })
    .await
    .map_err(Into::into)?;
  Ok((StatusCode::CREATED, Json(member)))
}

/// JSON body accepted by `POST /api/admin/members/{id}/team`.
#[derive(Debug, Deserialize)]
pub struct AssignTeamBody {
  /// `null` clears the assignment.
  pub team_id: Option<Uuid>,
}

/// `POST /api/admin/members/{id}/team` — returns 204.
pub async fn assign_team<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(id): Path<Uuid>,
  Json(body): Json<AssignTeamBody>,
) -> Result<StatusCode, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  state
    .store
    .assign_team(id, body.team_id)
    .await
    .map_err(Into::into)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Overrides ────────────────────────────────────────────────────────────────

/// `POST /api/admin/members/{id}/toggle` — toggle by member id, fixing a
/// forgotten tap.
pub async fn toggle<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(id): Path<Uuid>,
) -> Result<Json<AttendanceEvent>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let event = state.store.force_toggle(id).await.map_err(Into::into)?;
  tracing::info!(user_id = %id, kind = event.kind.as_str(), "forced toggle");
  Ok(Json(event))
}

/// JSON body accepted by `PUT /api/admin/members/{id}/card`.
#[derive(Debug, Deserialize)]
pub struct RebindBody {
  pub card_id: String,
}

/// `PUT /api/admin/members/{id}/card` — privileged re-bind.
pub async fn rebind<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(id): Path<Uuid>,
  Json(body): Json<RebindBody>,
) -> Result<Json<CardBinding>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let card = CardId::normalize(&body.card_id)?;
  let binding = state.store.rebind_card(id, card).await.map_err(Into::into)?;
  Ok(Json(binding))
}

// ─── Bulk logout ──────────────────────────────────────────────────────────────

/// `POST /api/admin/force-logout` — the night scheduler's entry point.
///
/// The route enforces the configured local-time window; the sweep itself
/// never looks at the clock.
pub async fn force_logout<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
) -> Result<Json<LogoutSweep>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let local = state.tz.local_time(Utc::now());
  if !state.window.contains(local) {
    return Err(ApiError::Forbidden(format!(
      "outside the logout window ({})",
      state.window
    )));
  }

  let sweep = state.store.force_logout_all().await.map_err(Into::into)?;
  tracing::info!(
    affected = sweep.affected,
    entry_id = %sweep.entry.entry_id,
    "bulk logout swept"
  );
  Ok(Json(sweep))
}

#[derive(Debug, Deserialize)]
pub struct LogParams {
  #[serde(default = "default_log_limit")]
  pub limit: u32,
}

fn default_log_limit() -> u32 { 50 }

/// `GET /api/admin/logout-log?limit=50` — audit entries, newest first.
pub async fn logout_log<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Query(params): Query<LogParams>,
) -> Result<Json<Vec<LogoutLogEntry>>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let entries =
    state.store.logout_log(params.limit).await.map_err(Into::into)?;
  Ok(Json(entries))
}
