//! Handlers for card-registration tokens.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/register/tokens` | Body: [`IssueBody`]; 201 + minted token |
//! | `GET`  | `/api/register/tokens/{token}` | Open: the token is the credential |
//! | `POST` | `/api/register/tokens/{token}/complete` | Open; body: [`CompleteBody`] |
//! | `GET`  | `/api/admin/tokens` | Every token, newest first |
//! | `DELETE` | `/api/admin/tokens/{token}` | Drop a pending registration |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tapin_core::{
  event::CardId,
  roster::CardBinding,
  store::AttendanceStore,
  token::{self, RegistrationToken, TokenState},
};
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::ApiError};

// ─── Issue ────────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /api/register/tokens`.
#[derive(Debug, Deserialize)]
pub struct IssueBody {
  pub card_id:     String,
  /// Minutes; defaults to [`token::DEFAULT_TTL_MINUTES`].
  pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct IssuedToken {
  pub token:            RegistrationToken,
  /// Absolute URL the kiosk renders as a QR code.
  pub registration_url: String,
}

/// `POST /api/register/tokens` — returns 201 + the minted token.
pub async fn issue<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Json(body): Json<IssueBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let card = CardId::normalize(&body.card_id)?;
  let ttl = token::validate_ttl(
    body.ttl_minutes.unwrap_or(token::DEFAULT_TTL_MINUTES),
  )?;
  let minted = state.store.issue_token(card, ttl).await.map_err(Into::into)?;
  let registration_url = format!(
    "{}/register/{}",
    state.config.base_url.trim_end_matches('/'),
    minted.token
  );
  Ok((
    StatusCode::CREATED,
    Json(IssuedToken { token: minted, registration_url }),
  ))
}

// ─── Peek ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct TokenStatus {
  pub token: RegistrationToken,
  /// Lifecycle state as of the request.
  pub state: TokenState,
}

/// `GET /api/register/tokens/{token}` — the registration page poll.
///
/// Unauthenticated: possession of the token string is the credential. The
/// first successful read stamps `accessed_at`.
pub async fn peek<S>(
  State(state): State<AppState<S>>,
  Path(token): Path<String>,
) -> Result<Json<TokenStatus>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let found = state
    .store
    .peek_token(token)
    .await
    .map_err(Into::into)?
    .ok_or_else(|| ApiError::NotFound("registration token not found".into()))?;
  let state_now = found.state(Utc::now());
  Ok(Json(TokenStatus { token: found, state: state_now }))
}

// ─── Complete ─────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /api/register/tokens/{token}/complete`.
#[derive(Debug, Deserialize)]
pub struct CompleteBody {
  pub user_id: Uuid,
}

/// `POST /api/register/tokens/{token}/complete` — consume the token and bind
/// its card to the presenting member.
pub async fn complete<S>(
  State(state): State<AppState<S>>,
  Path(token): Path<String>,
  Json(body): Json<CompleteBody>,
) -> Result<Json<CardBinding>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let binding = state
    .store
    .consume_token(token, body.user_id)
    .await
    .map_err(Into::into)?;
  tracing::info!(
    user_id = %binding.user_id,
    card = binding.card_id.as_str(),
    "card registered"
  );
  Ok(Json(binding))
}

// ─── Admin: list and delete ───────────────────────────────────────────────────

/// `GET /api/admin/tokens`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
) -> Result<Json<Vec<RegistrationToken>>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let tokens = state.store.list_tokens().await.map_err(Into::into)?;
  Ok(Json(tokens))
}

/// `DELETE /api/admin/tokens/{token}` — returns 204.
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Path(token): Path<String>,
) -> Result<StatusCode, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  state.store.delete_token(token).await.map_err(Into::into)?;
  Ok(StatusCode::NO_CONTENT)
}
