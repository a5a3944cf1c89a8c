//! Handler for the card-reader kiosk.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/kiosk/punch` | Body: [`PunchBody`]; appends the derived IN or OUT |

use axum::{Json, extract::State};
use serde::Deserialize;
use tapin_core::{
  event::CardId,
  store::{AttendanceStore, PunchRecorded},
};

use crate::{AppState, auth::Authenticated, error::ApiError};

/// JSON body accepted by `POST /api/kiosk/punch`.
#[derive(Debug, Deserialize)]
pub struct PunchBody {
  /// Raw reader output; normalised before the binding lookup.
  pub card_id: String,
}

/// `POST /api/kiosk/punch` — toggle attendance for the tapped card.
pub async fn punch<S>(
  State(state): State<AppState<S>>,
  _auth: Authenticated,
  Json(body): Json<PunchBody>,
) -> Result<Json<PunchRecorded>, ApiError>
where
  S: AttendanceStore + Clone + Send + Sync + 'static,
  S::Error: Into<ApiError>,
{
  let card = CardId::normalize(&body.card_id)?;
  let recorded = state.store.record_punch(card).await.map_err(Into::into)?;
  tracing::info!(
    user_id = %recorded.event.user_id,
    kind = recorded.event.kind.as_str(),
    "punch recorded"
  );
  Ok(Json(recorded))
}
