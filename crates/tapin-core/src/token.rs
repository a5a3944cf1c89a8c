//! Registration tokens — the short-lived bridge between a card tap at the
//! kiosk and a member account.
//!
//! A token is bound to a card (not a user) at issue time. Whoever presents
//! it before expiry binds their account to that card, exactly once.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{Error, Result, event::CardId};

/// Default validity: the strict kiosk flow (tap, scan the QR on the spot).
pub const DEFAULT_TTL_MINUTES: i64 = 30;

/// Upper bound for caller-supplied TTLs.
pub const MAX_TTL_MINUTES: i64 = 24 * 60;

/// Validate a caller-supplied TTL in minutes.
pub fn validate_ttl(minutes: i64) -> Result<Duration> {
  if (1..=MAX_TTL_MINUTES).contains(&minutes) {
    Ok(Duration::minutes(minutes))
  } else {
    Err(Error::InvalidTtl(minutes))
  }
}

/// Mint an opaque token string. The `qr_` prefix survives from the QR
/// hand-off flow and keeps tokens grep-able in logs.
pub fn mint_token() -> String { format!("qr_{}", Uuid::new_v4()) }

/// Where a token is in its lifecycle, derived from its stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
  /// Issued, not yet opened on a phone.
  Created,
  /// Opened at least once, not yet consumed.
  Accessed,
  Consumed,
  Expired,
}

/// A pending (or spent) card registration.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationToken {
  pub token:       String,
  pub card_id:     CardId,
  pub created_at:  DateTime<Utc>,
  pub expires_at:  DateTime<Utc>,
  /// First time the registration page fetched this token; set once.
  pub accessed_at: Option<DateTime<Utc>>,
  pub used_at:     Option<DateTime<Utc>>,
}

impl RegistrationToken {
  /// Lifecycle state as of `now`. Consumption wins over expiry: a token
  /// spent in time stays `Consumed` forever. A token is valid through its
  /// expiry instant, expired strictly after it.
  pub fn state(&self, now: DateTime<Utc>) -> TokenState {
    if self.used_at.is_some() {
      TokenState::Consumed
    } else if self.expires_at < now {
      TokenState::Expired
    } else if self.accessed_at.is_some() {
      TokenState::Accessed
    } else {
      TokenState::Created
    }
  }

  pub fn is_live(&self, now: DateTime<Utc>) -> bool {
    matches!(self.state(now), TokenState::Created | TokenState::Accessed)
  }
}
