//! Punch events — the fundamental unit of the attendance ledger.
//!
//! An event records one accepted card tap (or one synthetic admin action).
//! Events are never updated or deleted; current status, sessions and every
//! statistic are derived from them on read.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, tz::OrgTz};

// ─── Card identifiers ────────────────────────────────────────────────────────

/// A normalised card identifier.
///
/// Readers report the same physical card in several spellings
/// (`04:A2:1C:9F`, `04a21c9f`, trailing whitespace). Normalisation strips
/// `:` separators, lowercases and trims — and happens exactly once, here.
/// Every lookup and every stored row uses the canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CardId(String);

impl CardId {
  /// Normalise a raw reader string. Fails if nothing is left afterwards.
  pub fn normalize(raw: &str) -> Result<Self> {
    let canonical: String = raw
      .trim()
      .chars()
      .filter(|c| *c != ':')
      .flat_map(char::to_lowercase)
      .collect();
    if canonical.is_empty() {
      return Err(Error::InvalidCardId(raw.to_owned()));
    }
    Ok(Self(canonical))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CardId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Punch kinds ─────────────────────────────────────────────────────────────

/// The direction of a punch. The ledger stores what the toggle decided, so
/// readers of the event stream never re-run toggle logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunchKind {
  In,
  Out,
}

impl PunchKind {
  pub fn toggled(self) -> Self {
    match self {
      Self::In => Self::Out,
      Self::Out => Self::In,
    }
  }

  /// The toggle rule, no-history case included: the entire state machine.
  pub fn after(last: Option<PunchKind>) -> Self {
    match last {
      Some(kind) => kind.toggled(),
      None => Self::In,
    }
  }

  /// The discriminant stored in the `kind` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::In => "in",
      Self::Out => "out",
    }
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// One accepted punch. Immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceEvent {
  pub event_id:    Uuid,
  pub user_id:     Uuid,
  pub card_id:     CardId,
  pub kind:        PunchKind,
  /// Server-assigned instant; never accepted from callers.
  pub occurred_at: DateTime<Utc>,
  /// The club-wall-clock day of `occurred_at`, denormalised for range
  /// queries. Always derived via [`OrgTz::local_date`].
  pub local_date:  NaiveDate,
}

impl AttendanceEvent {
  /// Assemble an event at `occurred_at`, deriving `local_date` with `tz`.
  pub fn punch(
    user_id: Uuid,
    card_id: CardId,
    kind: PunchKind,
    occurred_at: DateTime<Utc>,
    tz: OrgTz,
  ) -> Self {
    Self {
      event_id: Uuid::new_v4(),
      user_id,
      card_id,
      kind,
      occurred_at,
      local_date: tz.local_date(occurred_at),
    }
  }
}
