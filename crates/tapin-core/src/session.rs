//! Session reconstruction — pairing punches into presence intervals.
//!
//! Sessions are never stored. [`reconstruct`] is a pure fold over one
//! user's events: running it twice over the same slice yields the same
//! sessions, and correcting ledger data corrects every past aggregate
//! automatically.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::event::{AttendanceEvent, PunchKind};

/// A derived presence interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
  pub user_id:          Uuid,
  /// The day the session belongs to: the IN punch's local date. A session
  /// crossing midnight stays on the day it started.
  pub date:             NaiveDate,
  pub started_at:       DateTime<Utc>,
  /// `None` while the session is still open.
  pub ended_at:         Option<DateTime<Utc>>,
  /// Whole seconds between IN and OUT; `None` while open. Never negative.
  pub duration_seconds: Option<i64>,
}

impl Session {
  pub fn is_open(&self) -> bool { self.ended_at.is_none() }

  /// Seconds elapsed as of `now`: the closed duration for finished
  /// sessions, `now - started_at` (floored at zero) for open ones. This is
  /// the live estimate a kiosk display shows; it is never persisted.
  pub fn duration_as_of(&self, now: DateTime<Utc>) -> i64 {
    match self.duration_seconds {
      Some(secs) => secs,
      None => (now - self.started_at).num_seconds().max(0),
    }
  }
}

/// Pair one user's events into sessions with a single forward scan.
///
/// `events` must belong to one user and be ordered by `occurred_at`
/// ascending; the store's queries guarantee both.
///
/// Ledger anomalies are tolerated, never repaired in place:
/// - a second IN while a session is open is ignored (the earlier IN wins),
/// - an OUT with no open session is ignored,
/// - a trailing IN yields an open session with `ended_at: None`.
pub fn reconstruct(events: &[AttendanceEvent]) -> Vec<Session> {
  let mut sessions = Vec::new();
  let mut open: Option<&AttendanceEvent> = None;

  for event in events {
    match event.kind {
      PunchKind::In => {
        if open.is_none() {
          open = Some(event);
        }
      }
      PunchKind::Out => {
        if let Some(started) = open.take() {
          let secs =
            (event.occurred_at - started.occurred_at).num_seconds().max(0);
          sessions.push(Session {
            user_id:          started.user_id,
            date:             started.local_date,
            started_at:       started.occurred_at,
            ended_at:         Some(event.occurred_at),
            duration_seconds: Some(secs),
          });
        }
      }
    }
  }

  if let Some(started) = open {
    sessions.push(Session {
      user_id:          started.user_id,
      date:             started.local_date,
      started_at:       started.occurred_at,
      ended_at:         None,
      duration_seconds: None,
    });
  }

  sessions
}

/// Total closed seconds across `events`; an open tail contributes nothing.
pub fn closed_seconds(events: &[AttendanceEvent]) -> i64 {
  reconstruct(events).iter().filter_map(|s| s.duration_seconds).sum()
}
