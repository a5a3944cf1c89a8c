//! The organisational time zone.
//!
//! Which calendar day a punch belongs to is defined by the club's wall
//! clock, not by UTC and not by the server's locale. Every local-date
//! derivation in the workspace goes through [`OrgTz::local_date`], so the
//! day-boundary rule lives in exactly one place.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::{Error, Result};

/// UTC offset of Japan Standard Time, the deployment this system was built
/// for.
pub const JST_OFFSET_MINUTES: i32 = 9 * 60;

/// A fixed UTC offset standing in for the club's wall clock.
///
/// A fixed offset is sufficient here: JST has no daylight-saving
/// transitions, and deployments elsewhere configure their own offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgTz {
  offset: FixedOffset,
}

impl OrgTz {
  /// Build from a UTC offset in minutes, east positive.
  pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
    minutes
      .checked_mul(60)
      .and_then(FixedOffset::east_opt)
      .map(|offset| Self { offset })
      .ok_or(Error::InvalidUtcOffset(minutes))
  }

  /// Japan Standard Time (+09:00).
  pub fn jst() -> Self {
    // +09:00 is always within chrono's representable offset range.
    Self { offset: FixedOffset::east_opt(JST_OFFSET_MINUTES * 60).unwrap() }
  }

  /// The calendar day `instant` falls on, on the club's wall clock.
  pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&self.offset).date_naive()
  }

  /// The wall-clock time of day for `instant`.
  pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
    instant.with_timezone(&self.offset).time()
  }
}

impl Default for OrgTz {
  fn default() -> Self { Self::jst() }
}
