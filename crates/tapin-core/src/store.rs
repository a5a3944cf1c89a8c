//! The `AttendanceStore` trait and supporting query and receipt types.
//!
//! The trait is implemented by storage backends (`tapin-store-sqlite`);
//! the API layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Days, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{AttendanceEvent, CardId},
  rollup::{DailyRollup, Grouping, OverallStats, TeamStats},
  roster::{CardBinding, Member, MemberPresence, MemberStatus, Team, TeamPresence},
  session::Session,
  token::RegistrationToken,
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// An inclusive local-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
  from: NaiveDate,
  to:   NaiveDate,
}

impl DateRange {
  pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
    if from > to {
      return Err(Error::InvalidDateRange { from, to });
    }
    Ok(Self { from, to })
  }

  /// The whole calendar month containing `year`/`month`; `None` for an
  /// invalid month number.
  pub fn month(year: i32, month: u32) -> Option<Self> {
    let from = NaiveDate::from_ymd_opt(year, month, 1)?;
    let to = from.checked_add_months(chrono::Months::new(1))?.pred_opt()?;
    Some(Self { from, to })
  }

  /// The `days`-day window ending at `today`, inclusive.
  pub fn trailing(today: NaiveDate, days: u32) -> Self {
    let from = today
      .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
      .unwrap_or(NaiveDate::MIN);
    Self { from, to: today }
  }

  pub fn start(&self) -> NaiveDate { self.from }

  pub fn end(&self) -> NaiveDate { self.to }

  pub fn contains(&self, date: NaiveDate) -> bool {
    self.from <= date && date <= self.to
  }
}

// ─── Receipts ────────────────────────────────────────────────────────────────

/// What the kiosk shows after a punch.
#[derive(Debug, Clone, Serialize)]
pub struct PunchRecorded {
  pub event:        AttendanceEvent,
  /// Directory display name with the fallback already applied.
  pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoutOutcome {
  Success,
  Error,
}

/// Append-only audit record: exactly one per sweep invocation, zero-work
/// sweeps included.
#[derive(Debug, Clone, Serialize)]
pub struct LogoutLogEntry {
  pub entry_id:       Uuid,
  pub executed_at:    DateTime<Utc>,
  pub affected_count: u64,
  pub outcome:        LogoutOutcome,
}

/// Outcome of one bulk-logout sweep.
#[derive(Debug, Clone, Serialize)]
pub struct LogoutSweep {
  /// Members whose open attendance was force-closed.
  pub affected: u64,
  pub entry:    LogoutLogEntry,
}

/// Input to [`AttendanceStore::upsert_member`].
#[derive(Debug, Clone)]
pub struct NewMember {
  pub user_id:      Uuid,
  pub display_name: Option<String>,
  pub generation:   i32,
  pub status:       MemberStatus,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an attendance ledger backend.
///
/// The event table is strictly append-only; its only writers are the two
/// toggle paths and the bulk-logout sweep. Backends must make
/// [`record_punch`](AttendanceStore::record_punch),
/// [`consume_token`](AttendanceStore::consume_token) and
/// [`force_logout_all`](AttendanceStore::force_logout_all) atomic: two
/// racing calls may never both act on the same prior state.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes (tokio with `axum`).
pub trait AttendanceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Punches ───────────────────────────────────────────────────────────

  /// Toggle attendance for the member bound to `card`: append the derived
  /// IN or OUT and return it with the member's display name.
  fn record_punch(
    &self,
    card: CardId,
  ) -> impl Future<Output = Result<PunchRecorded, Self::Error>> + Send + '_;

  /// Admin override: toggle by member id, fixing a forgotten tap. The
  /// member must have a card binding.
  fn force_toggle(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<AttendanceEvent, Self::Error>> + Send + '_;

  /// Close every open attendance with one synthetic OUT per member, all
  /// sharing one timestamp, atomically. Always appends exactly one audit
  /// entry, even when nothing was open.
  fn force_logout_all(
    &self,
  ) -> impl Future<Output = Result<LogoutSweep, Self::Error>> + Send + '_;

  // ── Ledger reads ──────────────────────────────────────────────────────

  /// A member's events with `local_date` in `range`, ascending by
  /// `occurred_at`.
  fn events_for(
    &self,
    user_id: Uuid,
    range: DateRange,
  ) -> impl Future<Output = Result<Vec<AttendanceEvent>, Self::Error>> + Send + '_;

  /// Reconstructed sessions for a member over `range`, ascending.
  fn sessions_for(
    &self,
    user_id: Uuid,
    range: DateRange,
  ) -> impl Future<Output = Result<Vec<Session>, Self::Error>> + Send + '_;

  /// Local dates in `range` on which the member punched in at least once.
  fn presence_dates(
    &self,
    user_id: Uuid,
    range: DateRange,
  ) -> impl Future<Output = Result<Vec<NaiveDate>, Self::Error>> + Send + '_;

  // ── Aggregation ───────────────────────────────────────────────────────

  /// Per-date presence counts over `range` at the requested depth.
  fn rollup(
    &self,
    range: DateRange,
    grouping: Grouping,
  ) -> impl Future<Output = Result<Vec<DailyRollup>, Self::Error>> + Send + '_;

  /// Windowed statistics for one team.
  fn team_stats(
    &self,
    team_id: Uuid,
    window_days: u32,
  ) -> impl Future<Output = Result<TeamStats, Self::Error>> + Send + '_;

  /// Whole-club statistics over a trailing window.
  fn overall_stats(
    &self,
    window_days: u32,
  ) -> impl Future<Output = Result<OverallStats, Self::Error>> + Send + '_;

  // ── Registration tokens ───────────────────────────────────────────────

  /// Issue a fresh token for `card`, superseding any live token for the
  /// same card. Fails with `CardAlreadyBound` if the card already belongs
  /// to a member.
  fn issue_token(
    &self,
    card: CardId,
    ttl: Duration,
  ) -> impl Future<Output = Result<RegistrationToken, Self::Error>> + Send + '_;

  /// Look up a token without consuming it, stamping `accessed_at` on the
  /// first read. `None` for unknown tokens.
  fn peek_token(
    &self,
    token: String,
  ) -> impl Future<Output = Result<Option<RegistrationToken>, Self::Error>> + Send + '_;

  /// Consume a live token: atomically mark it used and bind its card to
  /// `user_id`. Exactly one of two racing calls succeeds.
  fn consume_token(
    &self,
    token: String,
    user_id: Uuid,
  ) -> impl Future<Output = Result<CardBinding, Self::Error>> + Send + '_;

  /// All tokens, newest first.
  fn list_tokens(
    &self,
  ) -> impl Future<Output = Result<Vec<RegistrationToken>, Self::Error>> + Send + '_;

  /// Drop a pending registration. Fails with `TokenInvalid` if unknown.
  fn delete_token(
    &self,
    token: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Bindings ──────────────────────────────────────────────────────────

  /// Privileged re-bind. Honours card uniqueness and replaces the member's
  /// previous card, if any.
  fn rebind_card(
    &self,
    user_id: Uuid,
    card: CardId,
  ) -> impl Future<Output = Result<CardBinding, Self::Error>> + Send + '_;

  // ── Directory ─────────────────────────────────────────────────────────

  /// Insert or update a member record synced from the identity system.
  fn upsert_member(
    &self,
    member: NewMember,
  ) -> impl Future<Output = Result<Member, Self::Error>> + Send + '_;

  /// Members joined with binding, team and latest punch, ordered by
  /// generation then user id.
  fn members(
    &self,
  ) -> impl Future<Output = Result<Vec<MemberPresence>, Self::Error>> + Send + '_;

  fn add_team(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Team, Self::Error>> + Send + '_;

  fn rename_team(
    &self,
    team_id: Uuid,
    name: String,
  ) -> impl Future<Output = Result<Team, Self::Error>> + Send + '_;

  /// Delete a team with no members assigned; `TeamNotEmpty` otherwise.
  fn delete_team(
    &self,
    team_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Assign a member to `team_id`, or clear the assignment with `None`.
  fn assign_team(
    &self,
    user_id: Uuid,
    team_id: Option<Uuid>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Teams with live presence counts, ordered by name.
  fn teams(
    &self,
  ) -> impl Future<Output = Result<Vec<TeamPresence>, Self::Error>> + Send + '_;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Sweep audit entries, newest first, at most `limit`.
  fn logout_log(
    &self,
    limit: u32,
  ) -> impl Future<Output = Result<Vec<LogoutLogEntry>, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 6, d).unwrap() }

  #[test]
  fn inverted_range_is_rejected() {
    assert!(matches!(
      DateRange::new(date(9), date(3)),
      Err(Error::InvalidDateRange { .. })
    ));
    assert!(DateRange::new(date(3), date(3)).is_ok());
  }

  #[test]
  fn month_range_covers_the_whole_month() {
    let range = DateRange::month(2024, 2).unwrap();
    assert_eq!(range.start(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    // 2024 is a leap year.
    assert_eq!(range.end(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    assert!(DateRange::month(2024, 13).is_none());
  }

  #[test]
  fn trailing_window_includes_today() {
    let range = DateRange::trailing(date(30), 30);
    assert_eq!(range.end(), date(30));
    assert_eq!(range.start(), date(1));
    assert!(range.contains(date(15)));
    assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 5, 31).unwrap()));
  }
}
