//! Daily presence rollups and attendance statistics.
//!
//! Presence is binary: a member either showed up on a day or did not, no
//! matter how many sessions they logged. The folds here are pure; the store
//! feeds them distinct (user, day) pairs and a roster snapshot.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roster::RosterSnapshot;

// ─── Rollups ─────────────────────────────────────────────────────────────────

/// How deep a rollup breaks counts down.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
  /// Per-date totals only.
  #[default]
  None,
  /// Per-date, per-team counts.
  Team,
  /// Per-date, per-team, per-generation counts.
  TeamAndGrade,
}

/// Counts for one team on one date.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TeamRollup {
  pub count:  u32,
  /// Populated only at [`Grouping::TeamAndGrade`] depth.
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub grades: BTreeMap<i32, u32>,
}

/// Counts for one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRollup {
  pub date:  NaiveDate,
  pub total: u32,
  /// Populated at [`Grouping::Team`] depth and deeper. Keyed by team name;
  /// members without a team land under
  /// [`crate::roster::UNASSIGNED_TEAM`], so team counts always sum to
  /// `total`.
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub teams: BTreeMap<String, TeamRollup>,
}

/// Fold distinct (user, date) presences into per-date rollups.
///
/// `presences` need not be sorted or deduplicated; a repeated (user, date)
/// pair is counted once. Output is ordered by date.
pub fn daily_rollups(
  presences: &[(Uuid, NaiveDate)],
  roster: &RosterSnapshot,
  grouping: Grouping,
) -> Vec<DailyRollup> {
  let distinct: BTreeSet<(NaiveDate, Uuid)> =
    presences.iter().map(|(user, date)| (*date, *user)).collect();

  let mut days: BTreeMap<NaiveDate, DailyRollup> = BTreeMap::new();
  for (date, user) in distinct {
    let day = days.entry(date).or_insert_with(|| DailyRollup {
      date,
      total: 0,
      teams: BTreeMap::new(),
    });
    day.total += 1;

    if grouping == Grouping::None {
      continue;
    }
    let team =
      day.teams.entry(roster.team_name_of(user).to_owned()).or_default();
    team.count += 1;
    if grouping == Grouping::TeamAndGrade {
      *team.grades.entry(roster.generation_of(user)).or_insert(0) += 1;
    }
  }

  days.into_values().collect()
}

// ─── Rates ───────────────────────────────────────────────────────────────────

/// `attended / possible` as a percentage; `0.0` whenever `possible` is
/// zero. The zero guard is load-bearing: empty teams and dead windows must
/// read as 0%, not NaN.
pub fn attendance_rate(attended: u32, possible: u32) -> f64 {
  if possible == 0 {
    return 0.0;
  }
  f64::from(attended) / f64::from(possible) * 100.0
}

/// Mean of per-day team rates across `active_days` (days the club as a
/// whole was active). Days the team skipped entirely count as 0%.
pub fn mean_team_rate(
  presences_by_day: &BTreeMap<NaiveDate, u32>,
  active_days: &BTreeSet<NaiveDate>,
  member_count: u32,
) -> f64 {
  if active_days.is_empty() {
    return 0.0;
  }
  let sum: f64 = active_days
    .iter()
    .map(|day| {
      attendance_rate(
        presences_by_day.get(day).copied().unwrap_or(0),
        member_count,
      )
    })
    .sum();
  sum / active_days.len() as f64
}

// ─── Stat summaries ──────────────────────────────────────────────────────────

/// Windowed statistics for one team.
#[derive(Debug, Clone, Serialize)]
pub struct TeamStats {
  pub team_id:         Uuid,
  pub name:            String,
  /// Non-alumni members on the team.
  pub member_count:    u32,
  pub today_attendees: u32,
  pub today_rate:      f64,
  /// See [`mean_team_rate`].
  pub average_rate:    f64,
}

/// Whole-club statistics over a trailing window.
#[derive(Debug, Clone, Serialize)]
pub struct OverallStats {
  pub today_attendees:      u32,
  /// Non-alumni members in the directory.
  pub member_count:         u32,
  /// Days in the window with at least one punch-in.
  pub active_days:          u32,
  /// Total closed session time across all members, in hours.
  pub total_activity_hours: f64,
}
