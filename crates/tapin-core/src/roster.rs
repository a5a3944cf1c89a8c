//! Member and team directory snapshots.
//!
//! Identity lives in an external system; the ledger keeps only the slim
//! snapshot it needs for display names and rollup buckets, synced through
//! the admin surface. Missing directory data never blocks a punch.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{CardId, PunchKind};

/// Shown when the directory has no display name for a member.
pub const FALLBACK_DISPLAY_NAME: &str = "unnamed member";

/// Reserved rollup bucket for members without a team.
pub const UNASSIGNED_TEAM: &str = "unassigned";

// ─── Members ─────────────────────────────────────────────────────────────────

/// Enrollment status, stored as the numeric code used by the upstream
/// member database (0, 1, 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
  JuniorHigh,
  HighSchool,
  Alumni,
}

impl MemberStatus {
  pub fn code(self) -> i64 {
    match self {
      Self::JuniorHigh => 0,
      Self::HighSchool => 1,
      Self::Alumni => 2,
    }
  }

  pub fn from_code(code: i64) -> Option<Self> {
    match code {
      0 => Some(Self::JuniorHigh),
      1 => Some(Self::HighSchool),
      2 => Some(Self::Alumni),
      _ => None,
    }
  }

  /// Alumni drop in socially: their punches count as presence, but they are
  /// excluded from member counts and rate denominators.
  pub fn counts_toward_rates(self) -> bool { !matches!(self, Self::Alumni) }
}

#[derive(Debug, Clone, Serialize)]
pub struct Member {
  pub user_id:      Uuid,
  pub display_name: Option<String>,
  /// Cohort number ("generation"), the grade axis of the rollups.
  pub generation:   i32,
  pub status:       MemberStatus,
}

impl Member {
  /// Display name with the directory-miss fallback applied.
  pub fn display_name_or_fallback(&self) -> &str {
    self.display_name.as_deref().unwrap_or(FALLBACK_DISPLAY_NAME)
  }
}

// ─── Teams ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Team {
  pub team_id: Uuid,
  pub name:    String,
}

// ─── Card bindings ───────────────────────────────────────────────────────────

/// Links a physical card to a member. One card per member and one member
/// per card; both uniquenesses are enforced by the store.
#[derive(Debug, Clone, Serialize)]
pub struct CardBinding {
  pub card_id:  CardId,
  pub user_id:  Uuid,
  pub bound_at: DateTime<Utc>,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// A member joined with their binding, team and latest punch.
#[derive(Debug, Clone, Serialize)]
pub struct MemberPresence {
  pub member:    Member,
  pub team:      Option<Team>,
  pub card_id:   Option<CardId>,
  pub last_kind: Option<PunchKind>,
  pub last_seen: Option<DateTime<Utc>>,
}

impl MemberPresence {
  pub fn is_present(&self) -> bool {
    matches!(self.last_kind, Some(PunchKind::In))
  }
}

/// A team with its live headcount.
#[derive(Debug, Clone, Serialize)]
pub struct TeamPresence {
  pub team:    Team,
  /// Members whose latest punch is IN.
  pub present: u32,
  /// Non-alumni members assigned to the team.
  pub total:   u32,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Membership looked up once per aggregation call, so a rollup never mixes
/// two generations of team assignments mid-fold.
#[derive(Debug, Clone, Default)]
pub struct RosterSnapshot {
  members:    HashMap<Uuid, Member>,
  team_names: HashMap<Uuid, String>,
}

impl RosterSnapshot {
  /// Build from the directory plus `(user_id, team_name)` assignments.
  pub fn new(members: Vec<Member>, assignments: Vec<(Uuid, String)>) -> Self {
    Self {
      members:    members.into_iter().map(|m| (m.user_id, m)).collect(),
      team_names: assignments.into_iter().collect(),
    }
  }

  pub fn member(&self, user_id: Uuid) -> Option<&Member> {
    self.members.get(&user_id)
  }

  /// Team bucket for a user; unknown users and members without a team land
  /// under [`UNASSIGNED_TEAM`].
  pub fn team_name_of(&self, user_id: Uuid) -> &str {
    self
      .team_names
      .get(&user_id)
      .map(String::as_str)
      .unwrap_or(UNASSIGNED_TEAM)
  }

  /// Generation bucket for a user; zero when the directory has no record,
  /// so rollup sums still balance.
  pub fn generation_of(&self, user_id: Uuid) -> i32 {
    self.members.get(&user_id).map(|m| m.generation).unwrap_or(0)
  }
}
