//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings (always UTC, so lexical order
//! matches chronological order), local dates as `YYYY-MM-DD`, UUIDs as
//! hyphenated lowercase strings and enums as their short discriminants.
//!
//! The `*_from_sql` variants exist for decoding *inside* a transaction
//! closure, where only `rusqlite` errors can propagate.

use chrono::{DateTime, NaiveDate, Utc};
use tapin_core::{
  event::{AttendanceEvent, CardId, PunchKind},
  roster::{Member, MemberPresence, MemberStatus, Team, TeamPresence},
  store::{LogoutLogEntry, LogoutOutcome},
  token::RegistrationToken,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn uuid_from_sql(s: &str) -> rusqlite::Result<Uuid> {
  Uuid::parse_str(s).map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(
      0,
      rusqlite::types::Type::Text,
      Box::new(e),
    )
  })
}

// ─── Timestamps and dates ────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Punch kind ──────────────────────────────────────────────────────────────

pub fn encode_kind(kind: PunchKind) -> &'static str { kind.as_str() }

pub fn decode_kind(s: &str) -> Result<PunchKind> {
  match s {
    "in" => Ok(PunchKind::In),
    "out" => Ok(PunchKind::Out),
    other => Err(Error::Decode(format!("unknown punch kind: {other:?}"))),
  }
}

pub fn kind_from_sql(s: &str) -> rusqlite::Result<PunchKind> {
  match s {
    "in" => Ok(PunchKind::In),
    "out" => Ok(PunchKind::Out),
    other => Err(rusqlite::Error::FromSqlConversionFailure(
      0,
      rusqlite::types::Type::Text,
      format!("unknown punch kind: {other:?}").into(),
    )),
  }
}

// ─── Card ids ────────────────────────────────────────────────────────────────

/// Stored card ids are already canonical; normalisation is idempotent, so
/// re-running it on read doubles as a validity check.
pub fn decode_card(s: &str) -> Result<CardId> { Ok(CardId::normalize(s)?) }

pub fn card_from_sql(s: &str) -> rusqlite::Result<CardId> {
  CardId::normalize(s).map_err(|e| {
    rusqlite::Error::FromSqlConversionFailure(
      0,
      rusqlite::types::Type::Text,
      Box::new(e),
    )
  })
}

// ─── Member status ───────────────────────────────────────────────────────────

pub fn decode_status(code: i64) -> Result<MemberStatus> {
  MemberStatus::from_code(code)
    .ok_or_else(|| Error::Decode(format!("unknown member status: {code}")))
}

// ─── Logout outcome ──────────────────────────────────────────────────────────

pub fn decode_outcome(s: &str) -> Result<LogoutOutcome> {
  match s {
    "success" => Ok(LogoutOutcome::Success),
    "error" => Ok(LogoutOutcome::Error),
    other => Err(Error::Decode(format!("unknown sweep outcome: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `attendance_events` row.
pub struct RawEvent {
  pub event_id:    String,
  pub user_id:     String,
  pub card_id:     String,
  pub kind:        String,
  pub occurred_at: String,
  pub local_date:  String,
}

impl RawEvent {
  pub fn into_event(self) -> Result<AttendanceEvent> {
    Ok(AttendanceEvent {
      event_id:    decode_uuid(&self.event_id)?,
      user_id:     decode_uuid(&self.user_id)?,
      card_id:     decode_card(&self.card_id)?,
      kind:        decode_kind(&self.kind)?,
      occurred_at: decode_dt(&self.occurred_at)?,
      local_date:  decode_date(&self.local_date)?,
    })
  }
}

/// Raw strings read directly from a `registration_tokens` row.
pub struct RawToken {
  pub token:       String,
  pub card_id:     String,
  pub created_at:  String,
  pub expires_at:  String,
  pub accessed_at: Option<String>,
  pub used_at:     Option<String>,
}

impl RawToken {
  pub fn into_token(self) -> Result<RegistrationToken> {
    Ok(RegistrationToken {
      token:       self.token,
      card_id:     decode_card(&self.card_id)?,
      created_at:  decode_dt(&self.created_at)?,
      expires_at:  decode_dt(&self.expires_at)?,
      accessed_at: self.accessed_at.as_deref().map(decode_dt).transpose()?,
      used_at:     self.used_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw columns read directly from a `members` row.
pub struct RawMember {
  pub user_id:      String,
  pub display_name: Option<String>,
  pub generation:   i64,
  pub status:       i64,
}

impl RawMember {
  pub fn into_member(self) -> Result<Member> {
    Ok(Member {
      user_id:      decode_uuid(&self.user_id)?,
      display_name: self.display_name,
      generation:   self.generation as i32,
      status:       decode_status(self.status)?,
    })
  }
}

/// Raw columns from the roster join: a member with their team, binding and
/// latest punch.
pub struct RawMemberPresence {
  pub user_id:      String,
  pub display_name: Option<String>,
  pub generation:   i64,
  pub status:       i64,
  pub team_id:      Option<String>,
  pub team_name:    Option<String>,
  pub card_id:      Option<String>,
  pub last_kind:    Option<String>,
  pub last_seen:    Option<String>,
}

impl RawMemberPresence {
  pub fn into_presence(self) -> Result<MemberPresence> {
    let team = match (self.team_id, self.team_name) {
      (Some(id), Some(name)) => {
        Some(Team { team_id: decode_uuid(&id)?, name })
      }
      _ => None,
    };
    Ok(MemberPresence {
      member: Member {
        user_id:      decode_uuid(&self.user_id)?,
        display_name: self.display_name,
        generation:   self.generation as i32,
        status:       decode_status(self.status)?,
      },
      team,
      card_id: self.card_id.as_deref().map(decode_card).transpose()?,
      last_kind: self.last_kind.as_deref().map(decode_kind).transpose()?,
      last_seen: self.last_seen.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw columns from the team headcount query.
pub struct RawTeamPresence {
  pub team_id: String,
  pub name:    String,
  pub present: i64,
  pub total:   i64,
}

impl RawTeamPresence {
  pub fn into_presence(self) -> Result<TeamPresence> {
    Ok(TeamPresence {
      team:    Team { team_id: decode_uuid(&self.team_id)?, name: self.name },
      present: self.present.max(0) as u32,
      total:   self.total.max(0) as u32,
    })
  }
}

/// Raw columns read directly from a `logout_log` row.
pub struct RawLogEntry {
  pub entry_id:       String,
  pub executed_at:    String,
  pub affected_count: i64,
  pub outcome:        String,
}

impl RawLogEntry {
  pub fn into_entry(self) -> Result<LogoutLogEntry> {
    Ok(LogoutLogEntry {
      entry_id:       decode_uuid(&self.entry_id)?,
      executed_at:    decode_dt(&self.executed_at)?,
      affected_count: self.affected_count.max(0) as u64,
      outcome:        decode_outcome(&self.outcome)?,
    })
  }
}
