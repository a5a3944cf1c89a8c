use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
};

use chrono::{Duration, NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use tapin_core::{
  event::{AttendanceEvent, CardId, PunchKind},
  rollup::{
    attendance_rate, daily_rollups, mean_team_rate, DailyRollup, Grouping,
    OverallStats, TeamStats,
  },
  roster::{
    CardBinding, Member, MemberPresence, RosterSnapshot, Team, TeamPresence,
    FALLBACK_DISPLAY_NAME,
  },
  session::{closed_seconds, reconstruct, Session},
  store::{
    AttendanceStore, DateRange, LogoutLogEntry, LogoutOutcome, LogoutSweep,
    NewMember, PunchRecorded,
  },
  token::{mint_token, RegistrationToken},
  tz::OrgTz,
};
use uuid::Uuid;

use crate::{
  encode::{
    card_from_sql, decode_card, decode_date, decode_uuid, encode_date,
    encode_dt, encode_kind, encode_uuid, kind_from_sql, uuid_from_sql,
    RawEvent, RawLogEntry, RawMember, RawMemberPresence, RawTeamPresence,
    RawToken,
  },
  schema::SCHEMA,
  Error, Result,
};

/// Subquery selecting the rowid of a member's most recent punch. The ledger
/// stores UTC timestamps as RFC 3339 text, so lexical order is chronological
/// order; ties (same timestamp) go to the later insertion.
const LATEST_PUNCH_ROWID: &str = "(SELECT e2.rowid FROM attendance_events e2 \
   WHERE e2.user_id = {user} \
   ORDER BY e2.occurred_at DESC, e2.rowid DESC LIMIT 1)";

fn latest_punch_rowid(user_expr: &str) -> String {
  LATEST_PUNCH_ROWID.replace("{user}", user_expr)
}

// ─── Closure outcomes ────────────────────────────────────────────────────────
//
// Domain decisions made while a transaction is open are carried out of the
// `conn.call` closure as plain values and converted to errors afterwards;
// only database errors cross the closure boundary as errors.

enum PunchOutcome {
  UnknownCard,
  Recorded {
    event:        AttendanceEvent,
    display_name: Option<String>,
  },
}

enum ToggleOutcome {
  NoBinding,
  Recorded(AttendanceEvent),
}

enum IssueOutcome {
  AlreadyBound,
  Issued(RegistrationToken),
}

enum ConsumeOutcome {
  NotFound,
  AlreadyUsed,
  Expired,
  BoundToOther(String),
  Bound(CardBinding),
}

enum RebindOutcome {
  BoundToOther,
  Bound(CardBinding),
}

enum RenameOutcome {
  Missing,
  NameTaken,
  Renamed,
}

enum DeleteTeamOutcome {
  Missing,
  NotEmpty(i64),
  Deleted,
}

enum AssignOutcome {
  TeamMissing(Uuid),
  MemberMissing,
  Assigned,
}

struct SweepRaw {
  entry_id:    Uuid,
  executed_at: chrono::DateTime<Utc>,
  affected:    u64,
  failed:      Option<String>,
}

struct TeamStatsRaw {
  name:         Option<String>,
  member_count: i64,
  by_day:       Vec<(String, i64)>,
  active_days:  Vec<String>,
}

// ─── The store ───────────────────────────────────────────────────────────────

/// SQLite-backed attendance store.
///
/// All access goes through a single [`tokio_rusqlite::Connection`], which
/// serializes every operation onto one worker thread. Multi-step writes
/// additionally run inside an `IMMEDIATE` transaction, so a card punch, a
/// token consumption and the nightly sweep each read and write the ledger
/// atomically.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
  tz:   OrgTz,
}

impl SqliteStore {
  /// Opens (or creates) the database at `path` and applies the schema.
  pub async fn open(path: impl AsRef<Path>, tz: OrgTz) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = SqliteStore { conn, tz };
    store.init_schema().await?;
    Ok(store)
  }

  /// Opens an in-memory database, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = SqliteStore { conn, tz: OrgTz::jst() };
    store.init_schema().await?;
    Ok(store)
  }

  /// The organization clock used to derive activity dates.
  pub fn tz(&self) -> OrgTz { self.tz }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl AttendanceStore for SqliteStore {
  type Error = Error;

  // ─── Punches ───────────────────────────────────────────────────────────

  async fn record_punch(&self, card: CardId) -> Result<PunchRecorded> {
    let tz = self.tz;
    let card_str = card.as_str().to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let user_str: Option<String> = tx
          .query_row(
            "SELECT user_id FROM card_bindings WHERE card_id = ?1",
            rusqlite::params![card_str],
            |row| row.get(0),
          )
          .optional()?;
        let Some(user_str) = user_str else {
          return Ok(PunchOutcome::UnknownCard);
        };

        let last: Option<String> = tx
          .query_row(
            &format!(
              "SELECT kind FROM attendance_events WHERE rowid = {}",
              latest_punch_rowid("?1")
            ),
            rusqlite::params![user_str],
            |row| row.get(0),
          )
          .optional()?;
        let last = last.as_deref().map(kind_from_sql).transpose()?;

        // The timestamp is assigned here, under the transaction, so the
        // append order of the ledger matches its timestamp order.
        let event = AttendanceEvent::punch(
          uuid_from_sql(&user_str)?,
          card_from_sql(&card_str)?,
          PunchKind::after(last),
          Utc::now(),
          tz,
        );
        tx.execute(
          "INSERT INTO attendance_events \
             (event_id, user_id, card_id, kind, occurred_at, local_date) \
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            encode_uuid(event.event_id),
            user_str,
            card_str,
            encode_kind(event.kind),
            encode_dt(event.occurred_at),
            encode_date(event.local_date),
          ],
        )?;

        let display_name: Option<String> = tx
          .query_row(
            "SELECT display_name FROM members WHERE user_id = ?1",
            rusqlite::params![user_str],
            |row| row.get(0),
          )
          .optional()?
          .flatten();

        tx.commit()?;
        Ok(PunchOutcome::Recorded { event, display_name })
      })
      .await?;

    match outcome {
      PunchOutcome::UnknownCard => {
        Err(tapin_core::Error::UnknownCard(card).into())
      }
      PunchOutcome::Recorded { event, display_name } => Ok(PunchRecorded {
        event,
        display_name: display_name
          .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_owned()),
      }),
    }
  }

  async fn force_toggle(&self, user_id: Uuid) -> Result<AttendanceEvent> {
    let tz = self.tz;
    let user_str = encode_uuid(user_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let card_str: Option<String> = tx
          .query_row(
            "SELECT card_id FROM card_bindings WHERE user_id = ?1",
            rusqlite::params![user_str],
            |row| row.get(0),
          )
          .optional()?;
        let Some(card_str) = card_str else {
          return Ok(ToggleOutcome::NoBinding);
        };

        let last: Option<String> = tx
          .query_row(
            &format!(
              "SELECT kind FROM attendance_events WHERE rowid = {}",
              latest_punch_rowid("?1")
            ),
            rusqlite::params![user_str],
            |row| row.get(0),
          )
          .optional()?;
        let last = last.as_deref().map(kind_from_sql).transpose()?;

        let event = AttendanceEvent::punch(
          uuid_from_sql(&user_str)?,
          card_from_sql(&card_str)?,
          PunchKind::after(last),
          Utc::now(),
          tz,
        );
        tx.execute(
          "INSERT INTO attendance_events \
             (event_id, user_id, card_id, kind, occurred_at, local_date) \
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            encode_uuid(event.event_id),
            user_str,
            card_str,
            encode_kind(event.kind),
            encode_dt(event.occurred_at),
            encode_date(event.local_date),
          ],
        )?;

        tx.commit()?;
        Ok(ToggleOutcome::Recorded(event))
      })
      .await?;

    match outcome {
      ToggleOutcome::NoBinding => {
        Err(tapin_core::Error::MemberNotBound(user_id).into())
      }
      ToggleOutcome::Recorded(event) => Ok(event),
    }
  }

  async fn force_logout_all(&self) -> Result<LogoutSweep> {
    let tz = self.tz;

    let raw = self
      .conn
      .call(move |conn| {
        let now = Utc::now();
        let at_str = encode_dt(now);
        let date_str = encode_date(tz.local_date(now));
        let entry_id = Uuid::new_v4();
        let entry_str = encode_uuid(entry_id);

        let swept: std::result::Result<u64, rusqlite::Error> = (|| {
          let tx =
            conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

          let open: Vec<(String, String)> = {
            let mut stmt = tx.prepare(&format!(
              "SELECT e.user_id, e.card_id FROM attendance_events e \
               WHERE e.kind = 'in' AND e.rowid = {}",
              latest_punch_rowid("e.user_id")
            ))?;
            stmt
              .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
              .collect::<rusqlite::Result<Vec<_>>>()?
          };

          {
            let mut insert = tx.prepare(
              "INSERT INTO attendance_events \
                 (event_id, user_id, card_id, kind, occurred_at, local_date) \
               VALUES (?1, ?2, ?3, 'out', ?4, ?5)",
            )?;
            for (user_id, card_id) in &open {
              insert.execute(rusqlite::params![
                encode_uuid(Uuid::new_v4()),
                user_id,
                card_id,
                at_str,
                date_str,
              ])?;
            }
          }

          let count = open.len() as u64;
          // The audit entry commits atomically with the punches it counts.
          tx.execute(
            "INSERT INTO logout_log \
               (entry_id, executed_at, affected_count, outcome) \
             VALUES (?1, ?2, ?3, 'success')",
            rusqlite::params![entry_str, at_str, count as i64],
          )?;
          tx.commit()?;
          Ok(count)
        })();

        match swept {
          Ok(count) => Ok(SweepRaw {
            entry_id,
            executed_at: now,
            affected: count,
            failed: None,
          }),
          Err(e) => {
            // The batch rolled back; record the failed invocation anyway.
            conn.execute(
              "INSERT INTO logout_log \
                 (entry_id, executed_at, affected_count, outcome) \
               VALUES (?1, ?2, 0, 'error')",
              rusqlite::params![entry_str, at_str],
            )?;
            Ok(SweepRaw {
              entry_id,
              executed_at: now,
              affected: 0,
              failed: Some(e.to_string()),
            })
          }
        }
      })
      .await?;

    let entry = LogoutLogEntry {
      entry_id:       raw.entry_id,
      executed_at:    raw.executed_at,
      affected_count: raw.affected,
      outcome:        if raw.failed.is_some() {
        LogoutOutcome::Error
      } else {
        LogoutOutcome::Success
      },
    };
    match raw.failed {
      Some(reason) => Err(Error::SweepFailed(reason)),
      None => Ok(LogoutSweep { affected: raw.affected, entry }),
    }
  }

  // ─── Ledger reads ──────────────────────────────────────────────────────

  async fn events_for(
    &self,
    user_id: Uuid,
    range: DateRange,
  ) -> Result<Vec<AttendanceEvent>> {
    let user_str = encode_uuid(user_id);
    let from_str = encode_date(range.start());
    let to_str = encode_date(range.end());

    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT event_id, user_id, card_id, kind, occurred_at, local_date \
           FROM attendance_events \
           WHERE user_id = ?1 AND local_date BETWEEN ?2 AND ?3 \
           ORDER BY occurred_at ASC, rowid ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_str, from_str, to_str], |row| {
            Ok(RawEvent {
              event_id:    row.get(0)?,
              user_id:     row.get(1)?,
              card_id:     row.get(2)?,
              kind:        row.get(3)?,
              occurred_at: row.get(4)?,
              local_date:  row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn sessions_for(
    &self,
    user_id: Uuid,
    range: DateRange,
  ) -> Result<Vec<Session>> {
    let events = self.events_for(user_id, range).await?;
    Ok(reconstruct(&events))
  }

  async fn presence_dates(
    &self,
    user_id: Uuid,
    range: DateRange,
  ) -> Result<Vec<NaiveDate>> {
    let user_str = encode_uuid(user_id);
    let from_str = encode_date(range.start());
    let to_str = encode_date(range.end());

    let dates: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT local_date FROM attendance_events \
           WHERE user_id = ?1 AND kind = 'in' \
             AND local_date BETWEEN ?2 AND ?3 \
           ORDER BY local_date ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_str, from_str, to_str], |row| {
            row.get(0)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    dates.iter().map(|s| decode_date(s)).collect()
  }

  // ─── Aggregation ───────────────────────────────────────────────────────

  async fn rollup(
    &self,
    range: DateRange,
    grouping: Grouping,
  ) -> Result<Vec<DailyRollup>> {
    let from_str = encode_date(range.start());
    let to_str = encode_date(range.end());

    let (presences, members, assignments) = self
      .conn
      .call(move |conn| {
        let presences: Vec<(String, String)> = {
          let mut stmt = conn.prepare(
            "SELECT DISTINCT user_id, local_date FROM attendance_events \
             WHERE kind = 'in' AND local_date BETWEEN ?1 AND ?2",
          )?;
          stmt
            .query_map(rusqlite::params![from_str, to_str], |row| {
              Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let members: Vec<RawMember> = {
          let mut stmt = conn.prepare(
            "SELECT user_id, display_name, generation, status FROM members",
          )?;
          stmt
            .query_map([], |row| {
              Ok(RawMember {
                user_id:      row.get(0)?,
                display_name: row.get(1)?,
                generation:   row.get(2)?,
                status:       row.get(3)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let assignments: Vec<(String, String)> = {
          let mut stmt = conn.prepare(
            "SELECT m.user_id, t.name FROM members m \
             JOIN teams t ON t.team_id = m.team_id",
          )?;
          stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok((presences, members, assignments))
      })
      .await?;

    let presences = presences
      .into_iter()
      .map(|(u, d)| Ok((decode_uuid(&u)?, decode_date(&d)?)))
      .collect::<Result<Vec<_>>>()?;
    let members = members
      .into_iter()
      .map(RawMember::into_member)
      .collect::<Result<Vec<_>>>()?;
    let assignments = assignments
      .into_iter()
      .map(|(u, name)| Ok((decode_uuid(&u)?, name)))
      .collect::<Result<Vec<_>>>()?;

    let roster = RosterSnapshot::new(members, assignments);
    Ok(daily_rollups(&presences, &roster, grouping))
  }

  async fn team_stats(
    &self,
    team_id: Uuid,
    window_days: u32,
  ) -> Result<TeamStats> {
    let today = self.tz.local_date(Utc::now());
    let window = DateRange::trailing(today, window_days.max(1));
    let team_str = encode_uuid(team_id);
    let from_str = encode_date(window.start());
    let to_str = encode_date(window.end());

    let raw = self
      .conn
      .call(move |conn| {
        let name: Option<String> = conn
          .query_row(
            "SELECT name FROM teams WHERE team_id = ?1",
            rusqlite::params![team_str],
            |row| row.get(0),
          )
          .optional()?;

        let member_count: i64 = conn.query_row(
          "SELECT COUNT(*) FROM members WHERE team_id = ?1 AND status != 2",
          rusqlite::params![team_str],
          |row| row.get(0),
        )?;

        let by_day: Vec<(String, i64)> = {
          let mut stmt = conn.prepare(
            "SELECT e.local_date, COUNT(DISTINCT e.user_id) \
             FROM attendance_events e \
             JOIN members m ON m.user_id = e.user_id \
             WHERE m.team_id = ?1 AND e.kind = 'in' \
               AND e.local_date BETWEEN ?2 AND ?3 \
             GROUP BY e.local_date",
          )?;
          stmt
            .query_map(
              rusqlite::params![team_str, from_str, to_str],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let active_days: Vec<String> = {
          let mut stmt = conn.prepare(
            "SELECT DISTINCT local_date FROM attendance_events \
             WHERE kind = 'in' AND local_date BETWEEN ?1 AND ?2",
          )?;
          stmt
            .query_map(rusqlite::params![from_str, to_str], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(TeamStatsRaw { name, member_count, by_day, active_days })
      })
      .await?;

    let Some(name) = raw.name else {
      return Err(tapin_core::Error::TeamNotFound(team_id).into());
    };

    let mut by_day = BTreeMap::new();
    for (date_str, count) in raw.by_day {
      by_day.insert(decode_date(&date_str)?, count.max(0) as u32);
    }
    let active = raw
      .active_days
      .iter()
      .map(|s| decode_date(s))
      .collect::<Result<BTreeSet<_>>>()?;

    let member_count = raw.member_count.max(0) as u32;
    let today_attendees = by_day.get(&today).copied().unwrap_or(0);

    Ok(TeamStats {
      team_id,
      name,
      member_count,
      today_attendees,
      today_rate: attendance_rate(today_attendees, member_count),
      average_rate: mean_team_rate(&by_day, &active, member_count),
    })
  }

  async fn overall_stats(&self, window_days: u32) -> Result<OverallStats> {
    let today = self.tz.local_date(Utc::now());
    let window = DateRange::trailing(today, window_days.max(1));
    let today_str = encode_date(today);
    let from_str = encode_date(window.start());
    let to_str = encode_date(window.end());

    let (today_attendees, member_count, active_days, raw_events) = self
      .conn
      .call(move |conn| {
        let today_attendees: i64 = conn.query_row(
          "SELECT COUNT(DISTINCT user_id) FROM attendance_events \
           WHERE kind = 'in' AND local_date = ?1",
          rusqlite::params![today_str],
          |row| row.get(0),
        )?;

        let member_count: i64 = conn.query_row(
          "SELECT COUNT(*) FROM members WHERE status != 2",
          [],
          |row| row.get(0),
        )?;

        let active_days: i64 = conn.query_row(
          "SELECT COUNT(DISTINCT local_date) FROM attendance_events \
           WHERE kind = 'in' AND local_date BETWEEN ?1 AND ?2",
          rusqlite::params![from_str, to_str],
          |row| row.get(0),
        )?;

        let events: Vec<RawEvent> = {
          let mut stmt = conn.prepare(
            "SELECT event_id, user_id, card_id, kind, occurred_at, \
                    local_date \
             FROM attendance_events \
             WHERE local_date BETWEEN ?1 AND ?2 \
             ORDER BY user_id ASC, occurred_at ASC, rowid ASC",
          )?;
          stmt
            .query_map(rusqlite::params![from_str, to_str], |row| {
              Ok(RawEvent {
                event_id:    row.get(0)?,
                user_id:     row.get(1)?,
                card_id:     row.get(2)?,
                kind:        row.get(3)?,
                occurred_at: row.get(4)?,
                local_date:  row.get(5)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok((today_attendees, member_count, active_days, events))
      })
      .await?;

    let events = raw_events
      .into_iter()
      .map(RawEvent::into_event)
      .collect::<Result<Vec<_>>>()?;

    // Events arrive sorted by user, then time; fold each user's slice.
    let mut total_secs = 0i64;
    let mut start = 0usize;
    for i in 1..=events.len() {
      if i == events.len() || events[i].user_id != events[start].user_id {
        total_secs += closed_seconds(&events[start..i]);
        start = i;
      }
    }

    Ok(OverallStats {
      today_attendees:      today_attendees.max(0) as u32,
      member_count:         member_count.max(0) as u32,
      active_days:          active_days.max(0) as u32,
      total_activity_hours: total_secs as f64 / 3600.0,
    })
  }

  // ─── Registration tokens ───────────────────────────────────────────────

  async fn issue_token(
    &self,
    card: CardId,
    ttl: Duration,
  ) -> Result<RegistrationToken> {
    let card_str = card.as_str().to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let bound: Option<String> = tx
          .query_row(
            "SELECT user_id FROM card_bindings WHERE card_id = ?1",
            rusqlite::params![card_str],
            |row| row.get(0),
          )
          .optional()?;
        if bound.is_some() {
          return Ok(IssueOutcome::AlreadyBound);
        }

        // A fresh token supersedes any live one for the same card.
        tx.execute(
          "DELETE FROM registration_tokens \
           WHERE card_id = ?1 AND used_at IS NULL",
          rusqlite::params![card_str],
        )?;

        let created = Utc::now();
        let token = RegistrationToken {
          token:       mint_token(),
          card_id:     card_from_sql(&card_str)?,
          created_at:  created,
          expires_at:  created + ttl,
          accessed_at: None,
          used_at:     None,
        };
        tx.execute(
          "INSERT INTO registration_tokens \
             (token, card_id, created_at, expires_at) \
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![
            token.token,
            card_str,
            encode_dt(token.created_at),
            encode_dt(token.expires_at),
          ],
        )?;

        tx.commit()?;
        Ok(IssueOutcome::Issued(token))
      })
      .await?;

    match outcome {
      IssueOutcome::AlreadyBound => {
        Err(tapin_core::Error::CardAlreadyBound(card).into())
      }
      IssueOutcome::Issued(token) => Ok(token),
    }
  }

  async fn peek_token(&self, token: String) -> Result<Option<RegistrationToken>> {
    let raw: Option<RawToken> = self
      .conn
      .call(move |conn| {
        // First access is stamped exactly once, before the read.
        conn.execute(
          "UPDATE registration_tokens SET accessed_at = ?2 \
           WHERE token = ?1 AND accessed_at IS NULL",
          rusqlite::params![token, encode_dt(Utc::now())],
        )?;

        let raw = conn
          .query_row(
            "SELECT token, card_id, created_at, expires_at, accessed_at, \
                    used_at \
             FROM registration_tokens WHERE token = ?1",
            rusqlite::params![token],
            |row| {
              Ok(RawToken {
                token:       row.get(0)?,
                card_id:     row.get(1)?,
                created_at:  row.get(2)?,
                expires_at:  row.get(3)?,
                accessed_at: row.get(4)?,
                used_at:     row.get(5)?,
              })
            },
          )
          .optional()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawToken::into_token).transpose()
  }

  async fn consume_token(
    &self,
    token: String,
    user_id: Uuid,
  ) -> Result<CardBinding> {
    let user_str = encode_uuid(user_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();

        let row: Option<(String, String, Option<String>)> = tx
          .query_row(
            "SELECT card_id, expires_at, used_at \
             FROM registration_tokens WHERE token = ?1",
            rusqlite::params![token],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
          )
          .optional()?;
        let Some((card_str, expires_str, used_at)) = row else {
          return Ok(ConsumeOutcome::NotFound);
        };
        if used_at.is_some() {
          return Ok(ConsumeOutcome::AlreadyUsed);
        }
        // Tokens stay valid through their expiry instant.
        if expires_str < encode_dt(now) {
          return Ok(ConsumeOutcome::Expired);
        }

        let holder: Option<String> = tx
          .query_row(
            "SELECT user_id FROM card_bindings WHERE card_id = ?1",
            rusqlite::params![card_str],
            |row| row.get(0),
          )
          .optional()?;
        if let Some(holder) = holder
          && holder != user_str
        {
          return Ok(ConsumeOutcome::BoundToOther(card_str));
        }

        let marked = tx.execute(
          "UPDATE registration_tokens SET used_at = ?2 \
           WHERE token = ?1 AND used_at IS NULL",
          rusqlite::params![token, encode_dt(now)],
        )?;
        if marked == 0 {
          return Ok(ConsumeOutcome::AlreadyUsed);
        }

        // OR REPLACE also displaces the member's previous card; the
        // different-holder case was rejected above in this transaction.
        let binding = CardBinding {
          card_id:  card_from_sql(&card_str)?,
          user_id:  uuid_from_sql(&user_str)?,
          bound_at: now,
        };
        tx.execute(
          "INSERT OR REPLACE INTO card_bindings (card_id, user_id, bound_at) \
           VALUES (?1, ?2, ?3)",
          rusqlite::params![card_str, user_str, encode_dt(now)],
        )?;

        tx.commit()?;
        Ok(ConsumeOutcome::Bound(binding))
      })
      .await?;

    match outcome {
      ConsumeOutcome::NotFound => Err(tapin_core::Error::TokenInvalid.into()),
      ConsumeOutcome::AlreadyUsed => Err(tapin_core::Error::TokenUsed.into()),
      ConsumeOutcome::Expired => Err(tapin_core::Error::TokenExpired.into()),
      ConsumeOutcome::BoundToOther(card_str) => {
        Err(tapin_core::Error::CardAlreadyBound(decode_card(&card_str)?).into())
      }
      ConsumeOutcome::Bound(binding) => Ok(binding),
    }
  }

  async fn list_tokens(&self) -> Result<Vec<RegistrationToken>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT token, card_id, created_at, expires_at, accessed_at, \
                  used_at \
           FROM registration_tokens \
           ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawToken {
              token:       row.get(0)?,
              card_id:     row.get(1)?,
              created_at:  row.get(2)?,
              expires_at:  row.get(3)?,
              accessed_at: row.get(4)?,
              used_at:     row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawToken::into_token).collect()
  }

  async fn delete_token(&self, token: String) -> Result<()> {
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM registration_tokens WHERE token = ?1",
          rusqlite::params![token],
        )?)
      })
      .await?;

    if deleted == 0 {
      return Err(tapin_core::Error::TokenInvalid.into());
    }
    Ok(())
  }

  // ─── Card bindings ─────────────────────────────────────────────────────

  async fn rebind_card(
    &self,
    user_id: Uuid,
    card: CardId,
  ) -> Result<CardBinding> {
    let user_str = encode_uuid(user_id);
    let card_str = card.as_str().to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let holder: Option<String> = tx
          .query_row(
            "SELECT user_id FROM card_bindings WHERE card_id = ?1",
            rusqlite::params![card_str],
            |row| row.get(0),
          )
          .optional()?;
        if let Some(holder) = holder
          && holder != user_str
        {
          return Ok(RebindOutcome::BoundToOther);
        }

        let binding = CardBinding {
          card_id:  card_from_sql(&card_str)?,
          user_id:  uuid_from_sql(&user_str)?,
          bound_at: Utc::now(),
        };
        tx.execute(
          "INSERT OR REPLACE INTO card_bindings (card_id, user_id, bound_at) \
           VALUES (?1, ?2, ?3)",
          rusqlite::params![card_str, user_str, encode_dt(binding.bound_at)],
        )?;

        tx.commit()?;
        Ok(RebindOutcome::Bound(binding))
      })
      .await?;

    match outcome {
      RebindOutcome::BoundToOther => {
        Err(tapin_core::Error::CardAlreadyBound(card).into())
      }
      RebindOutcome::Bound(binding) => Ok(binding),
    }
  }

  // ─── Directory ─────────────────────────────────────────────────────────

  async fn upsert_member(&self, member: NewMember) -> Result<Member> {
    let user_str = encode_uuid(member.user_id);
    let display_name = member.display_name.clone();
    let generation = i64::from(member.generation);
    let status = member.status.code();

    self
      .conn
      .call(move |conn| {
        // Team assignment is managed separately and survives the upsert.
        conn.execute(
          "INSERT INTO members (user_id, display_name, generation, status) \
           VALUES (?1, ?2, ?3, ?4) \
           ON CONFLICT(user_id) DO UPDATE SET \
             display_name = excluded.display_name, \
             generation   = excluded.generation, \
             status       = excluded.status",
          rusqlite::params![user_str, display_name, generation, status],
        )?;
        Ok(())
      })
      .await?;

    Ok(Member {
      user_id:      member.user_id,
      display_name: member.display_name,
      generation:   member.generation,
      status:       member.status,
    })
  }

  async fn members(&self) -> Result<Vec<MemberPresence>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT m.user_id, m.display_name, m.generation, m.status, \
                  t.team_id, t.name, b.card_id, le.kind, le.occurred_at \
           FROM members m \
           LEFT JOIN teams t ON t.team_id = m.team_id \
           LEFT JOIN card_bindings b ON b.user_id = m.user_id \
           LEFT JOIN attendance_events le ON le.rowid = {} \
           ORDER BY m.generation ASC, m.user_id ASC",
          latest_punch_rowid("m.user_id")
        ))?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawMemberPresence {
              user_id:      row.get(0)?,
              display_name: row.get(1)?,
              generation:   row.get(2)?,
              status:       row.get(3)?,
              team_id:      row.get(4)?,
              team_name:    row.get(5)?,
              card_id:      row.get(6)?,
              last_kind:    row.get(7)?,
              last_seen:    row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMemberPresence::into_presence).collect()
  }

  async fn add_team(&self, name: String) -> Result<Team> {
    let team = Team { team_id: Uuid::new_v4(), name };
    let team_str = encode_uuid(team.team_id);
    let name_cl = team.name.clone();

    let taken = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM teams WHERE name = ?1",
            rusqlite::params![name_cl],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if exists {
          return Ok(true);
        }

        tx.execute(
          "INSERT INTO teams (team_id, name, created_at) \
           VALUES (?1, ?2, ?3)",
          rusqlite::params![team_str, name_cl, encode_dt(Utc::now())],
        )?;
        tx.commit()?;
        Ok(false)
      })
      .await?;

    if taken {
      return Err(tapin_core::Error::TeamNameTaken(team.name).into());
    }
    Ok(team)
  }

  async fn rename_team(&self, team_id: Uuid, name: String) -> Result<Team> {
    let team_str = encode_uuid(team_id);
    let name_cl = name.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let taken = tx
          .query_row(
            "SELECT 1 FROM teams WHERE name = ?1 AND team_id != ?2",
            rusqlite::params![name_cl, team_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(RenameOutcome::NameTaken);
        }

        let updated = tx.execute(
          "UPDATE teams SET name = ?1 WHERE team_id = ?2",
          rusqlite::params![name_cl, team_str],
        )?;
        if updated == 0 {
          return Ok(RenameOutcome::Missing);
        }

        tx.commit()?;
        Ok(RenameOutcome::Renamed)
      })
      .await?;

    match outcome {
      RenameOutcome::Missing => {
        Err(tapin_core::Error::TeamNotFound(team_id).into())
      }
      RenameOutcome::NameTaken => {
        Err(tapin_core::Error::TeamNameTaken(name).into())
      }
      RenameOutcome::Renamed => Ok(Team { team_id, name }),
    }
  }

  async fn delete_team(&self, team_id: Uuid) -> Result<()> {
    let team_str = encode_uuid(team_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let members: i64 = tx.query_row(
          "SELECT COUNT(*) FROM members WHERE team_id = ?1",
          rusqlite::params![team_str],
          |row| row.get(0),
        )?;
        if members > 0 {
          return Ok(DeleteTeamOutcome::NotEmpty(members));
        }

        let deleted = tx.execute(
          "DELETE FROM teams WHERE team_id = ?1",
          rusqlite::params![team_str],
        )?;
        if deleted == 0 {
          return Ok(DeleteTeamOutcome::Missing);
        }

        tx.commit()?;
        Ok(DeleteTeamOutcome::Deleted)
      })
      .await?;

    match outcome {
      DeleteTeamOutcome::Missing => {
        Err(tapin_core::Error::TeamNotFound(team_id).into())
      }
      DeleteTeamOutcome::NotEmpty(n) => Err(
        tapin_core::Error::TeamNotEmpty {
          team_id,
          members: n.max(0) as u64,
        }
        .into(),
      ),
      DeleteTeamOutcome::Deleted => Ok(()),
    }
  }

  async fn assign_team(
    &self,
    user_id: Uuid,
    team_id: Option<Uuid>,
  ) -> Result<()> {
    let user_str = encode_uuid(user_id);
    let team = team_id.map(|id| (id, encode_uuid(id)));

    let outcome = self
      .conn
      .call(move |conn| {
        let tx =
          conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some((id, team_str)) = &team {
          let exists = tx
            .query_row(
              "SELECT 1 FROM teams WHERE team_id = ?1",
              rusqlite::params![team_str],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if !exists {
            return Ok(AssignOutcome::TeamMissing(*id));
          }
        }

        let updated = tx.execute(
          "UPDATE members SET team_id = ?1 WHERE user_id = ?2",
          rusqlite::params![team.as_ref().map(|(_, s)| s), user_str],
        )?;
        if updated == 0 {
          return Ok(AssignOutcome::MemberMissing);
        }

        tx.commit()?;
        Ok(AssignOutcome::Assigned)
      })
      .await?;

    match outcome {
      AssignOutcome::TeamMissing(id) => {
        Err(tapin_core::Error::TeamNotFound(id).into())
      }
      AssignOutcome::MemberMissing => {
        Err(tapin_core::Error::UnknownMember(user_id).into())
      }
      AssignOutcome::Assigned => Ok(()),
    }
  }

  async fn teams(&self) -> Result<Vec<TeamPresence>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT t.team_id, t.name, \
             (SELECT COUNT(*) FROM members m \
              JOIN attendance_events le ON le.rowid = {} \
              WHERE m.team_id = t.team_id AND le.kind = 'in') AS present, \
             (SELECT COUNT(*) FROM members m \
              WHERE m.team_id = t.team_id AND m.status != 2) AS total \
           FROM teams t \
           ORDER BY t.name ASC",
          latest_punch_rowid("m.user_id")
        ))?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawTeamPresence {
              team_id: row.get(0)?,
              name:    row.get(1)?,
              present: row.get(2)?,
              total:   row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTeamPresence::into_presence).collect()
  }

  // ─── Audit ─────────────────────────────────────────────────────────────

  async fn logout_log(&self, limit: u32) -> Result<Vec<LogoutLogEntry>> {
    let raws = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entry_id, executed_at, affected_count, outcome \
           FROM logout_log \
           ORDER BY executed_at DESC, rowid DESC \
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![i64::from(limit)], |row| {
            Ok(RawLogEntry {
              entry_id:       row.get(0)?,
              executed_at:    row.get(1)?,
              affected_count: row.get(2)?,
              outcome:        row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawLogEntry::into_entry).collect()
  }
}
