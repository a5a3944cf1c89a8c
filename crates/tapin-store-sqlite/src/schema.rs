//! SQL schema for the tapin SQLite store.
//!
//! Applied at every connection startup; the DDL is idempotent. Future
//! migrations will be gated on `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS teams (
    team_id    TEXT PRIMARY KEY,
    name       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- Directory snapshot synced from the identity system. No event or binding
-- references it: punches must outlive directory churn.
CREATE TABLE IF NOT EXISTS members (
    user_id      TEXT PRIMARY KEY,
    display_name TEXT,
    generation   INTEGER NOT NULL,
    status       INTEGER NOT NULL DEFAULT 1,  -- 0 junior high | 1 high school | 2 alumni
    team_id      TEXT REFERENCES teams(team_id)
);

-- Punches are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS attendance_events (
    event_id    TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    card_id     TEXT NOT NULL,
    kind        TEXT NOT NULL,   -- 'in' | 'out'
    occurred_at TEXT NOT NULL,   -- RFC 3339 UTC; server-assigned
    local_date  TEXT NOT NULL    -- club-wall-clock day of occurred_at
);

-- One card per member, one member per card.
CREATE TABLE IF NOT EXISTS card_bindings (
    card_id  TEXT PRIMARY KEY,
    user_id  TEXT NOT NULL UNIQUE,
    bound_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS registration_tokens (
    token       TEXT PRIMARY KEY,
    card_id     TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    accessed_at TEXT,            -- set on the first page read, never again
    used_at     TEXT             -- set exactly once by consumption
);

-- One row per bulk-logout invocation, zero-work sweeps included.
CREATE TABLE IF NOT EXISTS logout_log (
    entry_id       TEXT PRIMARY KEY,
    executed_at    TEXT NOT NULL,
    affected_count INTEGER NOT NULL,
    outcome        TEXT NOT NULL    -- 'success' | 'error'
);

CREATE INDEX IF NOT EXISTS events_user_time_idx ON attendance_events(user_id, occurred_at);
CREATE INDEX IF NOT EXISTS events_user_date_idx ON attendance_events(user_id, local_date);
CREATE INDEX IF NOT EXISTS events_kind_date_idx ON attendance_events(kind, local_date);
CREATE INDEX IF NOT EXISTS tokens_card_idx      ON registration_tokens(card_id);

PRAGMA user_version = 1;
";
