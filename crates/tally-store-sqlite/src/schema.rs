//! SQL schema for the tally SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per record, overwritten after every settled batch.
-- record_json is the source of truth; the other columns are denormalised
-- for inspection with the sqlite3 shell.
CREATE TABLE IF NOT EXISTS records (
    record_id        TEXT PRIMARY KEY,
    item_label       TEXT NOT NULL,
    owner_label      TEXT NOT NULL,
    overall_status   TEXT NOT NULL,   -- 'pending' | 'active' | 'completed' | 'failed'
    created_at       TEXT NOT NULL,   -- ISO 8601 UTC
    last_updated_at  TEXT NOT NULL,   -- ISO 8601 UTC
    record_json      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS records_status_idx  ON records(overall_status);
CREATE INDEX IF NOT EXISTS records_updated_idx ON records(last_updated_at);

PRAGMA user_version = 1;
";
