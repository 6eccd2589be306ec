//! SQL schema for the Gatehouse SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS parties (
    party_id    TEXT PRIMARY KEY,
    role        TEXT NOT NULL,   -- 'resident' | 'guard' | 'admin'
    name        TEXT NOT NULL,
    document_id TEXT,
    unit        TEXT,
    active      INTEGER NOT NULL DEFAULT 1,
    created_at  TEXT NOT NULL    -- ISO 8601 UTC; server-assigned
);

CREATE TABLE IF NOT EXISTS visitors (
    visitor_id     TEXT PRIMARY KEY,
    resident_id    TEXT NOT NULL REFERENCES parties(party_id),
    name           TEXT NOT NULL,
    document_id    TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'pending',
    visit_purpose  TEXT,
    scheduled_date TEXT NOT NULL,
    check_in_time  TEXT,
    check_out_time TEXT,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS invitations (
    invitation_id       TEXT PRIMARY KEY,
    resident_id         TEXT NOT NULL REFERENCES parties(party_id),
    visitor_name        TEXT NOT NULL,
    visitor_document    TEXT NOT NULL,
    scheduled_date      TEXT NOT NULL,
    expiration_date     TEXT NOT NULL,
    status              TEXT NOT NULL DEFAULT 'pending',
    qr_signature        TEXT,            -- hex HMAC; written at approval
    qr_issued_at_ms     INTEGER,         -- ms since epoch; written at approval
    vehicle_json        TEXT,            -- JSON vehicle details or NULL
    notes               TEXT,
    check_in_time       TEXT,
    check_out_time      TEXT,
    rejection_reason    TEXT,
    cancellation_reason TEXT,
    visitor_id          TEXT REFERENCES visitors(visitor_id),
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS frequent_visitors (
    frequent_visitor_id TEXT PRIMARY KEY,
    resident_id         TEXT NOT NULL REFERENCES parties(party_id),
    name                TEXT NOT NULL,
    document_id         TEXT NOT NULL,
    vehicle_json        TEXT,
    notes               TEXT,
    visit_count         INTEGER NOT NULL DEFAULT 0,
    last_visit          TEXT,
    active              INTEGER NOT NULL DEFAULT 1,
    created_at          TEXT NOT NULL
);

-- The ledger is append-only. The only UPDATE ever issued against this
-- table closes an open entry by writing its departure_time.
--
-- invitation_id references a row this store created, so it carries a
-- real constraint. visitor_id is validated in-transaction on arrival but
-- stays a plain column: an unmatched departure is journaled even when the
-- subject was never registered here. resident_id, guard_id and vehicle_id
-- may name subjects registered elsewhere (a signed pass is valid on its
-- own), so they stay plain lookup columns too.
CREATE TABLE IF NOT EXISTS entry_logs (
    entry_id       TEXT PRIMARY KEY,
    method         TEXT NOT NULL,   -- 'qr' | 'facial' | 'lpr' | 'manual'
    visitor_id     TEXT,
    resident_id    TEXT,
    vehicle_id     TEXT,
    invitation_id  TEXT REFERENCES invitations(invitation_id) ON DELETE SET NULL,
    guard_id       TEXT,
    arrival_time   TEXT NOT NULL,
    departure_time TEXT,
    payload        TEXT,            -- raw upstream event, JSON
    metadata       TEXT,            -- operational context, JSON
    CHECK (departure_time IS NULL OR departure_time >= arrival_time)
);

CREATE INDEX IF NOT EXISTS invitations_resident_idx ON invitations(resident_id);
CREATE INDEX IF NOT EXISTS invitations_status_idx   ON invitations(status);
CREATE INDEX IF NOT EXISTS visitors_resident_idx    ON visitors(resident_id);
CREATE INDEX IF NOT EXISTS visitors_status_idx      ON visitors(status);
CREATE INDEX IF NOT EXISTS frequent_resident_idx    ON frequent_visitors(resident_id);
CREATE INDEX IF NOT EXISTS entry_logs_arrival_idx   ON entry_logs(arrival_time);
CREATE INDEX IF NOT EXISTS entry_logs_method_idx    ON entry_logs(method);
CREATE INDEX IF NOT EXISTS entry_logs_open_idx      ON entry_logs(visitor_id)
    WHERE departure_time IS NULL;

PRAGMA user_version = 1;
";
