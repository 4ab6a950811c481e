//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Splits & registry
-- ============================================================

CREATE TABLE IF NOT EXISTS splits (
    split_id BLOB PRIMARY KEY,
    owner BLOB NOT NULL,
    allowance_mode INTEGER NOT NULL DEFAULT 0,
    creator_nonce INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS split_recipients (
    split_id BLOB NOT NULL REFERENCES splits(split_id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    account BLOB NOT NULL,
    weight INTEGER NOT NULL CHECK (weight BETWEEN 0 AND 100),
    PRIMARY KEY (split_id, position)
);

CREATE TABLE IF NOT EXISTS creator_nonces (
    creator BLOB PRIMARY KEY,
    next_nonce INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS agreements (
    split_id BLOB PRIMARY KEY REFERENCES splits(split_id) ON DELETE CASCADE,
    reference_id TEXT NOT NULL
);

-- ============================================================
-- Custody
-- ============================================================

CREATE TABLE IF NOT EXISTS balances (
    split_id BLOB NOT NULL REFERENCES splits(split_id) ON DELETE CASCADE,
    token BLOB NOT NULL,
    balance INTEGER NOT NULL CHECK (balance >= 0),
    reserved INTEGER NOT NULL DEFAULT 0 CHECK (reserved >= 0),
    PRIMARY KEY (split_id, token),
    CHECK (reserved <= balance)
);

CREATE TABLE IF NOT EXISTS reservations (
    handle BLOB PRIMARY KEY,
    split_id BLOB NOT NULL REFERENCES splits(split_id) ON DELETE CASCADE,
    token BLOB NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    state TEXT NOT NULL DEFAULT 'active'
);

CREATE INDEX IF NOT EXISTS idx_reservations_split ON reservations(split_id);

-- ============================================================
-- Notifications
-- ============================================================

CREATE TABLE IF NOT EXISTS event_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type TEXT NOT NULL,
    split_id BLOB NOT NULL,
    payload TEXT NOT NULL,
    recorded_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_event_log_split ON event_log(split_id);
"#;
