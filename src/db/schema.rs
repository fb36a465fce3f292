//! SQL DDL for all rapport tables.
//!
//! Defines `partners` and `messages` (the collaborator rows), `memories`,
//! `episode_memories`, `relationship_metrics` and `schema_meta`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Collaborator rows: companions and their chat turns
CREATE TABLE IF NOT EXISTS partners (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_partners_user ON partners(user_id);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    partner_id TEXT NOT NULL REFERENCES partners(id) ON DELETE CASCADE,
    sender TEXT NOT NULL CHECK(sender IN ('user','partner')),
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_partner ON messages(partner_id, created_at);

-- Extracted memories. vector is a little-endian f32 BLOB, empty when embedding failed.
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    partner_id TEXT NOT NULL REFERENCES partners(id) ON DELETE CASCADE,
    type TEXT NOT NULL CHECK(type IN ('conversation','fact','emotion','event','relationship','preference')),
    content TEXT NOT NULL CHECK(length(content) > 0),
    vector BLOB NOT NULL DEFAULT x'',
    importance REAL NOT NULL CHECK(importance >= 0.0 AND importance <= 10.0),
    emotional_weight REAL NOT NULL DEFAULT 0.0 CHECK(emotional_weight >= -10.0 AND emotional_weight <= 10.0),
    tags TEXT NOT NULL DEFAULT '[]',
    related_people TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_partner_created ON memories(partner_id, created_at);
CREATE INDEX IF NOT EXISTS idx_memories_partner_importance ON memories(partner_id, importance);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(type);

CREATE TABLE IF NOT EXISTS episode_memories (
    id TEXT PRIMARY KEY,
    partner_id TEXT NOT NULL REFERENCES partners(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    emotional_weight REAL NOT NULL CHECK(emotional_weight >= 0.0 AND emotional_weight <= 10.0),
    tags TEXT NOT NULL DEFAULT '[]',
    participants TEXT NOT NULL DEFAULT '[]',
    date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_episodes_partner_date ON episode_memories(partner_id, date);

-- One row per partner, created lazily
CREATE TABLE IF NOT EXISTS relationship_metrics (
    partner_id TEXT PRIMARY KEY REFERENCES partners(id) ON DELETE CASCADE,
    intimacy_level REAL NOT NULL DEFAULT 0.0 CHECK(intimacy_level >= 0.0 AND intimacy_level <= 100.0),
    trust_level REAL CHECK(trust_level IS NULL OR (trust_level >= 0.0 AND trust_level <= 100.0)),
    emotional_connection REAL CHECK(emotional_connection IS NULL OR (emotional_connection >= 0.0 AND emotional_connection <= 100.0)),
    conversation_frequency INTEGER NOT NULL DEFAULT 0,
    shared_memories INTEGER NOT NULL DEFAULT 0,
    last_interaction TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
