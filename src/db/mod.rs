pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Open (or create) the rapport database at the given path with the schema
/// initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL for concurrent readers while an extraction writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open a fully migrated in-memory database. Used by tests and dry runs.
pub fn open_in_memory() -> Result<Connection> {
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Result of [`check_database_health`].
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub embedding_model: Option<String>,
    pub partner_count: i64,
    pub message_count: i64,
    pub memory_count: i64,
    /// Memories stored without a vector (embedding failed or disabled).
    pub unembedded_memory_count: i64,
    pub episode_count: i64,
    pub metrics_count: i64,
}

/// Run `PRAGMA integrity_check` and gather schema metadata and row counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity_details: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .context("integrity check failed to run")?;

    let count = |sql: &str| -> Result<i64> {
        conn.query_row(sql, [], |row| row.get(0))
            .with_context(|| format!("failed to run `{sql}`"))
    };

    Ok(HealthReport {
        integrity_ok: integrity_details == "ok",
        integrity_details,
        schema_version: migrations::get_schema_version(conn)?,
        embedding_model: migrations::get_embedding_model(conn)?,
        partner_count: count("SELECT COUNT(*) FROM partners")?,
        message_count: count("SELECT COUNT(*) FROM messages")?,
        memory_count: count("SELECT COUNT(*) FROM memories")?,
        unembedded_memory_count: count("SELECT COUNT(*) FROM memories WHERE length(vector) = 0")?,
        episode_count: count("SELECT COUNT(*) FROM episode_memories")?,
        metrics_count: count("SELECT COUNT(*) FROM relationship_metrics")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_check_on_fresh_database() {
        let conn = open_in_memory().unwrap();
        let report = check_database_health(&conn).unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.schema_version, migrations::CURRENT_SCHEMA_VERSION);
        assert_eq!(report.memory_count, 0);
        assert!(report.embedding_model.is_some());
    }
}
