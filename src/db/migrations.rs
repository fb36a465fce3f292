//! Forward-only migrations keyed off `schema_meta.schema_version`.

use rusqlite::{Connection, OptionalExtension, Transaction};

/// Version a database reaches after [`run_migrations`].
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Model assumed for vectors written before the model was recorded.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

struct Migration {
    to: u32,
    name: &'static str,
    apply: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

const MIGRATIONS: &[Migration] = &[Migration {
    to: 2,
    name: "record embedding model",
    apply: record_embedding_model,
}];

fn read_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM schema_meta WHERE key = ?1", [key], |row| row.get(0))
        .optional()
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

/// Stored schema version; a missing or garbled value reads as 0.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    Ok(read_meta(conn, "schema_version")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// Model that produced the stored memory vectors, if recorded.
pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    read_meta(conn, "embedding_model")
}

pub fn set_embedding_model(conn: &Connection, model: &str) -> rusqlite::Result<()> {
    write_meta(conn, "embedding_model", model)
}

/// Apply every migration above the stored version, one transaction each.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let current = get_schema_version(conn)?;
    let pending = MIGRATIONS.iter().filter(|m| m.to > current);

    for migration in pending {
        tracing::info!(to = migration.to, name = migration.name, "applying migration");
        let tx = conn.transaction()?;
        (migration.apply)(&tx)?;
        write_meta(&tx, "schema_version", &migration.to.to_string())?;
        tx.commit()?;
    }

    tracing::debug!(version = get_schema_version(conn)?, "schema up to date");
    Ok(())
}

/// Databases from before the key existed were written by the default
/// provider. An already recorded model is left alone.
fn record_embedding_model(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('embedding_model', ?1)",
        [DEFAULT_EMBEDDING_MODEL],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn migration_table_ends_at_current_version() {
        assert_eq!(MIGRATIONS.last().map(|m| m.to), Some(CURRENT_SCHEMA_VERSION));
        assert!(MIGRATIONS.windows(2).all(|w| w[0].to < w[1].to));
    }

    #[test]
    fn garbled_version_reads_as_zero() {
        let conn = v1_conn();
        write_meta(&conn, "schema_version", "two").unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);
    }

    #[test]
    fn upgrade_records_default_model_once() {
        let mut conn = v1_conn();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);

        run_migrations(&mut conn).unwrap();
        set_embedding_model(&conn, "all-MiniLM-L6-v2").unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(get_embedding_model(&conn).unwrap().as_deref(), Some("all-MiniLM-L6-v2"));
    }
}
