mod helpers;

use chrono::Utc;
use rapport::db;
use rapport::memory::types::{MemoryType, MessageSender};
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("new.db");

    assert!(!db_path.exists());

    let conn = db::open_database(&db_path).unwrap();

    assert!(db_path.exists());
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn pragmas_are_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("test.db")).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 5000);

    let journal: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(journal.to_lowercase(), "wal");

    let fk: i64 = conn
        .pragma_query_value(None, "foreign_keys", |row| row.get(0))
        .unwrap();
    assert_eq!(fk, 1);
}

#[test]
fn reopening_keeps_data() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("rapport.db");

    {
        let store = rapport::memory::store::SqliteStore::new(db::open_database(&path).unwrap());
        store.create_partner("user-1", "Aoi").unwrap();
    }

    let conn = db::open_database(&path).unwrap();
    let partners: i64 = conn
        .query_row("SELECT COUNT(*) FROM partners", [], |row| row.get(0))
        .unwrap();
    assert_eq!(partners, 1);
}

#[test]
fn health_check_counts_rows() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    store
        .create_message(&partner.id, MessageSender::User, "hello", None)
        .unwrap();
    helpers::insert_memory(&store, &partner.id, MemoryType::Fact, "Works as a nurse", 8.0, &[], Utc::now());

    let report = store
        .with_conn(|conn| Ok(db::check_database_health(conn)))
        .unwrap()
        .unwrap();

    assert!(report.integrity_ok);
    assert_eq!(report.schema_version, db::migrations::CURRENT_SCHEMA_VERSION);
    assert_eq!(report.partner_count, 1);
    assert_eq!(report.message_count, 1);
    assert_eq!(report.memory_count, 1);
    assert_eq!(report.unembedded_memory_count, 0);
    assert_eq!(report.episode_count, 0);
    assert_eq!(report.metrics_count, 0);
}

#[test]
fn deleting_partner_cascades() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    helpers::insert_memory(&store, &partner.id, MemoryType::Fact, "Works as a nurse", 8.0, &[], Utc::now());

    store
        .with_conn(|conn| {
            conn.execute("DELETE FROM partners WHERE id = ?1", [&partner.id])?;
            Ok(())
        })
        .unwrap();

    assert_eq!(helpers::count_rows(&store, "memories"), 0);
}

#[test]
fn out_of_range_levels_are_rejected_by_schema() {
    let (store, partner) = helpers::store_with_partner("Aoi");
    let result = store.with_conn(|conn| {
        conn.execute(
            "INSERT INTO memories (id, partner_id, type, content, importance, created_at)
             VALUES ('m1', ?1, 'fact', 'x', 11.0, '2025-01-01T00:00:00.000000Z')",
            [&partner.id],
        )?;
        Ok(())
    });
    assert!(result.is_err());
}
