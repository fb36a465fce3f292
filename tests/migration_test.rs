use rapport::db;
use rapport::db::migrations::{
    get_embedding_model, get_schema_version, run_migrations, set_embedding_model,
    CURRENT_SCHEMA_VERSION, DEFAULT_EMBEDDING_MODEL,
};
use rusqlite::Connection;

fn v1_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    conn
}

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = db::open_in_memory().unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn migration_adds_embedding_model_key() {
    let conn = db::open_in_memory().unwrap();
    assert_eq!(
        get_embedding_model(&conn).unwrap(),
        Some(DEFAULT_EMBEDDING_MODEL.to_string())
    );
}

#[test]
fn migrations_are_idempotent() {
    let mut conn = db::open_in_memory().unwrap();
    run_migrations(&mut conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn manual_v1_db_upgrades_correctly() {
    let mut conn = v1_db();

    assert_eq!(get_schema_version(&conn).unwrap(), 1);
    assert!(get_embedding_model(&conn).unwrap().is_none());

    run_migrations(&mut conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert!(get_embedding_model(&conn).unwrap().is_some());
}

#[test]
fn stored_model_survives_migration() {
    let mut conn = v1_db();
    set_embedding_model(&conn, "all-MiniLM-L6-v2").unwrap();

    run_migrations(&mut conn).unwrap();

    assert_eq!(
        get_embedding_model(&conn).unwrap(),
        Some("all-MiniLM-L6-v2".to_string())
    );
}

#[test]
fn schema_init_is_idempotent() {
    let conn = v1_db();
    db::schema::init_schema(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 1);
}
