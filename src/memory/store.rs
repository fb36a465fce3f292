//! SQLite persistence for memories.
//!
//! [`SqliteStore`] wraps one connection behind `Arc<Mutex<_>>` and implements
//! every collaborator trait ([`MemoryStore`] here, the others in their own
//! modules). All trait methods are synchronous; async callers go through
//! [`blocking`](super::blocking).

use std::sync::{Arc, Mutex};

use chrono::{SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::error::StoreError;
use super::types::{format_timestamp, parse_timestamp, Memory, MemoryType, NewMemory};
use super::{bytes_to_vector, vector_to_bytes};

/// Read/write access to persisted memories.
pub trait MemoryStore: Send + Sync {
    /// Normalize and persist a memory.
    ///
    /// Fails with [`StoreError::PartnerNotFound`] if the partner row is missing.
    fn insert_memory(&self, memory: NewMemory) -> Result<Memory, StoreError>;

    /// Memories with importance ≥ `min_importance`, newest first, ties by
    /// importance desc. At most `limit` rows.
    fn find_recent(
        &self,
        partner_id: &str,
        min_importance: f64,
        limit: usize,
    ) -> Result<Vec<Memory>, StoreError>;

    /// Memories of the given types with importance ≥ `min_importance`, most
    /// important first, ties newest first. At most `limit` rows.
    fn find_by_importance_and_type(
        &self,
        partner_id: &str,
        min_importance: f64,
        types: &[MemoryType],
        limit: usize,
    ) -> Result<Vec<Memory>, StoreError>;

    fn memory_stats(&self, partner_id: &str) -> Result<super::stats::MemoryStats, StoreError>;
}

/// The single SQLite-backed implementation of all store traits.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn from_shared(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// A store over a fresh, migrated in-memory database.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(crate::db::open_in_memory()?))
    }

    /// Run `f` with the locked connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut conn)
    }
}

pub(crate) fn partner_exists(conn: &Connection, partner_id: &str) -> Result<bool, StoreError> {
    Ok(conn
        .query_row("SELECT 1 FROM partners WHERE id = ?1", [partner_id], |_| Ok(()))
        .optional()?
        .is_some())
}

/// Decode a JSON string-list column.
pub(crate) fn json_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode a timestamp column. Unparsable values read as now.
pub(crate) fn timestamp_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<chrono::DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    Ok(parse_timestamp(&raw).unwrap_or_else(|| {
        tracing::debug!(value = %raw, "unparsable stored timestamp, using now");
        Utc::now()
    }))
}

const MEMORY_COLUMNS: &str =
    "id, partner_id, type, content, vector, importance, emotional_weight, tags, related_people, created_at";

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    let type_str: String = row.get(2)?;
    let memory_type = type_str.parse::<MemoryType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into())
    })?;
    let vector: Vec<u8> = row.get(4)?;

    Ok(Memory {
        id: row.get(0)?,
        partner_id: row.get(1)?,
        memory_type,
        content: row.get(3)?,
        vector: bytes_to_vector(&vector),
        importance: row.get(5)?,
        emotional_weight: row.get(6)?,
        tags: json_list(row, 7)?,
        related_people: json_list(row, 8)?,
        created_at: timestamp_column(row, 9)?,
    })
}

impl MemoryStore for SqliteStore {
    fn insert_memory(&self, memory: NewMemory) -> Result<Memory, StoreError> {
        let memory = memory.normalized();
        let record = Memory {
            id: uuid::Uuid::now_v7().to_string(),
            partner_id: memory.partner_id,
            memory_type: memory.memory_type,
            content: memory.content,
            vector: memory.vector,
            importance: memory.importance,
            emotional_weight: memory.emotional_weight,
            tags: memory.tags,
            related_people: memory.related_people,
            // stored at microsecond precision
            created_at: memory.created_at.unwrap_or_else(Utc::now).trunc_subsecs(6),
        };

        self.with_conn(|conn| {
            if !partner_exists(conn, &record.partner_id)? {
                return Err(StoreError::PartnerNotFound(record.partner_id.clone()));
            }
            conn.execute(
                &format!("INSERT INTO memories ({MEMORY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"),
                params![
                    record.id,
                    record.partner_id,
                    record.memory_type.as_str(),
                    record.content,
                    vector_to_bytes(&record.vector),
                    record.importance,
                    record.emotional_weight,
                    serde_json::to_string(&record.tags)?,
                    serde_json::to_string(&record.related_people)?,
                    format_timestamp(&record.created_at),
                ],
            )?;
            Ok(())
        })?;

        tracing::debug!(
            memory_id = %record.id,
            partner_id = %record.partner_id,
            memory_type = %record.memory_type,
            embedded = !record.vector.is_empty(),
            "memory stored"
        );
        Ok(record)
    }

    fn find_recent(
        &self,
        partner_id: &str,
        min_importance: f64,
        limit: usize,
    ) -> Result<Vec<Memory>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE partner_id = ?1 AND importance >= ?2
                 ORDER BY created_at DESC, importance DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt
                .query_map(params![partner_id, min_importance, limit as i64], memory_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn find_by_importance_and_type(
        &self,
        partner_id: &str,
        min_importance: f64,
        types: &[MemoryType],
        limit: usize,
    ) -> Result<Vec<Memory>, StoreError> {
        if types.is_empty() {
            return Ok(Vec::new());
        }

        // ?1 partner, ?2 importance, ?3 limit, then one placeholder per type
        let placeholders: Vec<String> = (0..types.len()).map(|i| format!("?{}", i + 4)).collect();
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories
             WHERE partner_id = ?1 AND importance >= ?2 AND type IN ({})
             ORDER BY importance DESC, created_at DESC
             LIMIT ?3",
            placeholders.join(", ")
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            partner_id.to_string().into(),
            min_importance.into(),
            (limit as i64).into(),
        ];
        values.extend(types.iter().map(|t| t.as_str().to_string().into()));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), memory_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn memory_stats(&self, partner_id: &str) -> Result<super::stats::MemoryStats, StoreError> {
        self.with_conn(|conn| super::stats::memory_stats(conn, partner_id))
    }
}
