use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

use super::error::StoreError;
use super::types::MemoryType;

/// Number of entries kept in the tag and participant rankings.
const TOP_N: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub total_memories: i64,
    /// Every memory type, zero-filled.
    pub by_type: BTreeMap<String, i64>,
    pub average_importance: f64,
    /// Memories stored with an empty vector.
    pub unembedded: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedValue {
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeStats {
    pub total_episodes: i64,
    pub average_emotional_weight: f64,
    /// Top tags by frequency, ties by tag ascending.
    pub most_common_tags: Vec<RankedValue>,
    pub frequent_participants: Vec<RankedValue>,
}

/// Aggregate counts over one partner's memories.
pub fn memory_stats(conn: &Connection, partner_id: &str) -> Result<MemoryStats, StoreError> {
    let (total, average, unembedded, oldest, newest): (i64, Option<f64>, i64, Option<String>, Option<String>) =
        conn.query_row(
            "SELECT COUNT(*), AVG(importance), COALESCE(SUM(length(vector) = 0), 0),
                    MIN(created_at), MAX(created_at)
             FROM memories WHERE partner_id = ?1",
            params![partner_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

    let mut by_type: BTreeMap<String, i64> = MemoryType::ALL
        .iter()
        .map(|t| (t.as_str().to_string(), 0))
        .collect();

    let mut stmt =
        conn.prepare("SELECT type, COUNT(*) FROM memories WHERE partner_id = ?1 GROUP BY type")?;
    let rows = stmt
        .query_map(params![partner_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    for (t, count) in rows {
        by_type.insert(t, count);
    }

    Ok(MemoryStats {
        total_memories: total,
        by_type,
        average_importance: average.unwrap_or(0.0),
        unembedded,
        oldest_memory: oldest,
        newest_memory: newest,
    })
}

/// Aggregate counts over one partner's episodes.
pub fn episode_stats(conn: &Connection, partner_id: &str) -> Result<EpisodeStats, StoreError> {
    let (total, average): (i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*), AVG(emotional_weight) FROM episode_memories WHERE partner_id = ?1",
        params![partner_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(EpisodeStats {
        total_episodes: total,
        average_emotional_weight: average.unwrap_or(0.0),
        most_common_tags: rank_json_column(conn, partner_id, "tags")?,
        frequent_participants: rank_json_column(conn, partner_id, "participants")?,
    })
}

/// Rank the values of a JSON list column across a partner's episodes.
fn rank_json_column(
    conn: &Connection,
    partner_id: &str,
    column: &str,
) -> Result<Vec<RankedValue>, StoreError> {
    let sql = format!(
        "SELECT j.value, COUNT(*) AS n
         FROM episode_memories e, json_each(e.{column}) j
         WHERE e.partner_id = ?1
         GROUP BY j.value
         ORDER BY n DESC, j.value ASC
         LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![partner_id, TOP_N], |row| {
            Ok(RankedValue {
                value: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
