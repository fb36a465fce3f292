//! Episodic memory persistence and filtered reads.

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, params_from_iter, Row};

use super::error::StoreError;
use super::stats::EpisodeStats;
use super::store::{json_list, partner_exists, timestamp_column, SqliteStore};
use super::types::{format_timestamp, EpisodeMemory, NewEpisode};

/// Filters for [`EpisodeStore::find_episodes`]. All given filters must hold.
#[derive(Debug, Clone, Default)]
pub struct EpisodeQuery {
    /// Defaults to 20.
    pub limit: Option<usize>,
    pub min_emotional_weight: Option<f64>,
    /// Matches episodes sharing at least one tag. Empty means no tag filter.
    pub tags: Option<Vec<String>>,
    /// Inclusive.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive.
    pub end_date: Option<DateTime<Utc>>,
}

pub const DEFAULT_EPISODE_LIMIT: usize = 20;

impl EpisodeQuery {
    fn tag_filter(&self) -> Option<&[String]> {
        self.tags.as_deref().filter(|t| !t.is_empty())
    }

    /// Weight-ranked when a weight or tag filter is present, date-ranked otherwise.
    fn ranks_by_weight(&self) -> bool {
        self.min_emotional_weight.is_some() || self.tag_filter().is_some()
    }
}

pub trait EpisodeStore: Send + Sync {
    /// Normalize and persist an episode.
    ///
    /// Fails with [`StoreError::PartnerNotFound`] if the partner row is missing.
    fn insert_episode(&self, episode: NewEpisode) -> Result<EpisodeMemory, StoreError>;

    fn find_episodes(
        &self,
        partner_id: &str,
        query: &EpisodeQuery,
    ) -> Result<Vec<EpisodeMemory>, StoreError>;

    fn episode_stats(&self, partner_id: &str) -> Result<EpisodeStats, StoreError>;
}

const EPISODE_COLUMNS: &str = "id, partner_id, title, description, emotional_weight, tags, participants, date";

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<EpisodeMemory> {
    Ok(EpisodeMemory {
        id: row.get(0)?,
        partner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        emotional_weight: row.get(4)?,
        tags: json_list(row, 5)?,
        participants: json_list(row, 6)?,
        date: timestamp_column(row, 7)?,
    })
}

impl EpisodeStore for SqliteStore {
    fn insert_episode(&self, episode: NewEpisode) -> Result<EpisodeMemory, StoreError> {
        let episode = episode.normalized();
        let record = EpisodeMemory {
            id: uuid::Uuid::now_v7().to_string(),
            partner_id: episode.partner_id,
            title: episode.title,
            description: episode.description,
            emotional_weight: episode.emotional_weight,
            tags: episode.tags,
            participants: episode.participants,
            date: episode.date.unwrap_or_else(Utc::now).trunc_subsecs(6),
        };

        self.with_conn(|conn| {
            if !partner_exists(conn, &record.partner_id)? {
                return Err(StoreError::PartnerNotFound(record.partner_id.clone()));
            }
            conn.execute(
                &format!("INSERT INTO episode_memories ({EPISODE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    record.id,
                    record.partner_id,
                    record.title,
                    record.description,
                    record.emotional_weight,
                    serde_json::to_string(&record.tags)?,
                    serde_json::to_string(&record.participants)?,
                    format_timestamp(&record.date),
                ],
            )?;
            Ok(())
        })?;

        tracing::debug!(episode_id = %record.id, partner_id = %record.partner_id, "episode stored");
        Ok(record)
    }

    fn find_episodes(
        &self,
        partner_id: &str,
        query: &EpisodeQuery,
    ) -> Result<Vec<EpisodeMemory>, StoreError> {
        let mut clauses = vec!["partner_id = ?".to_string()];
        let mut values: Vec<rusqlite::types::Value> = vec![partner_id.to_string().into()];

        if let Some(min) = query.min_emotional_weight {
            clauses.push("emotional_weight >= ?".into());
            values.push(min.into());
        }
        if let Some(start) = query.start_date {
            clauses.push("date >= ?".into());
            values.push(format_timestamp(&start).into());
        }
        if let Some(end) = query.end_date {
            clauses.push("date <= ?".into());
            values.push(format_timestamp(&end).into());
        }
        if let Some(tags) = query.tag_filter() {
            let marks = vec!["?"; tags.len()].join(", ");
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM json_each(episode_memories.tags) j WHERE j.value IN ({marks}))"
            ));
            values.extend(tags.iter().map(|t| t.clone().into()));
        }

        let order = if query.ranks_by_weight() {
            "emotional_weight DESC, date DESC"
        } else {
            "date DESC, emotional_weight DESC"
        };
        let limit = query.limit.unwrap_or(DEFAULT_EPISODE_LIMIT);
        values.push((limit as i64).into());

        let sql = format!(
            "SELECT {EPISODE_COLUMNS} FROM episode_memories WHERE {} ORDER BY {order} LIMIT ?",
            clauses.join(" AND ")
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), episode_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn episode_stats(&self, partner_id: &str) -> Result<EpisodeStats, StoreError> {
        self.with_conn(|conn| super::stats::episode_stats(conn, partner_id))
    }
}
