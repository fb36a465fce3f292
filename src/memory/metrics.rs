//! Relationship metrics: the per-partner counter row and the aggregator that
//! turns it into a stage, insights and recommendations.
//!
//! Reads are soft-fail. A partner with no metrics row gets one created on
//! first read; a partner that does not exist at all still yields a successful
//! default report so display surfaces never see an error for missing data.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::directory::PartnerDirectory;
use super::error::{MemoryError, StoreError};
use super::store::{partner_exists, timestamp_column, SqliteStore};
use super::types::{clamp_level, format_timestamp, RelationshipMetrics, RelationshipStage};
use super::blocking;

/// Relative changes applied by [`MetricsStore::adjust_levels`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelAdjustment {
    pub intimacy_delta: f64,
    pub trust_delta: f64,
    pub connection_delta: f64,
    pub increment_frequency: bool,
    pub increment_memories: bool,
}

pub trait MetricsStore: Send + Sync {
    /// The metrics row, if one exists.
    fn find_metrics(&self, partner_id: &str) -> Result<Option<RelationshipMetrics>, StoreError>;

    /// Create the row with defaults if absent, then return it. Idempotent.
    ///
    /// Fails with [`StoreError::PartnerNotFound`] if the partner row is missing.
    fn get_or_create(&self, partner_id: &str) -> Result<RelationshipMetrics, StoreError>;

    /// `shared_memories += 1` and `last_interaction = now`, creating the row if needed.
    fn increment_shared_memories(&self, partner_id: &str) -> Result<(), StoreError>;

    /// `conversation_frequency += 1` and `last_interaction = now`.
    fn record_interaction(&self, partner_id: &str) -> Result<RelationshipMetrics, StoreError>;

    /// Apply deltas, clamping every level to `[0, 100]`. A null trust or
    /// connection level starts from 0 when its delta is non-zero.
    fn adjust_levels(
        &self,
        partner_id: &str,
        adjustment: &LevelAdjustment,
    ) -> Result<RelationshipMetrics, StoreError>;
}

const METRICS_COLUMNS: &str = "partner_id, intimacy_level, trust_level, emotional_connection, \
     conversation_frequency, shared_memories, last_interaction";

fn metrics_from_row(row: &Row<'_>) -> rusqlite::Result<RelationshipMetrics> {
    Ok(RelationshipMetrics {
        partner_id: row.get(0)?,
        intimacy_level: row.get(1)?,
        trust_level: row.get(2)?,
        emotional_connection: row.get(3)?,
        conversation_frequency: row.get(4)?,
        shared_memories: row.get(5)?,
        last_interaction: timestamp_column(row, 6)?,
    })
}

fn select_metrics(conn: &Connection, partner_id: &str) -> Result<Option<RelationshipMetrics>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {METRICS_COLUMNS} FROM relationship_metrics WHERE partner_id = ?1"),
            [partner_id],
            metrics_from_row,
        )
        .optional()?)
}

fn ensure_row(conn: &Connection, partner_id: &str) -> Result<(), StoreError> {
    if !partner_exists(conn, partner_id)? {
        return Err(StoreError::PartnerNotFound(partner_id.to_string()));
    }
    let now = format_timestamp(&Utc::now());
    conn.execute(
        "INSERT OR IGNORE INTO relationship_metrics (partner_id, intimacy_level, last_interaction, updated_at)
         VALUES (?1, 0.0, ?2, ?2)",
        params![partner_id, now],
    )?;
    Ok(())
}

fn read_back(conn: &Connection, partner_id: &str) -> Result<RelationshipMetrics, StoreError> {
    select_metrics(conn, partner_id)?.ok_or_else(|| StoreError::PartnerNotFound(partner_id.to_string()))
}

/// Apply a delta to a nullable level. Null stays null unless the delta is non-zero.
fn shift_optional(level: Option<f64>, delta: f64) -> Option<f64> {
    match (level, delta) {
        (None, d) if d == 0.0 => None,
        (current, d) => Some(clamp_level(current.unwrap_or(0.0) + d, 0.0, 100.0)),
    }
}

impl MetricsStore for SqliteStore {
    fn find_metrics(&self, partner_id: &str) -> Result<Option<RelationshipMetrics>, StoreError> {
        self.with_conn(|conn| select_metrics(conn, partner_id))
    }

    fn get_or_create(&self, partner_id: &str) -> Result<RelationshipMetrics, StoreError> {
        self.with_conn(|conn| {
            ensure_row(conn, partner_id)?;
            read_back(conn, partner_id)
        })
    }

    fn increment_shared_memories(&self, partner_id: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            ensure_row(conn, partner_id)?;
            let now = format_timestamp(&Utc::now());
            conn.execute(
                "UPDATE relationship_metrics
                 SET shared_memories = shared_memories + 1, last_interaction = ?2, updated_at = ?2
                 WHERE partner_id = ?1",
                params![partner_id, now],
            )?;
            Ok(())
        })
    }

    fn record_interaction(&self, partner_id: &str) -> Result<RelationshipMetrics, StoreError> {
        self.with_conn(|conn| {
            ensure_row(conn, partner_id)?;
            let now = format_timestamp(&Utc::now());
            conn.execute(
                "UPDATE relationship_metrics
                 SET conversation_frequency = conversation_frequency + 1, last_interaction = ?2, updated_at = ?2
                 WHERE partner_id = ?1",
                params![partner_id, now],
            )?;
            read_back(conn, partner_id)
        })
    }

    fn adjust_levels(
        &self,
        partner_id: &str,
        adjustment: &LevelAdjustment,
    ) -> Result<RelationshipMetrics, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            ensure_row(&tx, partner_id)?;
            let current = read_back(&tx, partner_id)?;

            let intimacy = clamp_level(current.intimacy_level + adjustment.intimacy_delta, 0.0, 100.0);
            let trust = shift_optional(current.trust_level, adjustment.trust_delta);
            let connection = shift_optional(current.emotional_connection, adjustment.connection_delta);
            let now = format_timestamp(&Utc::now());

            tx.execute(
                "UPDATE relationship_metrics
                 SET intimacy_level = ?2, trust_level = ?3, emotional_connection = ?4,
                     conversation_frequency = conversation_frequency + ?5,
                     shared_memories = shared_memories + ?6,
                     last_interaction = ?7, updated_at = ?7
                 WHERE partner_id = ?1",
                params![
                    partner_id,
                    intimacy,
                    trust,
                    connection,
                    adjustment.increment_frequency as i64,
                    adjustment.increment_memories as i64,
                    now
                ],
            )?;
            let updated = read_back(&tx, partner_id)?;
            tx.commit()?;
            Ok(updated)
        })
    }
}

/// Map an intimacy level to its stage.
pub fn derive_stage(metrics: &RelationshipMetrics) -> RelationshipStage {
    match metrics.intimacy_level {
        l if l < 20.0 => RelationshipStage::Stranger,
        l if l < 40.0 => RelationshipStage::Acquaintance,
        l if l < 60.0 => RelationshipStage::Friend,
        l if l < 80.0 => RelationshipStage::CloseFriend,
        _ => RelationshipStage::Intimate,
    }
}

pub fn generate_insights(metrics: &RelationshipMetrics) -> Vec<String> {
    let mut insights = Vec::new();

    if metrics.intimacy_level > 70.0 {
        insights.push("The relationship has become very intimate".to_string());
    } else if metrics.intimacy_level > 50.0 {
        insights.push("A bond of trust has formed".to_string());
    } else if metrics.intimacy_level < 20.0 {
        insights.push("The relationship still needs time to grow".to_string());
    }

    if metrics.conversation_frequency > 100 {
        insights.push("Communication is lively and frequent".to_string());
    }
    if metrics.shared_memories > 50 {
        insights.push("You share many experiences together".to_string());
    }

    insights
}

pub fn generate_recommendations(metrics: &RelationshipMetrics) -> Vec<String> {
    let mut recommendations = Vec::new();
    if metrics.intimacy_level < 50.0 {
        recommendations.push("Try talking about more personal topics".to_string());
    }
    recommendations
}

/// Window requested for metric history. Accepted and echoed; no history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsPeriod {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
    All,
}

impl std::str::FromStr for MetricsPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "quarter" => Ok(Self::Quarter),
            "year" => Ok(Self::Year),
            "all" => Ok(Self::All),
            _ => Err(format!("unknown period: {s}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetricsOptions {
    pub include_history: bool,
    pub period: Option<MetricsPeriod>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipReport {
    pub current: Option<RelationshipMetrics>,
    pub stage: RelationshipStage,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub include_history: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<MetricsPeriod>,
}

/// Builds [`RelationshipReport`]s over the metrics and partner collaborators.
#[derive(Clone)]
pub struct RelationshipAggregator {
    metrics: Arc<dyn MetricsStore>,
    partners: Arc<dyn PartnerDirectory>,
}

impl RelationshipAggregator {
    pub fn new(metrics: Arc<dyn MetricsStore>, partners: Arc<dyn PartnerDirectory>) -> Self {
        Self { metrics, partners }
    }

    /// Report for one partner.
    ///
    /// - existing row: stage, insights and recommendations derived from it
    /// - no row, partner exists: the row is created and a new-relationship report returned
    /// - partner missing: `current: None`, stage stranger, default texts
    ///
    /// Only genuine storage failures are returned as errors.
    pub async fn get_relationship_metrics(
        &self,
        partner_id: &str,
        options: MetricsOptions,
    ) -> Result<RelationshipReport, MemoryError> {
        let metrics = Arc::clone(&self.metrics);
        let partners = Arc::clone(&self.partners);
        let pid = partner_id.to_string();

        let outcome = blocking(move || {
            if let Some(existing) = metrics.find_metrics(&pid)? {
                return Ok(Lookup::Existing(existing));
            }
            if partners.find_partner(&pid)?.is_none() {
                return Ok(Lookup::NoPartner);
            }
            match metrics.get_or_create(&pid) {
                Ok(created) => Ok(Lookup::Created(created)),
                // partner removed between the two reads
                Err(StoreError::PartnerNotFound(_)) => Ok(Lookup::NoPartner),
                Err(e) => Err(e),
            }
        })
        .await?;

        let report = match outcome {
            Lookup::Existing(current) => RelationshipReport {
                stage: derive_stage(&current),
                insights: generate_insights(&current),
                recommendations: generate_recommendations(&current),
                current: Some(current),
                include_history: options.include_history,
                period: options.period,
            },
            Lookup::Created(current) => {
                tracing::info!(partner_id = %partner_id, "relationship metrics initialized");
                RelationshipReport {
                    stage: derive_stage(&current),
                    current: Some(current),
                    insights: vec!["A new relationship has begun".to_string()],
                    recommendations: vec!["Keep in touch regularly".to_string()],
                    include_history: options.include_history,
                    period: options.period,
                }
            }
            Lookup::NoPartner => {
                tracing::warn!(partner_id = %partner_id, "no partner for relationship metrics, returning defaults");
                RelationshipReport {
                    current: None,
                    stage: RelationshipStage::Stranger,
                    insights: vec!["No relationship data found".to_string()],
                    recommendations: vec!["Start by having a conversation with your partner".to_string()],
                    include_history: options.include_history,
                    period: options.period,
                }
            }
        };
        Ok(report)
    }

    /// Bump the shared-memory counter.
    pub async fn increment_shared_memories(&self, partner_id: &str) -> Result<(), MemoryError> {
        let metrics = Arc::clone(&self.metrics);
        let pid = partner_id.to_string();
        blocking(move || metrics.increment_shared_memories(&pid)).await
    }
}

enum Lookup {
    Existing(RelationshipMetrics),
    Created(RelationshipMetrics),
    NoPartner,
}
