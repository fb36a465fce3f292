//! Continuing topics: tag clusters recomputed on every call, never stored.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::TopicConfig;

use super::blocking;
use super::error::MemoryError;
use super::store::MemoryStore;
use super::types::{ContinuingTopic, Memory, MemoryType, TopicFilter, TopicStatus};

#[derive(Debug, Clone, Default)]
pub struct TopicQuery {
    /// Defaults to `topics.default_limit`.
    pub limit: Option<usize>,
    pub status: TopicFilter,
    /// Defaults to `topics.default_min_importance`.
    pub min_importance: Option<f64>,
}

/// Status of a topic last mentioned at `last_mentioned`.
pub fn topic_status(
    last_mentioned: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &TopicConfig,
) -> TopicStatus {
    let age = now - last_mentioned;
    if age < Duration::days(config.active_days) {
        TopicStatus::Active
    } else if age < Duration::days(config.dormant_days) {
        TopicStatus::Dormant
    } else {
        TopicStatus::Resolved
    }
}

/// Group memories by tag and turn every group of at least
/// `config.min_group_size` members into a topic.
///
/// A memory with several tags joins several groups. Topics are filtered by
/// `filter`, ordered by importance descending then tag ascending, numbered
/// `topic-1`, `topic-2`, … in that order and truncated to `limit`.
pub fn cluster_topics(
    partner_id: &str,
    memories: &[Memory],
    now: DateTime<Utc>,
    filter: TopicFilter,
    limit: usize,
    config: &TopicConfig,
) -> Vec<ContinuingTopic> {
    let mut groups: BTreeMap<&str, Vec<&Memory>> = BTreeMap::new();
    for memory in memories {
        for tag in &memory.tags {
            groups.entry(tag.as_str()).or_default().push(memory);
        }
    }

    let mut topics: Vec<(String, f64, DateTime<Utc>, TopicStatus, Vec<Memory>)> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= config.min_group_size.max(1))
        .filter_map(|(tag, members)| {
            let importance = members.iter().map(|m| m.importance).sum::<f64>() / members.len() as f64;
            let last_mentioned = members.iter().map(|m| m.created_at).max()?;
            let status = topic_status(last_mentioned, now, config);
            filter.matches(status).then(|| {
                (
                    tag.to_string(),
                    importance,
                    last_mentioned,
                    status,
                    members.into_iter().cloned().collect(),
                )
            })
        })
        .collect();

    topics.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    topics.truncate(limit);

    topics
        .into_iter()
        .enumerate()
        .map(|(i, (tag, importance, last_mentioned, status, related_memories))| ContinuingTopic {
            id: format!("topic-{}", i + 1),
            partner_id: partner_id.to_string(),
            description: format!("Ongoing topic about {tag}"),
            title: tag,
            status,
            importance,
            last_mentioned,
            related_memories,
        })
        .collect()
}

pub struct TopicEngine {
    memories: Arc<dyn MemoryStore>,
    config: TopicConfig,
}

impl TopicEngine {
    pub fn new(memories: Arc<dyn MemoryStore>, config: TopicConfig) -> Self {
        Self { memories, config }
    }

    /// Topics over the partner's conversation, preference and relationship
    /// memories. Unknown partners and partners with no qualifying memories
    /// yield an empty list.
    pub async fn get_ongoing_topics(
        &self,
        partner_id: &str,
        query: TopicQuery,
    ) -> Result<Vec<ContinuingTopic>, MemoryError> {
        let min_importance = query.min_importance.unwrap_or(self.config.default_min_importance);
        let limit = query.limit.unwrap_or(self.config.default_limit);

        let store = Arc::clone(&self.memories);
        let pid = partner_id.to_string();
        let source_limit = self.config.source_limit;
        let memories = blocking(move || {
            store.find_by_importance_and_type(&pid, min_importance, &MemoryType::TOPICAL, source_limit)
        })
        .await?;

        let topics = cluster_topics(partner_id, &memories, Utc::now(), query.status, limit, &self.config);
        tracing::debug!(
            partner_id = %partner_id,
            source_memories = memories.len(),
            topics = topics.len(),
            "topics clustered"
        );
        Ok(topics)
    }
}
