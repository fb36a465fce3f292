//! Hybrid relevance search over a partner's memories.
//!
//! Each candidate is scored as a weighted sum of four signals:
//!
//! | signal     | weight | value                                              |
//! |------------|--------|----------------------------------------------------|
//! | semantic   | 0.6    | cosine(query, memory), floored at 0                |
//! | keyword    | 0.3    | 1 if the content contains the query, else 0         |
//! | tags       | 0.1    | fraction of tags containing some query token        |
//! | importance | 0.1    | importance / 10                                    |
//!
//! The weights sum to 1.1, so scores lie in `[0, 1.1]`. Memories without a
//! vector still score on the last three signals.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::embedding::{cosine_similarity, embed_best_effort, EmbeddingProvider};

use super::blocking;
use super::error::MemoryError;
use super::store::MemoryStore;
use super::types::{Memory, MemoryType};

const SEMANTIC_WEIGHT: f64 = 0.6;
const KEYWORD_WEIGHT: f64 = 0.3;
const TAG_WEIGHT: f64 = 0.1;
const IMPORTANCE_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub partner_id: String,
    pub query: String,
    /// `None` or empty searches every type.
    pub memory_types: Option<Vec<MemoryType>>,
    /// Defaults to `retrieval.default_limit`.
    pub limit: Option<usize>,
    pub min_importance: f64,
}

impl SearchRequest {
    pub fn new(partner_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            partner_id: partner_id.into(),
            query: query.into(),
            memory_types: None,
            limit: None,
            min_importance: 0.0,
        }
    }
}

/// Ranked results. `relevance_scores[i]` is the score of `results[i]`;
/// `total_found` counts every memory above the threshold before truncation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Memory>,
    pub relevance_scores: Vec<f64>,
    pub total_found: usize,
}

/// Pre-lowercased query, shared across every candidate.
struct PreparedQuery<'a> {
    lowered: String,
    tokens: Vec<String>,
    vector: &'a [f32],
}

impl<'a> PreparedQuery<'a> {
    fn new(query: &str, vector: &'a [f32]) -> Self {
        let lowered = query.to_lowercase();
        let tokens = lowered.split_whitespace().map(str::to_string).collect();
        Self { lowered, tokens, vector }
    }
}

fn score(memory: &Memory, query: &PreparedQuery<'_>) -> f64 {
    let semantic = cosine_similarity(&memory.vector, query.vector).max(0.0);

    let keyword = if memory.content.to_lowercase().contains(&query.lowered) {
        1.0
    } else {
        0.0
    };

    let matching_tags = memory
        .tags
        .iter()
        .filter(|tag| {
            let tag = tag.to_lowercase();
            query.tokens.iter().any(|token| tag.contains(token.as_str()))
        })
        .count();
    let tag_ratio = matching_tags as f64 / memory.tags.len().max(1) as f64;

    SEMANTIC_WEIGHT * semantic
        + KEYWORD_WEIGHT * keyword
        + TAG_WEIGHT * tag_ratio
        + IMPORTANCE_WEIGHT * (memory.importance / 10.0)
}

/// Score `candidates`, keep those above `min_score`, order by score descending
/// and truncate to `limit`. Equal scores keep candidate order.
pub fn rank_memories(
    candidates: Vec<Memory>,
    query: &str,
    query_vector: &[f32],
    min_score: f64,
    limit: usize,
) -> SearchResponse {
    let prepared = PreparedQuery::new(query, query_vector);

    let mut scored: Vec<(Memory, f64)> = candidates
        .into_iter()
        .map(|m| {
            let s = score(&m, &prepared);
            (m, s)
        })
        .filter(|(_, s)| *s > min_score)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let total_found = scored.len();
    scored.truncate(limit);
    let (results, relevance_scores) = scored.into_iter().unzip();

    SearchResponse {
        results,
        relevance_scores,
        total_found,
    }
}

pub struct RetrievalEngine {
    memories: Arc<dyn MemoryStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    config: RetrievalConfig,
    embed_timeout: Duration,
}

impl RetrievalEngine {
    pub fn new(
        memories: Arc<dyn MemoryStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            memories,
            embedder,
            config,
            embed_timeout,
        }
    }

    /// Rank a partner's memories against `request.query`.
    ///
    /// A blank query or a partner with no memories yields an empty response.
    /// Embedding failure only removes the semantic signal. Storage failures
    /// are returned as `Storage`.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse, MemoryError> {
        if request.query.trim().is_empty() {
            return Ok(SearchResponse::default());
        }
        let limit = request.limit.unwrap_or(self.config.default_limit);

        let store = Arc::clone(&self.memories);
        let partner_id = request.partner_id.clone();
        let min_importance = request.min_importance;
        let types = request.memory_types.clone().unwrap_or_default();
        let (candidate_limit, typed_limit) = (self.config.candidate_limit, self.config.typed_candidate_limit);

        let candidates = blocking(move || {
            if types.is_empty() {
                store.find_recent(&partner_id, min_importance, candidate_limit)
            } else {
                store.find_by_importance_and_type(&partner_id, min_importance, &types, typed_limit)
            }
        })
        .await?;

        if candidates.is_empty() {
            tracing::debug!(partner_id = %request.partner_id, "no candidate memories");
            return Ok(SearchResponse::default());
        }

        let query_vector = embed_best_effort(self.embedder.as_ref(), &request.query, self.embed_timeout).await;
        let candidate_count = candidates.len();
        let response = rank_memories(
            candidates,
            &request.query,
            &query_vector,
            self.config.min_score,
            limit,
        );

        tracing::debug!(
            partner_id = %request.partner_id,
            candidates = candidate_count,
            matched = response.total_found,
            returned = response.results.len(),
            semantic = !query_vector.is_empty(),
            "memory search complete"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn memory(content: &str, tags: &[&str], importance: f64, vector: Vec<f32>) -> Memory {
        Memory {
            id: content.into(),
            partner_id: "p".into(),
            memory_type: MemoryType::Fact,
            content: content.into(),
            vector,
            importance,
            emotional_weight: 0.0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            related_people: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn keyword_and_importance_score_without_vectors() {
        let m = memory("Works as a nurse", &[], 8.0, vec![]);
        let q = PreparedQuery::new("nurse", &[]);
        assert!((score(&m, &q) - (0.3 + 0.08)).abs() < 1e-9);
    }

    #[test]
    fn tag_ratio_uses_token_substrings() {
        let m = memory("unrelated", &["workplace", "cats"], 0.0, vec![]);
        let q = PreparedQuery::new("Work stress", &[]);
        assert!((score(&m, &q) - 0.05).abs() < 1e-9);
    }

    #[test]
    fn negative_cosine_is_floored() {
        let m = memory("x", &[], 0.0, vec![1.0, 0.0]);
        let v = [-1.0, 0.0];
        let q = PreparedQuery::new("zzz", &v);
        assert_eq!(score(&m, &q), 0.0);
    }

    #[test]
    fn maximum_score_is_one_point_one() {
        let m = memory("tea", &["tea"], 10.0, vec![0.5, 0.5]);
        let v = [0.5, 0.5];
        let q = PreparedQuery::new("tea", &v);
        assert!((score(&m, &q) - 1.1).abs() < 1e-9);
    }

    #[test]
    fn rank_filters_threshold_and_sorts() {
        let candidates = vec![
            memory("low", &[], 1.0, vec![]),
            memory("tea ceremony", &[], 2.0, vec![]),
            memory("green tea", &["tea"], 5.0, vec![]),
        ];
        let response = rank_memories(candidates, "tea", &[], 0.1, 10);
        let ids: Vec<_> = response.results.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["green tea", "tea ceremony"]);
        assert_eq!(response.total_found, 2);
        assert!(response.relevance_scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn rank_ties_keep_candidate_order() {
        let candidates = vec![
            memory("tea a", &[], 5.0, vec![]),
            memory("tea b", &[], 5.0, vec![]),
        ];
        let response = rank_memories(candidates, "tea", &[], 0.1, 10);
        assert_eq!(response.results[0].id, "tea a");
        assert_eq!(response.results[1].id, "tea b");
    }

    #[test]
    fn truncation_keeps_total_found() {
        let candidates = (0..5)
            .map(|i| memory(&format!("tea {i}"), &[], 5.0, vec![]))
            .collect();
        let response = rank_memories(candidates, "tea", &[], 0.1, 2);
        assert_eq!(response.results.len(), 2);
        assert_eq!(response.relevance_scores.len(), 2);
        assert_eq!(response.total_found, 5);
    }
}
