//! The public facade of the memory engine.
//!
//! [`MemoryService`] wires the extractor, retrieval, topic and relationship
//! engines over one set of collaborators and exposes the operations a
//! boundary layer (the CLI here, an HTTP handler elsewhere) calls.

use std::sync::Arc;

use crate::config::RapportConfig;
use crate::embedding::EmbeddingProvider;
use crate::extraction::StructuredExtractor;

use super::blocking;
use super::directory::{MessageSource, PartnerDirectory};
use super::episodes::{EpisodeQuery, EpisodeStore};
use super::error::MemoryError;
use super::extractor::{MemoryExtractor, SummaryRequest, SummaryResponse};
use super::metrics::{MetricsOptions, MetricsStore, RelationshipAggregator, RelationshipReport};
use super::search::{RetrievalEngine, SearchRequest, SearchResponse};
use super::stats::{EpisodeStats, MemoryStats};
use super::store::{MemoryStore, SqliteStore};
use super::topics::{TopicEngine, TopicQuery};
use super::types::{ContinuingTopic, EpisodeMemory};

/// The persistence collaborators, one handle per trait.
#[derive(Clone)]
pub struct Stores {
    pub memories: Arc<dyn MemoryStore>,
    pub episodes: Arc<dyn EpisodeStore>,
    pub metrics: Arc<dyn MetricsStore>,
    pub partners: Arc<dyn PartnerDirectory>,
    pub messages: Arc<dyn MessageSource>,
}

impl Stores {
    /// Every collaborator backed by the same SQLite store.
    pub fn sqlite(store: SqliteStore) -> Self {
        let store = Arc::new(store);
        Self {
            memories: store.clone(),
            episodes: store.clone(),
            metrics: store.clone(),
            partners: store.clone(),
            messages: store,
        }
    }
}

pub struct MemoryService {
    stores: Stores,
    extractor: MemoryExtractor,
    retrieval: RetrievalEngine,
    topics: TopicEngine,
    relationships: RelationshipAggregator,
}

impl MemoryService {
    pub fn new(
        stores: Stores,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn StructuredExtractor>,
        config: &RapportConfig,
    ) -> Self {
        Self {
            extractor: MemoryExtractor::new(stores.clone(), Arc::clone(&embedder), extractor, config),
            retrieval: RetrievalEngine::new(
                Arc::clone(&stores.memories),
                embedder,
                config.retrieval.clone(),
                config.embedding.timeout(),
            ),
            topics: TopicEngine::new(Arc::clone(&stores.memories), config.topics.clone()),
            relationships: RelationshipAggregator::new(
                Arc::clone(&stores.metrics),
                Arc::clone(&stores.partners),
            ),
            stores,
        }
    }

    pub fn with_sqlite(
        store: SqliteStore,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn StructuredExtractor>,
        config: &RapportConfig,
    ) -> Self {
        Self::new(Stores::sqlite(store), embedder, extractor, config)
    }

    /// See [`MemoryExtractor::create_summary`].
    pub async fn create_summary(&self, request: SummaryRequest) -> Result<SummaryResponse, MemoryError> {
        self.extractor.create_summary(request).await
    }

    /// See [`RetrievalEngine::search`].
    pub async fn search_memories(&self, request: SearchRequest) -> Result<SearchResponse, MemoryError> {
        self.retrieval.search(request).await
    }

    /// Episodes matching every filter in `query`. Unknown partners yield an
    /// empty list.
    pub async fn get_episodes(
        &self,
        partner_id: &str,
        query: EpisodeQuery,
    ) -> Result<Vec<EpisodeMemory>, MemoryError> {
        let store = Arc::clone(&self.stores.episodes);
        let pid = partner_id.to_string();
        blocking(move || store.find_episodes(&pid, &query)).await
    }

    /// See [`RelationshipAggregator::get_relationship_metrics`].
    pub async fn get_relationship_metrics(
        &self,
        partner_id: &str,
        options: MetricsOptions,
    ) -> Result<RelationshipReport, MemoryError> {
        self.relationships.get_relationship_metrics(partner_id, options).await
    }

    /// See [`TopicEngine::get_ongoing_topics`].
    pub async fn get_ongoing_topics(
        &self,
        partner_id: &str,
        query: TopicQuery,
    ) -> Result<Vec<ContinuingTopic>, MemoryError> {
        self.topics.get_ongoing_topics(partner_id, query).await
    }

    pub async fn memory_stats(&self, partner_id: &str) -> Result<MemoryStats, MemoryError> {
        let store = Arc::clone(&self.stores.memories);
        let pid = partner_id.to_string();
        blocking(move || store.memory_stats(&pid)).await
    }

    pub async fn episode_stats(&self, partner_id: &str) -> Result<EpisodeStats, MemoryError> {
        let store = Arc::clone(&self.stores.episodes);
        let pid = partner_id.to_string();
        blocking(move || store.episode_stats(&pid)).await
    }
}
