//! Conversation batch → memories and episodes.
//!
//! [`MemoryExtractor::create_summary`] is the only write path for memories.
//! Everything the extractor returns is decoded before the first write, so a
//! timeout, provider failure or malformed payload persists nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use crate::config::RapportConfig;
use crate::embedding::{embed_best_effort, EmbeddingProvider};
use crate::extraction::{decode_payload, ExtractionPayload, ExtractionRequest, StructuredExtractor};

use super::blocking;
use super::error::MemoryError;
use super::service::Stores;
use super::types::{
    EpisodeMemory, Memory, Message, MessageSender, NewEpisode, NewMemory, Partner, SummaryType,
};

/// Emotional weight given to a caller-requested episode.
const EXPLICIT_EPISODE_WEIGHT: f64 = 8.0;

/// Speaker label for user turns in the transcript and in episode participants.
const USER_LABEL: &str = "User";

#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub partner_id: String,
    /// Must be non-empty.
    pub message_ids: Vec<String>,
    pub summary_type: SummaryType,
    /// When set, exactly one episode is created from it and extractor-proposed
    /// episodes are ignored.
    pub episode: Option<EpisodeRequest>,
}

#[derive(Debug, Clone)]
pub struct EpisodeRequest {
    pub title: String,
    /// Falls back to the extracted summary.
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub success: bool,
    pub memories_created: Vec<Memory>,
    pub episodes_created: Vec<EpisodeMemory>,
    pub summary_text: String,
}

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// One async mutex per partner id. Held for the whole of a `create_summary`
/// call so two batches for the same partner never interleave their writes.
///
/// An entry lives only while some caller holds or waits on it.
#[derive(Default)]
pub struct PartnerLocks {
    locks: Mutex<LockMap>,
}

impl PartnerLocks {
    pub async fn acquire(&self, partner_id: &str) -> PartnerGuard<'_> {
        let lock = {
            let mut locks = self.map();
            Arc::clone(locks.entry(partner_id.to_string()).or_default())
        };
        PartnerGuard {
            owner: self,
            partner_id: partner_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of partner ids currently tracked.
    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self) -> std::sync::MutexGuard<'_, LockMap> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Holds one partner's lock and prunes its map entry on release.
pub struct PartnerGuard<'a> {
    owner: &'a PartnerLocks,
    partner_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PartnerGuard<'_> {
    fn drop(&mut self) {
        // release first so only the map and any waiters still hold the Arc
        drop(self.guard.take());
        let mut locks = self.owner.map();
        if locks
            .get(&self.partner_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.partner_id);
        }
    }
}

pub struct MemoryExtractor {
    stores: Stores,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn StructuredExtractor>,
    timeout: Duration,
    embed_timeout: Duration,
    shared_memory_threshold: f64,
    locks: Option<PartnerLocks>,
}

impl MemoryExtractor {
    pub fn new(
        stores: Stores,
        embedder: Arc<dyn EmbeddingProvider>,
        extractor: Arc<dyn StructuredExtractor>,
        config: &RapportConfig,
    ) -> Self {
        Self {
            stores,
            embedder,
            extractor,
            timeout: config.extraction.timeout(),
            embed_timeout: config.embedding.timeout(),
            shared_memory_threshold: config.extraction.shared_memory_threshold,
            locks: config
                .extraction
                .serialize_per_partner
                .then(PartnerLocks::default),
        }
    }

    /// Extract and persist memories from a batch of messages.
    ///
    /// Errors:
    /// - `NotFound` for an empty id list, a missing partner, or when none of
    ///   the ids resolve to a message of this partner
    /// - `InvalidInput` for a blank explicit episode title
    /// - `ExtractionTimeout` when the extractor misses the configured ceiling
    /// - `ExtractionParse`, `ExtractionAuth`, `ExtractionRateLimit`,
    ///   `ExtractionProvider` from the extractor
    /// - `Storage` if a write fails part way; earlier writes are kept
    pub async fn create_summary(&self, request: SummaryRequest) -> Result<SummaryResponse, MemoryError> {
        if request.message_ids.is_empty() {
            return Err(MemoryError::NotFound("no message ids supplied".into()));
        }
        if let Some(ep) = &request.episode {
            if ep.title.trim().is_empty() {
                return Err(MemoryError::InvalidInput("episode title must not be empty".into()));
            }
        }

        let started = Instant::now();
        let partner = self.resolve_partner(&request.partner_id).await?;
        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(&partner.id).await),
            None => None,
        };

        let messages = self.resolve_messages(&partner, &request.message_ids).await?;
        tracing::info!(
            partner_id = %partner.id,
            messages = messages.len(),
            summary_type = request.summary_type.as_str(),
            "creating summary"
        );

        let transcript = build_transcript(&partner.name, messages);
        let payload = self
            .run_extraction(ExtractionRequest::new(&partner.name, request.summary_type, transcript))
            .await?;

        let memories_created = self.persist_memories(&partner, &payload).await?;
        let episodes_created = match &request.episode {
            Some(explicit) => vec![self.persist_explicit_episode(&partner, explicit, &payload).await?],
            None => self.persist_proposed_episodes(&partner, &payload).await?,
        };

        tracing::info!(
            partner_id = %partner.id,
            memories = memories_created.len(),
            episodes = episodes_created.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "summary created"
        );

        Ok(SummaryResponse {
            success: true,
            memories_created,
            episodes_created,
            summary_text: payload.summary,
        })
    }

    async fn resolve_partner(&self, partner_id: &str) -> Result<Partner, MemoryError> {
        let partners = Arc::clone(&self.stores.partners);
        let pid = partner_id.to_string();
        blocking(move || partners.find_partner(&pid))
            .await?
            .ok_or_else(|| MemoryError::NotFound(format!("partner {partner_id}")))
    }

    /// Messages of `partner`, in the order their ids were given.
    async fn resolve_messages(&self, partner: &Partner, ids: &[String]) -> Result<Vec<Message>, MemoryError> {
        let source = Arc::clone(&self.stores.messages);
        let lookup = ids.to_vec();
        let found = blocking(move || source.find_messages_by_ids(&lookup)).await?;

        let mut by_id: HashMap<String, Message> = found
            .into_iter()
            .filter(|m| m.partner_id == partner.id)
            .map(|m| (m.id.clone(), m))
            .collect();
        let ordered: Vec<Message> = ids.iter().filter_map(|id| by_id.remove(id)).collect();

        if ordered.is_empty() {
            return Err(MemoryError::NotFound(format!(
                "no messages found for partner {}",
                partner.id
            )));
        }
        Ok(ordered)
    }

    async fn run_extraction(&self, request: ExtractionRequest) -> Result<ExtractionPayload, MemoryError> {
        let raw = match tokio::time::timeout(self.timeout, self.extractor.extract(&request)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "extraction failed");
                return Err(e.into());
            }
            Err(_) => {
                tracing::error!(timeout_ms = self.timeout.as_millis() as u64, "extraction timed out");
                return Err(MemoryError::ExtractionTimeout(self.timeout));
            }
        };

        decode_payload(&raw).map_err(|e| {
            tracing::error!(error = %e, "extraction output rejected");
            MemoryError::from(e)
        })
    }

    async fn persist_memories(
        &self,
        partner: &Partner,
        payload: &ExtractionPayload,
    ) -> Result<Vec<Memory>, MemoryError> {
        let mut created = Vec::with_capacity(payload.memories.len());

        for candidate in &payload.memories {
            let vector = embed_best_effort(self.embedder.as_ref(), &candidate.content, self.embed_timeout).await;
            let mut memory = NewMemory::new(&partner.id, candidate.memory_type, &candidate.content);
            memory.vector = vector;
            memory.importance = candidate.importance;
            memory.emotional_weight = candidate.emotional_weight;
            memory.tags = candidate.tags.clone().unwrap_or_default();
            memory.related_people = candidate.related_people.clone().unwrap_or_default();

            let store = Arc::clone(&self.stores.memories);
            let stored = blocking(move || store.insert_memory(memory)).await?;

            if stored.importance >= self.shared_memory_threshold {
                self.bump_shared_memories(&partner.id).await;
            }
            created.push(stored);
        }

        Ok(created)
    }

    async fn persist_explicit_episode(
        &self,
        partner: &Partner,
        explicit: &EpisodeRequest,
        payload: &ExtractionPayload,
    ) -> Result<EpisodeMemory, MemoryError> {
        let episode = NewEpisode {
            partner_id: partner.id.clone(),
            title: explicit.title.clone(),
            description: explicit
                .description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| payload.summary.clone()),
            emotional_weight: EXPLICIT_EPISODE_WEIGHT,
            tags: payload
                .memories
                .first()
                .and_then(|m| m.tags.clone())
                .unwrap_or_default(),
            participants: vec![partner.name.clone(), USER_LABEL.to_string()],
            date: None,
        };

        let store = Arc::clone(&self.stores.episodes);
        let stored = blocking(move || store.insert_episode(episode)).await?;
        self.bump_shared_memories(&partner.id).await;
        Ok(stored)
    }

    async fn persist_proposed_episodes(
        &self,
        partner: &Partner,
        payload: &ExtractionPayload,
    ) -> Result<Vec<EpisodeMemory>, MemoryError> {
        let mut created = Vec::new();
        for candidate in payload.episodes.iter().flatten() {
            let episode = NewEpisode {
                partner_id: partner.id.clone(),
                title: candidate.title.clone(),
                description: candidate.summary.clone(),
                emotional_weight: candidate.emotional_weight,
                tags: candidate.tags.clone().unwrap_or_default(),
                participants: candidate
                    .participants
                    .clone()
                    .unwrap_or_else(|| vec![partner.name.clone()]),
                date: None,
            };
            let store = Arc::clone(&self.stores.episodes);
            created.push(blocking(move || store.insert_episode(episode)).await?);
        }
        Ok(created)
    }

    /// Counter bumps are not coupled to the memory write; a failure here only
    /// under-counts.
    async fn bump_shared_memories(&self, partner_id: &str) {
        let metrics = Arc::clone(&self.stores.metrics);
        let pid = partner_id.to_string();
        if let Err(e) = blocking(move || metrics.increment_shared_memories(&pid)).await {
            tracing::warn!(partner_id = %partner_id, error = %e, "failed to bump shared memories");
        }
    }
}

/// Render messages as `"<speaker>: <content>"` lines in chronological order.
///
/// The sort is stable, so messages with equal timestamps keep their input order.
pub fn build_transcript(partner_name: &str, mut messages: Vec<Message>) -> String {
    messages.sort_by_key(|m| m.created_at);
    messages
        .iter()
        .map(|m| {
            let speaker = match m.sender {
                MessageSender::User => USER_LABEL,
                MessageSender::Partner => partner_name,
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
