#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use rapport::config::RapportConfig;
use rapport::embedding::{EmbeddingError, EmbeddingProvider};
use rapport::extraction::{ExtractionError, ExtractionRequest, StructuredExtractor};
use rapport::memory::service::MemoryService;
use rapport::memory::store::{MemoryStore, SqliteStore};
use rapport::memory::types::{Memory, MemoryType, Message, MessageSender, NewMemory, Partner};

/// Words the fake embedder maps to dimensions.
const VOCABULARY: [&str; 8] = ["work", "tea", "cat", "music", "travel", "sister", "nurse", "rain"];

/// A migrated in-memory store with one partner named `name`.
pub fn store_with_partner(name: &str) -> (SqliteStore, Partner) {
    let store = SqliteStore::open_in_memory().unwrap();
    let partner = store.create_partner("user-1", name).unwrap();
    (store, partner)
}

/// Defaults with a short extraction ceiling so timeout tests finish quickly.
pub fn test_config() -> RapportConfig {
    let mut config = RapportConfig::default();
    config.extraction.timeout_ms = 300;
    config.embedding.timeout_ms = 300;
    config
}

pub fn service(store: &SqliteStore, extractor: Arc<dyn StructuredExtractor>) -> MemoryService {
    service_with(store, Arc::new(KeywordEmbedder), extractor, &test_config())
}

pub fn service_with(
    store: &SqliteStore,
    embedder: Arc<dyn EmbeddingProvider>,
    extractor: Arc<dyn StructuredExtractor>,
    config: &RapportConfig,
) -> MemoryService {
    MemoryService::with_sqlite(store.clone(), embedder, extractor, config)
}

/// Seed a conversation, one second apart starting an hour ago. Returns the
/// message ids in order.
pub fn seed_messages(store: &SqliteStore, partner_id: &str, turns: &[(MessageSender, &str)]) -> Vec<String> {
    let start = Utc::now() - chrono::Duration::hours(1);
    turns
        .iter()
        .enumerate()
        .map(|(i, (sender, content))| {
            let at = start + chrono::Duration::seconds(i as i64);
            store
                .create_message(partner_id, *sender, content, Some(at))
                .unwrap()
                .id
        })
        .collect()
}

pub fn seed_message_at(store: &SqliteStore, partner_id: &str, sender: MessageSender, content: &str, at: DateTime<Utc>) -> Message {
    store.create_message(partner_id, sender, content, Some(at)).unwrap()
}

/// Insert a memory directly, bypassing extraction.
pub fn insert_memory(
    store: &SqliteStore,
    partner_id: &str,
    memory_type: MemoryType,
    content: &str,
    importance: f64,
    tags: &[&str],
    created_at: DateTime<Utc>,
) -> Memory {
    let mut m = NewMemory::new(partner_id, memory_type, content);
    m.importance = importance;
    m.tags = tags.iter().map(|t| t.to_string()).collect();
    m.created_at = Some(created_at);
    m.vector = keyword_vector(content);
    store.insert_memory(m).unwrap()
}

/// One dimension per vocabulary word present in `text`.
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    VOCABULARY
        .iter()
        .map(|w| if lowered.contains(w) { 1.0 } else { 0.0 })
        .collect()
}

/// Deterministic embedder over [`VOCABULARY`].
pub struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(keyword_vector(text))
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }
}

/// Embedder whose every call fails.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Http("connection refused".into()))
    }

    fn model_name(&self) -> &str {
        "failing-test"
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    RateLimited,
    Auth,
    Provider,
}

enum Behavior {
    Respond(String),
    Fail(Failure),
    Hang(Duration),
}

/// Scripted extractor that records how often it was called and what it saw.
pub struct FakeExtractor {
    behavior: Behavior,
    calls: AtomicUsize,
    last_request: Mutex<Option<ExtractionRequest>>,
}

impl FakeExtractor {
    pub fn responding(json: serde_json::Value) -> Arc<Self> {
        Self::with(Behavior::Respond(json.to_string()))
    }

    pub fn raw(text: &str) -> Arc<Self> {
        Self::with(Behavior::Respond(text.to_string()))
    }

    pub fn failing(failure: Failure) -> Arc<Self> {
        Self::with(Behavior::Fail(failure))
    }

    pub fn hanging(delay: Duration) -> Arc<Self> {
        Self::with(Behavior::Hang(delay))
    }

    fn with(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_transcript(&self) -> Option<String> {
        self.last_request
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.transcript.clone())
    }

    pub fn last_instructions(&self) -> Option<String> {
        self.last_request
            .lock()
            .unwrap()
            .as_ref()
            .map(|r| r.instructions.clone())
    }
}

#[async_trait]
impl StructuredExtractor for FakeExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        match &self.behavior {
            Behavior::Respond(raw) => Ok(raw.clone()),
            Behavior::Fail(Failure::RateLimited) => Err(ExtractionError::RateLimited),
            Behavior::Fail(Failure::Auth) => Err(ExtractionError::Auth("invalid api key".into())),
            Behavior::Fail(Failure::Provider) => Err(ExtractionError::Provider("HTTP 500".into())),
            Behavior::Hang(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(r#"{"summary": "late", "memories": []}"#.to_string())
            }
        }
    }
}

/// Row count of `table`.
pub fn count_rows(store: &SqliteStore, table: &str) -> i64 {
    store
        .with_conn(|conn| Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?))
        .unwrap()
}
