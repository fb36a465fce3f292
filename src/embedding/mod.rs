//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and three implementations selected
//! by [`create_provider`]: an OpenAI-compatible HTTP client, a local ONNX
//! Runtime model (all-MiniLM-L6-v2) and a disabled provider. Embedding is
//! always best effort: [`embed_best_effort`] turns every failure into an empty
//! vector, which downstream scoring treats as "no semantic signal".

pub mod local;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Transport failure talking to the embedding endpoint
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Embedding API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    /// Tokenizer or ONNX Runtime failure
    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Embedding is disabled")]
    Disabled,

    #[error("Embedding timed out after {0:?}")]
    Timeout(Duration),
}

/// Turns text into a vector.
///
/// Implementations must be cheap to share behind an `Arc`. Vectors from one
/// provider share a fixed dimension; callers compare only equal-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Identifier recorded in `schema_meta.embedding_model`.
    fn model_name(&self) -> &str;
}

/// Provider used when embedding is switched off. Every call fails, so every
/// stored vector is empty and search runs on keyword, tag and importance terms.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }

    fn model_name(&self) -> &str {
        "none"
    }
}

/// Create an embedding provider from config.
///
/// `openai` needs an API key, `local` needs the model files (run
/// `rapport model download` first) and `none` disables embedding.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => {
            let provider = openai::OpenAiEmbeddingProvider::from_config(config)?;
            Ok(Arc::new(provider))
        }
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Arc::new(provider))
        }
        "none" => Ok(Arc::new(DisabledProvider)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: openai, local, none"),
    }
}

/// Embed `text`, degrading to an empty vector on failure or after `timeout`.
///
/// A timed-out call is abandoned; its result is never observed.
pub async fn embed_best_effort(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Vec<f32> {
    match tokio::time::timeout(timeout, provider.embed(text)).await {
        Ok(Ok(vector)) => vector,
        Ok(Err(EmbeddingError::Disabled)) => Vec::new(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "embedding failed, storing empty vector");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(error = %EmbeddingError::Timeout(timeout), "embedding failed, storing empty vector");
            Vec::new()
        }
    }
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 when either vector is empty, the lengths differ, or either
/// magnitude is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
