pub mod doctor;
pub mod episodes;
pub mod metrics;
pub mod search;
pub mod seed;
pub mod stats;
pub mod summarize;
pub mod topics;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use rapport::config::RapportConfig;
use rapport::db::migrations::{get_embedding_model, set_embedding_model};
use rapport::embedding::{DisabledProvider, EmbeddingProvider};
use rapport::extraction::{DisabledExtractor, StructuredExtractor};
use rapport::memory::service::MemoryService;
use rapport::memory::store::SqliteStore;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Open the configured database as a store.
pub fn open_store(config: &RapportConfig) -> Result<SqliteStore> {
    let conn = rapport::db::open_database(config.resolved_db_path())?;
    Ok(SqliteStore::new(conn))
}

/// What a command needs from the service beyond the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Embedding and extraction.
    Summarize,
    /// Embedding only.
    Search,
    /// Neither; both providers are disabled so no API key is required.
    Read,
}

/// Build the service for `purpose`.
///
/// When embedding is used on a database without memories, the stored
/// embedding model is updated to the configured provider's; otherwise a
/// mismatch is only reported, since existing vectors would no longer be
/// comparable.
pub fn open_service(config: &RapportConfig, purpose: Purpose) -> Result<MemoryService> {
    let store = open_store(config)?;

    let embedder: Arc<dyn EmbeddingProvider> = match purpose {
        Purpose::Summarize | Purpose::Search => rapport::embedding::create_provider(&config.embedding)?,
        Purpose::Read => Arc::new(DisabledProvider),
    };
    let extractor: Arc<dyn StructuredExtractor> = match purpose {
        Purpose::Summarize => rapport::extraction::create_extractor(&config.extraction)?,
        Purpose::Search | Purpose::Read => Arc::new(DisabledExtractor),
    };

    if purpose != Purpose::Read {
        check_embedding_model(&store, embedder.model_name())?;
    }

    Ok(MemoryService::with_sqlite(store, embedder, extractor, config))
}

fn check_embedding_model(store: &SqliteStore, configured: &str) -> Result<()> {
    store
        .with_conn(|conn| {
            let stored = get_embedding_model(conn)?;
            if stored.as_deref() == Some(configured) {
                return Ok(());
            }
            let memories: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;
            if memories == 0 {
                set_embedding_model(conn, configured)?;
            } else {
                tracing::warn!(
                    stored = stored.as_deref().unwrap_or("(not set)"),
                    configured = %configured,
                    "embedding model mismatch, semantic scores will be zero for older memories"
                );
            }
            Ok(())
        })
        .context("failed to check embedding model")
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{json}");
    Ok(())
}

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &rapport::config::EmbeddingConfig) -> Result<()> {
    let cache_dir = rapport::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    let model_path = cache_dir.join("model.onnx");
    let tokenizer_path = cache_dir.join("tokenizer.json");

    if model_path.exists() {
        println!("Model already exists at {}", model_path.display());
    } else {
        println!("Downloading model.onnx (~90MB)...");
        download_file(MODEL_URL, &model_path).await?;
        println!("Model saved to {}", model_path.display());
    }

    if tokenizer_path.exists() {
        println!("Tokenizer already exists at {}", tokenizer_path.display());
    } else {
        println!("Downloading tokenizer.json...");
        download_file(TOKENIZER_URL, &tokenizer_path).await?;
        println!("Tokenizer saved to {}", tokenizer_path.display());
    }

    println!("Model download complete. Set `embedding.provider = \"local\"` to use it.");
    Ok(())
}

/// Stream a file to disk with a progress bar, writing to a temp file first.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")
                    .context("invalid progress template")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk).await.context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
