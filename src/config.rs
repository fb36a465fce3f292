use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RapportConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub extraction: ExtractionConfig,
    pub retrieval: RetrievalConfig,
    pub topics: TopicConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `openai`, `local` or `none`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractionConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    /// Wall-clock ceiling for one structured extraction call.
    pub timeout_ms: u64,
    /// Transport-level timeout handed to the HTTP client.
    pub request_timeout_ms: u64,
    /// Memories at or above this importance bump the shared-memory counter.
    pub shared_memory_threshold: f64,
    pub serialize_per_partner: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub candidate_limit: usize,
    pub typed_candidate_limit: usize,
    pub min_score: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TopicConfig {
    pub default_limit: usize,
    pub default_min_importance: f64,
    pub source_limit: usize,
    pub min_group_size: usize,
    pub active_days: i64,
    pub dormant_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_rapport_dir()
            .join("rapport.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_rapport_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "openai".into(),
            model: "text-embedding-ada-002".into(),
            cache_dir,
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            timeout_ms: 15_000,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4-turbo-preview".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            timeout_ms: 25_000,
            request_timeout_ms: 30_000,
            shared_memory_threshold: 7.0,
            serialize_per_partner: true,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            candidate_limit: 200,
            typed_candidate_limit: 100,
            min_score: 0.1,
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_min_importance: 3.0,
            source_limit: 100,
            min_group_size: 2,
            active_days: 7,
            dormant_days: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// Returns `~/.rapport/`, or `./.rapport` when no home directory is known.
pub fn default_rapport_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rapport")
}

/// Returns the default config file path: `~/.rapport/config.toml`
pub fn default_config_path() -> PathBuf {
    default_rapport_dir().join("config.toml")
}

impl RapportConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RapportConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// `RAPPORT_DB`, `RAPPORT_LOG_LEVEL`, `RAPPORT_EMBEDDING_PROVIDER` and
    /// `RAPPORT_OPENAI_API_KEY` (falling back to `OPENAI_API_KEY`). The API key
    /// only fills sections that have none configured.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RAPPORT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("RAPPORT_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("RAPPORT_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        let api_key = std::env::var("RAPPORT_OPENAI_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .ok();
        if let Some(key) = api_key {
            if self.embedding.api_key.is_none() {
                self.embedding.api_key = Some(SecretString::from(key.clone()));
            }
            if self.extraction.api_key.is_none() {
                self.extraction.api_key = Some(SecretString::from(key));
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
