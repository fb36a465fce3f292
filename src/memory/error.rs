//! Error types for the memory engine.

use thiserror::Error;

use crate::extraction::ExtractionError;

/// Errors raised by the persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Column payload (tags, participants) could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The referenced partner row does not exist
    #[error("Partner not found: {0}")]
    PartnerNotFound(String),

    /// The connection mutex was poisoned by a panicking writer
    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Caller-visible failures of the [`MemoryService`](crate::memory::service::MemoryService)
/// operations.
///
/// Extraction failures are split by cause so a boundary layer can choose
/// between retrying and reporting a terminal error; see [`MemoryError::is_retryable`].
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Missing partner, or no messages resolved for the request
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Extraction timed out after {0:?}")]
    ExtractionTimeout(std::time::Duration),

    #[error("Extraction provider rate limit exceeded")]
    ExtractionRateLimit,

    #[error("Extraction provider rejected credentials: {0}")]
    ExtractionAuth(String),

    /// Provider output did not match the extraction schema
    #[error("Failed to parse extraction output: {0}")]
    ExtractionParse(String),

    #[error("Extraction provider error: {0}")]
    ExtractionProvider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl MemoryError {
    /// `true` for transient failures (timeouts, rate limits, provider
    /// hiccups) that may succeed when retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExtractionTimeout(_) | Self::ExtractionRateLimit | Self::ExtractionProvider(_)
        )
    }
}

impl From<StoreError> for MemoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PartnerNotFound(id) => MemoryError::NotFound(format!("partner {id}")),
            other => MemoryError::Storage(other),
        }
    }
}

impl From<ExtractionError> for MemoryError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Timeout(elapsed) => MemoryError::ExtractionTimeout(elapsed),
            ExtractionError::RateLimited => MemoryError::ExtractionRateLimit,
            ExtractionError::Auth(msg) => MemoryError::ExtractionAuth(msg),
            ExtractionError::Parse(msg) => MemoryError::ExtractionParse(msg),
            ExtractionError::Provider(msg) => MemoryError::ExtractionProvider(msg),
        }
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(err: tokio::task::JoinError) -> Self {
        MemoryError::Task(err.to_string())
    }
}
