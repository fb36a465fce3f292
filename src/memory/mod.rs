pub mod directory;
pub mod episodes;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod search;
pub mod service;
pub mod stats;
pub mod store;
pub mod topics;
pub mod types;

pub use error::{MemoryError, StoreError};

/// Encode a vector as little-endian f32 bytes for the `vector` BLOB column.
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Decode a `vector` BLOB. Trailing bytes that do not form a whole f32 are ignored.
pub fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Run a store call on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, MemoryError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
