//! Hierarchical memory and relationship inference for AI companions.
//!
//! Rapport turns batches of chat messages between a user and a companion
//! ("partner") into durable memories, derives emotionally weighted episodes,
//! keeps per-partner relationship metrics and surfaces continuing topics the
//! companion can bring up again.
//!
//! | Record | Purpose | Written by |
//! |--------|---------|------------|
//! | **Memory** | Atomic fact, emotion, event, preference or tie | Extraction |
//! | **Episode** | Narrative unit with an emotional weight | Extraction, explicit request |
//! | **Relationship metrics** | Intimacy, trust, counters per partner | Lazy init, extraction bumps |
//! | **Continuing topic** | Tag cluster recomputed per call | Never stored |
//!
//! # Architecture
//!
//! - **Storage**: SQLite, vectors as little-endian f32 BLOBs
//! - **Extraction**: OpenAI-compatible chat completions with a forced tool
//!   call whose schema is generated from the payload types
//! - **Embeddings**: OpenAI-compatible `/embeddings`, local ONNX Runtime
//!   (all-MiniLM-L6-v2) or disabled; always best effort
//! - **Search**: weighted sum of cosine, keyword, tag and importance signals
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations and health checks
//! - [`embedding`]: text-to-vector providers
//! - [`extraction`]: structured extraction providers and payload decoding
//! - [`memory`]: stores, engines and the [`memory::service::MemoryService`] facade

pub mod config;
pub mod db;
pub mod embedding;
pub mod extraction;
pub mod memory;
