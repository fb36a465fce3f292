//! Structured extraction: transcript in, typed memories and episodes out.
//!
//! A [`StructuredExtractor`] returns the raw JSON arguments produced by a
//! generation backend. [`decode_payload`] then decodes them strictly into
//! [`ExtractionPayload`]; nothing is defaulted except the optional lists.
//! The JSON schema advertised to the backend is generated from the same types
//! by [`extraction_schema`], so the two cannot drift apart.

pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::types::{MemoryType, SummaryType};

/// Name of the function/tool the backend is forced to call.
pub const EXTRACTION_FUNCTION: &str = "extract_memories";

/// Failure of one extraction call, split by cause.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limit exceeded")]
    RateLimited,

    /// 401/403 from the provider
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Output does not match the extraction schema
    #[error("failed to parse extraction output: {0}")]
    Parse(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// One extraction call: system instructions plus the conversation transcript.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub instructions: String,
    pub transcript: String,
}

impl ExtractionRequest {
    pub fn new(partner_name: &str, summary_type: SummaryType, transcript: String) -> Self {
        Self {
            instructions: build_instructions(partner_name, summary_type),
            transcript,
        }
    }
}

/// A generation backend constrained to the extraction schema.
#[async_trait]
pub trait StructuredExtractor: Send + Sync {
    /// Run one extraction and return the raw JSON arguments.
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError>;
}

/// Extractor used when extraction is switched off. Every call fails with
/// [`ExtractionError::Provider`].
pub struct DisabledExtractor;

#[async_trait]
impl StructuredExtractor for DisabledExtractor {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<String, ExtractionError> {
        Err(ExtractionError::Provider("extraction is disabled".into()))
    }
}

/// Decoded extraction output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionPayload {
    /// Summary of the whole conversation
    pub summary: String,
    pub memories: Vec<CandidateMemory>,
    #[serde(default)]
    pub episodes: Option<Vec<CandidateEpisode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateMemory {
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub content: String,
    #[schemars(range(min = 1, max = 10))]
    pub importance: f64,
    /// Advertised as 1-10; stored values are clamped to -10..=10
    #[schemars(range(min = 1, max = 10))]
    pub emotional_weight: f64,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub related_people: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEpisode {
    pub title: String,
    #[serde(alias = "description")]
    pub summary: String,
    #[schemars(range(min = 0, max = 10))]
    pub emotional_weight: f64,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub participants: Option<Vec<String>>,
}

/// Strictly decode raw extractor output.
///
/// Missing required fields, wrong JSON types, unknown memory types and blank
/// memory content or episode titles are all [`ExtractionError::Parse`].
pub fn decode_payload(raw: &str) -> Result<ExtractionPayload, ExtractionError> {
    let payload: ExtractionPayload =
        serde_json::from_str(raw).map_err(|e| ExtractionError::Parse(e.to_string()))?;

    for (i, memory) in payload.memories.iter().enumerate() {
        if memory.content.trim().is_empty() {
            return Err(ExtractionError::Parse(format!("memories[{i}].content is empty")));
        }
    }
    for (i, episode) in payload.episodes.iter().flatten().enumerate() {
        if episode.title.trim().is_empty() {
            return Err(ExtractionError::Parse(format!("episodes[{i}].title is empty")));
        }
    }

    Ok(payload)
}

/// JSON schema of [`ExtractionPayload`], used as the function parameters.
pub fn extraction_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(ExtractionPayload);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// System instructions for one extraction call.
pub fn build_instructions(partner_name: &str, summary_type: SummaryType) -> String {
    format!(
        r#"You are a memory manager for an AI companion. Extract the important memories from the conversation.

Partner name: {partner_name}
Summary type: {summary_type}

Analyze the conversation for:
1. Important facts and events
2. Emotional moments and changes in intimacy
3. Personal preferences, hobbies and values
4. Relationships and social ties
5. Ongoing topics and unresolved issues

Memory types:
- conversation: general conversation content
- fact: durable facts about the user
- emotion: feelings and emotional states
- event: notable happenings and experiences
- relationship: people and social ties
- preference: likes, dislikes and choices

Importance (1-10):
- 1-3: everyday details
- 4-6: meaningful information
- 7-8: important information
- 9-10: critical information

Emotional weight (1-10): how emotionally charged the memory is.

Tag each memory with short lowercase topic words so related memories share tags."#,
        summary_type = summary_type.as_str()
    )
}

/// Create the extractor named by config.
pub fn create_extractor(
    config: &crate::config::ExtractionConfig,
) -> anyhow::Result<Arc<dyn StructuredExtractor>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(openai::OpenAiExtractor::from_config(config)?)),
        "none" => Ok(Arc::new(DisabledExtractor)),
        other => anyhow::bail!("unknown extraction provider: {other}. Supported: openai, none"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_payload() {
        let raw = r#"{
            "summary": "Talked about work",
            "memories": [
                {"type": "fact", "content": "Works as a nurse", "importance": 8, "emotionalWeight": 3,
                 "tags": ["work"], "relatedPeople": ["Mika"]}
            ],
            "episodes": [
                {"title": "First night shift", "summary": "Nervous but proud", "emotionalWeight": 7}
            ]
        }"#;
        let payload = decode_payload(raw).unwrap();
        assert_eq!(payload.summary, "Talked about work");
        assert_eq!(payload.memories[0].memory_type, MemoryType::Fact);
        assert_eq!(payload.memories[0].related_people.as_deref(), Some(&["Mika".to_string()][..]));
        let episodes = payload.episodes.unwrap();
        assert_eq!(episodes[0].summary, "Nervous but proud");
        assert!(episodes[0].participants.is_none());
    }

    #[test]
    fn episode_accepts_description_alias() {
        let raw = r#"{"summary": "s", "memories": [],
            "episodes": [{"title": "t", "description": "d", "emotionalWeight": 5}]}"#;
        let payload = decode_payload(raw).unwrap();
        assert_eq!(payload.episodes.unwrap()[0].summary, "d");
    }

    #[test]
    fn missing_required_field_is_parse_error() {
        let raw = r#"{"memories": []}"#;
        assert!(matches!(decode_payload(raw), Err(ExtractionError::Parse(_))));

        let raw = r#"{"summary": "s", "memories": [{"type": "fact", "content": "x", "importance": 5}]}"#;
        assert!(matches!(decode_payload(raw), Err(ExtractionError::Parse(_))));
    }

    #[test]
    fn unknown_memory_type_is_parse_error() {
        let raw = r#"{"summary": "s", "memories": [
            {"type": "episode", "content": "x", "importance": 5, "emotionalWeight": 1}]}"#;
        assert!(matches!(decode_payload(raw), Err(ExtractionError::Parse(_))));
    }

    #[test]
    fn wrong_json_type_is_parse_error() {
        let raw = r#"{"summary": "s", "memories": [
            {"type": "fact", "content": "x", "importance": "high", "emotionalWeight": 1}]}"#;
        assert!(matches!(decode_payload(raw), Err(ExtractionError::Parse(_))));
        assert!(matches!(decode_payload("not json"), Err(ExtractionError::Parse(_))));
    }

    #[test]
    fn blank_content_is_parse_error() {
        let raw = r#"{"summary": "s", "memories": [
            {"type": "fact", "content": "   ", "importance": 5, "emotionalWeight": 1}]}"#;
        assert!(matches!(decode_payload(raw), Err(ExtractionError::Parse(_))));
    }

    #[test]
    fn schema_lists_required_fields() {
        let schema = extraction_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&serde_json::json!("summary")));
        assert!(required.contains(&serde_json::json!("memories")));
        assert!(!required.contains(&serde_json::json!("episodes")));
        assert!(schema.get("$schema").is_none());
    }

    #[tokio::test]
    async fn disabled_extractor_fails_as_provider_error() {
        let config = crate::config::ExtractionConfig {
            provider: "none".into(),
            ..Default::default()
        };
        let extractor = create_extractor(&config).unwrap();
        let request = ExtractionRequest::new("Aoi", SummaryType::Daily, "User: hi".into());
        assert!(matches!(extractor.extract(&request).await, Err(ExtractionError::Provider(_))));

        let config = crate::config::ExtractionConfig {
            provider: "llama".into(),
            ..Default::default()
        };
        assert!(create_extractor(&config).is_err());
    }

    #[test]
    fn instructions_mention_partner_and_type() {
        let text = build_instructions("Aoi", SummaryType::Weekly);
        assert!(text.contains("Partner name: Aoi"));
        assert!(text.contains("Summary type: weekly"));
    }
}
