//! OpenAI-compatible chat-completions extractor with a forced tool call.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{extraction_schema, ExtractionError, ExtractionRequest, StructuredExtractor, EXTRACTION_FUNCTION};
use crate::config::ExtractionConfig;

pub struct OpenAiExtractor {
    client: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    request_timeout: Duration,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
    /// Legacy `functions` API shape, still returned by some compatible servers
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    arguments: String,
}

impl OpenAiExtractor {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ExtractionError::Provider(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            request_timeout,
        })
    }

    pub fn from_config(config: &ExtractionConfig) -> anyhow::Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "extraction provider `openai` needs an API key: set RAPPORT_OPENAI_API_KEY or [extraction].api_key"
            )
        })?;
        Ok(Self::new(
            config.base_url.as_str(),
            config.model.as_str(),
            api_key,
            config.request_timeout(),
        )?)
    }

    fn request_body(&self, request: &ExtractionRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.instructions},
                {"role": "user", "content": request.transcript},
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": EXTRACTION_FUNCTION,
                    "description": "Extract important memories from a conversation",
                    "parameters": extraction_schema(),
                }
            }],
            "tool_choice": {"type": "function", "function": {"name": EXTRACTION_FUNCTION}},
        })
    }
}

#[async_trait]
impl StructuredExtractor for OpenAiExtractor {
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, transcript_len = request.transcript.len(), "calling extraction API");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExtractionError::Timeout(self.request_timeout)
                } else {
                    ExtractionError::Provider(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExtractionError::RateLimited);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Auth(format!("HTTP {status}: {body}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Provider(format!("HTTP {status}: {body}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;

        let message = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ExtractionError::Parse("no choices in response".into()))?;

        message
            .tool_calls
            .into_iter()
            .next()
            .map(|call| call.function)
            .or(message.function_call)
            .map(|f| f.arguments)
            .ok_or_else(|| ExtractionError::Parse("response contained no function call".into()))
    }
}
