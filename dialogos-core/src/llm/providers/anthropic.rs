//! Anthropic (Claude) model gateway

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncBufReadExt;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;

use crate::error::{EngineError, Result};
use crate::llm::{
    ChatMessage, ChatRole, Completion, CompletionRequest, ModelGateway, ModelInfo, TokenStream,
    UsageStats,
};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default maximum response length; the messages API requires one
const DEFAULT_MAX_TOKENS: usize = 1024;

/// Gateway for the Anthropic messages API.
pub struct AnthropicGateway {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicGateway {
    /// Create a new Anthropic gateway.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Anthropic API key
    /// * `model` - Model name (e.g., "claude-sonnet-4-5")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
        }
    }

    /// Create with a custom base URL.
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    /// Create from environment variables.
    ///
    /// Reads from:
    /// - `ANTHROPIC_API_KEY` - API key (required)
    /// - `ANTHROPIC_MODEL` - Model name (optional, defaults to "claude-sonnet-4-5")
    /// - `ANTHROPIC_BASE_URL` - Custom base URL (optional)
    ///
    /// # Errors
    ///
    /// Returns an error if ANTHROPIC_API_KEY is not set.
    pub fn from_env(model: Option<impl Into<String>>) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            EngineError::Configuration("ANTHROPIC_API_KEY environment variable not set".to_string())
        })?;

        let model = model
            .map(|m| m.into())
            .or_else(|| std::env::var("ANTHROPIC_MODEL").ok())
            .unwrap_or_else(|| "claude-sonnet-4-5".to_string());

        let base_url = std::env::var("ANTHROPIC_BASE_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1".to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        })
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        let (system, messages) = convert_messages(&request.messages);
        AnthropicRequest {
            model: self.model.clone(),
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            stream,
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    model: Option<String>,
    content: Vec<AnthropicContent>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[derive(Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<AnthropicDelta>,
}

#[derive(Deserialize)]
struct AnthropicDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

/// Split the normalized message list into Anthropic's shape: system text is
/// a top-level field, the message array carries only user/assistant turns.
fn convert_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
    let system = messages
        .iter()
        .filter(|m| m.role == ChatRole::System)
        .map(|m| m.content.clone())
        .collect::<Vec<_>>();
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n"))
    };

    let converted = messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| AnthropicMessage {
            role: match m.role {
                ChatRole::User => "user".to_string(),
                _ => "assistant".to_string(),
            },
            content: m.content.clone(),
        })
        .collect();

    (system, converted)
}

fn status_error(status: reqwest::StatusCode, body: &str) -> EngineError {
    let detail = serde_json::from_str::<AnthropicError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    let detail = format!("Anthropic API error ({}): {}", status, detail);

    if status.as_u16() == 429 {
        EngineError::RateLimited(detail)
    } else if status.is_server_error() {
        EngineError::ModelUnavailable(detail)
    } else {
        EngineError::InvalidRequest(detail)
    }
}

#[async_trait]
impl ModelGateway for AnthropicGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let anthropic_request = self.build_request(request, false);
        let url = format!("{}/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| {
                EngineError::ModelUnavailable(format!("failed to reach Anthropic: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, &text));
        }

        let anthropic_response: AnthropicResponse = response.json().await.map_err(|e| {
            EngineError::ModelUnavailable(format!("failed to parse Anthropic response: {}", e))
        })?;

        // Extract text from content blocks
        let text = anthropic_response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text.clone())
            .collect::<Vec<_>>()
            .join("");

        let usage = anthropic_response.usage.map(|u| UsageStats {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        Ok(Completion {
            text,
            model_id: anthropic_response
                .model
                .unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }

    async fn stream_complete(&self, request: &CompletionRequest) -> Result<TokenStream> {
        let anthropic_request = self.build_request(request, true);
        let url = format!("{}/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| {
                EngineError::ModelUnavailable(format!("failed to reach Anthropic: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, &text));
        }

        // Convert response bytes to a stream of lines
        let bytes_stream = response.bytes_stream();
        let reader = tokio_util::io::StreamReader::new(
            bytes_stream.map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))),
        );
        let lines = tokio::io::BufReader::new(reader).lines();
        let lines_stream = LinesStream::new(lines);

        // Normalize SSE lines into token events. Only content_block_delta
        // frames carry text; everything else (event: lines, pings,
        // malformed frames) is skipped.
        let stream = lines_stream.filter_map(|line_result| match line_result {
            Ok(line) => {
                let data = line.strip_prefix("data: ")?;

                match serde_json::from_str::<AnthropicStreamEvent>(data) {
                    Ok(event) if event.event_type == "content_block_delta" => event
                        .delta
                        .filter(|d| d.delta_type.as_deref() == Some("text_delta"))
                        .and_then(|d| d.text)
                        .map(Ok),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping malformed stream frame");
                        None
                    }
                }
            }
            Err(e) => Some(Err(EngineError::ModelUnavailable(format!(
                "stream read error: {}",
                e
            )))),
        });

        Ok(Box::pin(stream))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "anthropic".to_string(),
            model_id: self.model.clone(),
        }
    }
}
