//! OpenAI-compatible model gateway

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

/// Gateway for the OpenAI chat completions API (and compatible endpoints).
pub struct OpenAIGateway {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIGateway {
    /// Create a new OpenAI gateway.
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenAI API key
    /// * `model` - Model name (e.g., "gpt-4o")
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    /// Create with a custom base URL (for Azure OpenAI or compatible APIs).
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
    /// - `OPENAI_API_KEY` - API key (required)
    /// - `OPENAI_MODEL` - Model name (optional, defaults to "gpt-4o")
    /// - `OPENAI_BASE_URL` - Custom base URL (optional)
    ///
    /// # Errors
    ///
    /// Returns an error if OPENAI_API_KEY is not set.
    pub fn from_env(model: Option<impl Into<String>>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EngineError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let model = model
            .map(|m| m.into())
            .or_else(|| std::env::var("OPENAI_MODEL").ok())
            .unwrap_or_else(|| "gpt-4o".to_string());

        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

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

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> OpenAIRequest {
        OpenAIRequest {
            model: self.model.clone(),
            messages: convert_messages(&request.messages),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: Option<OpenAIMessageResponse>,
    delta: Option<OpenAIDelta>,
}

#[derive(Deserialize)]
struct OpenAIMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

#[derive(Deserialize)]
struct OpenAIStreamChunk {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
}

fn convert_messages(messages: &[ChatMessage]) -> Vec<OpenAIMessage> {
    messages
        .iter()
        .map(|m| OpenAIMessage {
            role: match m.role {
                ChatRole::System => "system".to_string(),
                ChatRole::User => "user".to_string(),
                ChatRole::Assistant => "assistant".to_string(),
            },
            content: m.content.clone(),
        })
        .collect()
}

/// Map an HTTP failure status onto the gateway error taxonomy.
fn status_error(status: reqwest::StatusCode, body: &str) -> EngineError {
    let detail = serde_json::from_str::<OpenAIError>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    let detail = format!("OpenAI API error ({}): {}", status, detail);

    if status.as_u16() == 429 {
        EngineError::RateLimited(detail)
    } else if status.is_server_error() {
        EngineError::ModelUnavailable(detail)
    } else {
        EngineError::InvalidRequest(detail)
    }
}

#[async_trait]
impl ModelGateway for OpenAIGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let openai_request = self.build_request(request, false);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                EngineError::ModelUnavailable(format!("failed to reach OpenAI: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status, &text));
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            EngineError::ModelUnavailable(format!("failed to parse OpenAI response: {}", e))
        })?;

        if openai_response.choices.is_empty() {
            return Err(EngineError::ModelUnavailable(
                "OpenAI API returned no choices".to_string(),
            ));
        }

        let text = openai_response.choices[0]
            .message
            .as_ref()
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        let usage = openai_response.usage.map(|u| UsageStats {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(Completion {
            text,
            model_id: openai_response.model.unwrap_or_else(|| self.model.clone()),
            usage,
        })
    }

    async fn stream_complete(&self, request: &CompletionRequest) -> Result<TokenStream> {
        let openai_request = self.build_request(request, true);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| {
                EngineError::ModelUnavailable(format!("failed to reach OpenAI: {}", e))
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

        // Normalize SSE lines into token events. Malformed frames are
        // skipped: backends emit occasional keep-alive or control frames
        // that do not parse as chunks.
        let stream = lines_stream.filter_map(|line_result| match line_result {
            Ok(line) => {
                let data = line.strip_prefix("data: ")?;
                if data == "[DONE]" {
                    return None;
                }

                match serde_json::from_str::<OpenAIStreamChunk>(data) {
                    Ok(chunk) => chunk
                        .choices
                        .first()
                        .and_then(|choice| choice.delta.as_ref())
                        .and_then(|delta| delta.content.clone())
                        .map(Ok),
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
            provider: "openai".to_string(),
            model_id: self.model.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_creation() {
        let gateway = OpenAIGateway::new("test-key", "gpt-4o");
        assert_eq!(gateway.model(), "gpt-4o");
        assert_eq!(gateway.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_gateway_custom_base_url() {
        let gateway =
            OpenAIGateway::with_base_url("test-key", "gpt-4", "https://custom.openai.azure.com");
        assert_eq!(gateway.base_url(), "https://custom.openai.azure.com");
    }

    #[test]
    fn test_from_env_missing() {
        unsafe {
            std::env::remove_var("OPENAI_API_KEY");
        }
        let result = OpenAIGateway::from_env(Some("test-model"));
        assert!(result.is_err());
    }

    #[test]
    fn test_convert_messages() {
        let messages = vec![
            ChatMessage::system("You are helpful"),
            ChatMessage::user("Hello"),
            ChatMessage::assistant("Hi there!"),
        ];

        let converted = convert_messages(&messages);

        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[2].role, "assistant");
    }

    #[test]
    fn test_status_error_taxonomy() {
        use reqwest::StatusCode;

        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            EngineError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream"),
            EngineError::ModelUnavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "bad payload"),
            EngineError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_status_error_parses_error_body() {
        let body = r#"{"error": {"message": "context length exceeded"}}"#;
        let err = status_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(err.to_string().contains("context length exceeded"));
    }

    #[test]
    fn test_model_info() {
        let gateway = OpenAIGateway::new("test-key", "gpt-4o-mini");
        let info = gateway.model_info();
        assert_eq!(info.provider, "openai");
        assert_eq!(info.model_id, "gpt-4o-mini");
    }
}
