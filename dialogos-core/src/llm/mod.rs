//! Model Gateway abstraction
//!
//! The gateway hides the language-model backend behind two operations: a
//! blocking completion and a streaming completion. Adapters in
//! [`providers`] translate each backend's wire framing into the normalized
//! token sequence the rest of the engine consumes.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;

/// Message role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A role/content pair as handed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Request to a model backend
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Messages in the conversation, system entry first
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature, passed through unchanged
    pub temperature: Option<f32>,

    /// Maximum response length in tokens
    pub max_tokens: Option<usize>,
}

impl CompletionRequest {
    /// Create a request from an already-built message list
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = Some(tokens);
        self
    }
}

/// Response from a blocking completion
#[derive(Debug, Clone)]
pub struct Completion {
    /// Generated text
    pub text: String,

    /// Model that produced the response
    pub model_id: String,

    /// Token usage information, when the backend reports it
    pub usage: Option<UsageStats>,
}

/// Token usage information
#[derive(Debug, Clone)]
pub struct UsageStats {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Normalized token sequence from a streaming completion.
///
/// The stream is lazy, finite and non-restartable. Each `Ok` item is one
/// incremental text fragment in arrival order; stream exhaustion is the
/// normal-completion marker, and an `Err` item is the error marker (nothing
/// follows it).
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub provider: String,
    pub model_id: String,
}

/// Capability over a language-model backend.
///
/// Implementations own the wire protocol of one backend. Any malformed
/// frame in a streaming response is skipped rather than treated as fatal,
/// since backends occasionally emit non-conforming keep-alive or control
/// frames.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Produce the full response in one blocking call.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;

    /// Produce the response as a normalized token stream.
    ///
    /// # Errors
    ///
    /// `ModelUnavailable` if the backend is unreachable or returns a server
    /// error, `RateLimited` on backpressure, `InvalidRequest` for anything
    /// the backend rejects as malformed.
    async fn stream_complete(&self, request: &CompletionRequest) -> Result<TokenStream>;

    /// Get model information
    fn model_info(&self) -> ModelInfo;
}

pub mod factory;
pub mod providers;
pub mod retry;

pub use factory::GatewayFactory;
pub use retry::{RetryConfig, RetryState, with_retry};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new(vec![ChatMessage::user("hello")])
            .with_temperature(0.3)
            .with_max_tokens(256);

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.max_tokens, Some(256));
    }

    #[test]
    fn test_temperature_clamping() {
        let request = CompletionRequest::new(Vec::new()).with_temperature(5.0);
        assert_eq!(request.temperature, Some(2.0));

        let request = CompletionRequest::new(Vec::new()).with_temperature(-1.0);
        assert_eq!(request.temperature, Some(0.0));
    }

    #[test]
    fn test_chat_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChatRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&ChatRole::Assistant).unwrap(),
            "\"assistant\""
        );
    }
}
