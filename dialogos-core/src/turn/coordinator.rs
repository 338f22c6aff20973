//! Turn orchestration state machine

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::{GatewayConfig, TurnConfig};
use crate::context::ContextWindow;
use crate::error::{EngineError, Result};
use crate::llm::{ChatRole, CompletionRequest, ModelGateway, RetryConfig, with_retry};
use crate::store::{Conversation, ConversationStore, Message};
use crate::transport::TurnTransport;

/// State of one turn.
///
/// `Completed` and `Failed` are terminal. A turn that persisted any
/// assistant text is `Completed` even when the stream ended early; `Failed`
/// means nothing was saved and the cause was an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Building,
    Streaming,
    Finalizing,
    Completed,
    Failed,
}

/// One inbound turn request
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Existing conversation, or `None` to create one as part of the turn
    pub conversation_id: Option<String>,

    /// The user's message text
    pub message: String,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            conversation_id: None,
            message: message.into(),
        }
    }

    pub fn on_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Result of a finished turn
#[derive(Debug)]
pub struct TurnOutcome {
    pub conversation_id: String,

    /// The persisted user message
    pub user_message: Message,

    /// The persisted assistant message, absent when no text was gathered
    pub assistant_message: Option<Message>,

    /// Terminal state: `Completed` or `Failed`
    pub state: TurnState,

    /// The model error, when one terminated the turn (present even for
    /// `Completed` turns that saved a partial answer)
    pub error: Option<EngineError>,
}

/// Transient state for one in-flight streaming turn.
///
/// Exclusively owned by the coordinator call handling the turn; partial
/// text lives only here until finalization and is never persisted as a
/// half-written message.
struct StreamingTurn {
    conversation_id: String,
    user_message_id: String,
    assistant_message_id: String,
    accumulated: String,
    state: TurnState,
}

impl StreamingTurn {
    fn new(conversation_id: String) -> Self {
        Self {
            conversation_id,
            user_message_id: String::new(),
            // Pre-allocated so a placeholder can render before the first
            // token arrives.
            assistant_message_id: uuid::Uuid::new_v4().to_string(),
            accumulated: String::new(),
            state: TurnState::Building,
        }
    }
}

/// Orchestrates conversational turns against one store and one gateway.
pub struct StreamCoordinator {
    store: Arc<ConversationStore>,
    gateway: Arc<dyn ModelGateway>,
    window: ContextWindow,
    config: TurnConfig,
    retry: RetryConfig,
    temperature: Option<f32>,
    max_response_tokens: Option<usize>,
    in_flight: Mutex<HashSet<String>>,
}

impl StreamCoordinator {
    pub fn new(
        store: Arc<ConversationStore>,
        gateway: Arc<dyn ModelGateway>,
        window: ContextWindow,
        config: TurnConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            window,
            config,
            retry: RetryConfig::default(),
            temperature: None,
            max_response_tokens: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Builder: set the retry policy for opening gateway calls
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Builder: take sampling parameters and retry attempts from gateway
    /// configuration; they pass through to the backend unchanged
    pub fn with_gateway_config(mut self, config: &GatewayConfig) -> Self {
        self.temperature = config.temperature;
        self.max_response_tokens = config.max_response_tokens;
        self.retry = RetryConfig::default().with_max_attempts(config.max_retries.max(1));
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Run one streaming turn to a terminal state.
    ///
    /// Tokens are forwarded to `transport` in arrival order, one write per
    /// token. Client disconnect (a failed transport write), explicit
    /// cancellation, and turn timeout all finalize early with whatever text
    /// has been gathered; "cancelled" is never "lost".
    ///
    /// # Errors
    ///
    /// Errors before the user message is appended (`InvalidRequest`,
    /// `NotFound`, `TurnInProgress`) abort with no side effects. Anything
    /// later resolves through finalization and is reported in the returned
    /// [`TurnOutcome`] instead.
    pub async fn run_streaming_turn(
        &self,
        request: TurnRequest,
        transport: &mut dyn TurnTransport,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let (conversation_id, _guard) = self.admit(&request)?;
        let mut turn = StreamingTurn::new(conversation_id);

        // Building: the user's message is durable before any model call,
        // so a crash mid-stream never loses the user's input.
        let user_message = self.store.append_message(
            &turn.conversation_id,
            ChatRole::User,
            request.message.trim(),
            None,
        )?;
        turn.user_message_id = user_message.id.clone();
        tracing::debug!(
            conversation = %turn.conversation_id,
            user_message = %turn.user_message_id,
            state = ?turn.state,
            "turn building"
        );

        let conversation = self.store.get_conversation(&turn.conversation_id)?;
        let completion_request = self.completion_request(&conversation);

        let stream = with_retry(&self.retry, || {
            self.gateway.stream_complete(&completion_request)
        })
        .await;

        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                // No tokens were produced: nothing to persist, the turn
                // fails outright.
                turn.state = TurnState::Failed;
                tracing::warn!(
                    conversation = %turn.conversation_id,
                    error = %e,
                    "turn failed before first token"
                );
                let _ = transport.send_error(&e.to_string()).await;
                return Ok(TurnOutcome {
                    conversation_id: turn.conversation_id,
                    user_message,
                    assistant_message: None,
                    state: TurnState::Failed,
                    error: Some(e),
                });
            }
        };

        turn.state = TurnState::Streaming;
        tracing::debug!(
            conversation = %turn.conversation_id,
            state = ?turn.state,
            "gateway stream open"
        );
        let mut terminal_error: Option<EngineError> = None;
        let mut disconnected = false;

        let deadline = tokio::time::sleep(self.config.turn_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    tracing::warn!(conversation = %turn.conversation_id, "turn timeout, finalizing early");
                    disconnected = true;
                    break;
                }
                _ = cancel.cancelled() => {
                    tracing::debug!(conversation = %turn.conversation_id, "turn cancelled, finalizing early");
                    disconnected = true;
                    break;
                }
                item = stream.next() => {
                    match item {
                        Some(Ok(fragment)) => {
                            turn.accumulated.push_str(&fragment);
                            if transport.send(&fragment).await.is_err() {
                                tracing::debug!(
                                    conversation = %turn.conversation_id,
                                    "client disconnected, finalizing early"
                                );
                                disconnected = true;
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            terminal_error = Some(e);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        // Cooperative cancellation: dropping the token stream aborts the
        // in-flight backend request instead of draining it.
        drop(stream);

        turn.state = TurnState::Finalizing;
        let incomplete = disconnected || terminal_error.is_some();
        let assistant_message = self.finalize(&turn, incomplete)?;

        if !disconnected {
            match &terminal_error {
                Some(e) => {
                    let _ = transport.send_error(&e.to_string()).await;
                }
                None => {
                    let _ = transport.close().await;
                }
            }
        }

        let state = if assistant_message.is_none() && terminal_error.is_some() {
            TurnState::Failed
        } else {
            TurnState::Completed
        };
        tracing::info!(
            conversation = %turn.conversation_id,
            user_message = %turn.user_message_id,
            state = ?state,
            chars = turn.accumulated.len(),
            "turn finalized"
        );

        Ok(TurnOutcome {
            conversation_id: turn.conversation_id,
            user_message,
            assistant_message,
            state,
            error: terminal_error,
        })
    }

    /// Run one non-streaming turn: same persistence discipline, single
    /// blocking gateway call.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome> {
        let (conversation_id, _guard) = self.admit(&request)?;

        let user_message = self.store.append_message(
            &conversation_id,
            ChatRole::User,
            request.message.trim(),
            None,
        )?;

        let conversation = self.store.get_conversation(&conversation_id)?;
        let completion_request = self.completion_request(&conversation);

        match with_retry(&self.retry, || self.gateway.complete(&completion_request)).await {
            Ok(completion) => {
                let assistant_message = if completion.text.is_empty() {
                    None
                } else {
                    let message = Message::new(ChatRole::Assistant, completion.text)
                        .with_metadata(serde_json::json!({ "model": completion.model_id }));
                    Some(self.store.append(&conversation_id, message)?)
                };

                Ok(TurnOutcome {
                    conversation_id,
                    user_message,
                    assistant_message,
                    state: TurnState::Completed,
                    error: None,
                })
            }
            Err(e) => {
                tracing::warn!(conversation = %conversation_id, error = %e, "turn failed");
                Ok(TurnOutcome {
                    conversation_id,
                    user_message,
                    assistant_message: None,
                    state: TurnState::Failed,
                    error: Some(e),
                })
            }
        }
    }

    /// Validate the request, resolve the conversation, and claim the
    /// per-conversation turn slot. No state is mutated on failure.
    fn admit(&self, request: &TurnRequest) -> Result<(String, InFlightGuard<'_>)> {
        if request.message.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }

        let conversation_id = match &request.conversation_id {
            Some(id) => self.store.get_conversation(id)?.id,
            None => self.store.create_conversation(None, None).id,
        };

        let guard = self.acquire_turn(&conversation_id)?;
        Ok((conversation_id, guard))
    }

    fn acquire_turn(&self, conversation_id: &str) -> Result<InFlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap();
        if !in_flight.insert(conversation_id.to_string()) {
            return Err(EngineError::TurnInProgress(conversation_id.to_string()));
        }
        Ok(InFlightGuard {
            coordinator: self,
            conversation_id: conversation_id.to_string(),
        })
    }

    fn completion_request(&self, conversation: &Conversation) -> CompletionRequest {
        let mut request = CompletionRequest::new(self.window.build(conversation));
        request.temperature = self.temperature;
        request.max_tokens = self.max_response_tokens;
        request
    }

    /// Persist the accumulated text exactly once, regardless of how the
    /// turn ended. Empty accumulations persist nothing.
    fn finalize(&self, turn: &StreamingTurn, incomplete: bool) -> Result<Option<Message>> {
        if turn.accumulated.is_empty() {
            return Ok(None);
        }

        let info = self.gateway.model_info();
        let mut metadata = serde_json::json!({
            "model": info.model_id,
            "provider": info.provider,
        });
        if incomplete {
            metadata["incomplete"] = serde_json::Value::Bool(true);
        }

        let message = Message::with_id(
            turn.assistant_message_id.clone(),
            ChatRole::Assistant,
            turn.accumulated.clone(),
        )
        .with_metadata(metadata);

        self.store.append(&turn.conversation_id, message).map(Some)
    }
}

/// Releases the per-conversation turn slot when the turn ends, by any path.
struct InFlightGuard<'a> {
    coordinator: &'a StreamCoordinator,
    conversation_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.coordinator.in_flight.lock().unwrap();
        in_flight.remove(&self.conversation_id);
    }
}
