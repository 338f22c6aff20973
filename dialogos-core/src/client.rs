//! Client Stream Reducer
//!
//! Client-side state machine for one conversation's rendered message list.
//! Applies fragments and completion/error events as they arrive without
//! corrupting displayed history, and guards against stale or duplicate
//! events from an earlier turn.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::llm::ChatRole;
use crate::store::Message;
use crate::transport::EventFrame;

/// A message as rendered by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,

    /// Error annotation for a turn that failed after partial output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Ids allocated when a turn begins
#[derive(Debug, Clone)]
pub struct BegunTurn {
    pub user_message_id: String,
    pub assistant_message_id: String,
}

/// One conversation's message list plus the streaming marker.
#[derive(Debug, Clone)]
pub struct ConversationView {
    conversation_id: String,
    messages: Vec<ViewMessage>,
    streaming_message_id: Option<String>,
}

impl ConversationView {
    /// Create an empty view
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: Vec::new(),
            streaming_message_id: None,
        }
    }

    /// Seed a view from a store snapshot
    pub fn from_messages(conversation_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: messages
                .into_iter()
                .map(|m| ViewMessage {
                    id: m.id,
                    role: m.role,
                    content: m.content,
                    error: None,
                    metadata: m.metadata,
                })
                .collect(),
            streaming_message_id: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn messages(&self) -> &[ViewMessage] {
        &self.messages
    }

    pub fn streaming_message_id(&self) -> Option<&str> {
        self.streaming_message_id.as_deref()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming_message_id.is_some()
    }

    /// Start a turn: optimistically append the user message and an empty
    /// assistant placeholder, and mark the placeholder as streaming.
    ///
    /// # Errors
    ///
    /// `TurnInProgress` if a turn is already streaming; the message list is
    /// left untouched.
    pub fn begin_turn(&mut self, user_text: impl Into<String>) -> Result<BegunTurn> {
        if self.streaming_message_id.is_some() {
            return Err(EngineError::TurnInProgress(self.conversation_id.clone()));
        }

        let user_message_id = uuid::Uuid::new_v4().to_string();
        let assistant_message_id = uuid::Uuid::new_v4().to_string();

        self.messages.push(ViewMessage {
            id: user_message_id.clone(),
            role: ChatRole::User,
            content: user_text.into(),
            error: None,
            metadata: None,
        });
        self.messages.push(ViewMessage {
            id: assistant_message_id.clone(),
            role: ChatRole::Assistant,
            content: String::new(),
            error: None,
            metadata: None,
        });
        self.streaming_message_id = Some(assistant_message_id.clone());

        Ok(BegunTurn {
            user_message_id,
            assistant_message_id,
        })
    }

    /// Append a fragment to the streaming placeholder in place.
    ///
    /// A no-op when `message_id` does not match the current placeholder;
    /// stale or duplicate events must not corrupt history.
    pub fn apply_fragment(&mut self, message_id: &str, fragment: &str) {
        if self.streaming_message_id.as_deref() != Some(message_id) {
            return;
        }
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.content.push_str(fragment);
        }
    }

    /// Finish the streaming turn, merging any final metadata.
    pub fn complete_turn(&mut self, message_id: &str, final_metadata: Option<serde_json::Value>) {
        if self.streaming_message_id.as_deref() != Some(message_id) {
            return;
        }
        self.streaming_message_id = None;
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            if let Some(metadata) = final_metadata {
                message.metadata = Some(metadata);
            }
        }
    }

    /// Fail the streaming turn.
    ///
    /// A placeholder with partial content is kept and annotated rather
    /// than deleted; an empty placeholder is removed entirely.
    pub fn fail_turn(&mut self, message_id: &str, reason: impl Into<String>) {
        if self.streaming_message_id.as_deref() != Some(message_id) {
            return;
        }
        self.streaming_message_id = None;

        let Some(index) = self.messages.iter().position(|m| m.id == message_id) else {
            return;
        };

        if self.messages[index].content.is_empty() {
            self.messages.remove(index);
        } else {
            self.messages[index].error = Some(reason.into());
        }
    }

    /// Apply one transport frame against the streaming placeholder.
    pub fn apply_frame(&mut self, message_id: &str, frame: EventFrame) {
        match frame {
            EventFrame::Fragment { text } => self.apply_fragment(message_id, &text),
            EventFrame::Done => self.complete_turn(message_id, None),
            EventFrame::Error { reason } => self.fail_turn(message_id, reason),
        }
    }
}
