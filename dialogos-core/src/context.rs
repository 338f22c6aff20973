//! Context Window Builder
//!
//! Derives the bounded message list sent to the model: one system entry
//! followed by the last N user/assistant messages of the conversation. This
//! is a fixed-size sliding window, not a token-accurate one; it trades
//! precision for O(1) simplicity, and bounds request payload and latency
//! growth as conversations lengthen at the cost of losing older context.

use crate::config::ContextConfig;
use crate::llm::{ChatMessage, ChatRole};
use crate::store::Conversation;

/// Default number of windowed messages
pub const DEFAULT_WINDOW_SIZE: usize = 15;

/// Builds model input from a conversation and a system directive
#[derive(Debug, Clone)]
pub struct ContextWindow {
    system_prompt: String,
    window_size: usize,
}

impl ContextWindow {
    /// Create a builder with the default window size
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }

    /// Set the window size (minimum 1)
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.system_prompt.clone()).with_window_size(config.window_size)
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Produce the exact ordered message list for one model call.
    ///
    /// The conversation is never mutated; this is a pure read. The just-
    /// submitted user message is part of the window because the coordinator
    /// appends it to the store before building context.
    pub fn build(&self, conversation: &Conversation) -> Vec<ChatMessage> {
        let eligible: Vec<&crate::store::Message> = conversation
            .messages
            .iter()
            .filter(|m| matches!(m.role, ChatRole::User | ChatRole::Assistant))
            .collect();

        let start = eligible.len().saturating_sub(self.window_size);

        let mut messages = Vec::with_capacity(1 + eligible.len() - start);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(
            eligible[start..]
                .iter()
                .map(|m| ChatMessage::new(m.role, m.content.clone())),
        );
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConversationStore;

    fn conversation_with_messages(count: usize) -> Conversation {
        let store = ConversationStore::new();
        let conversation = store.create_conversation(None, None);
        for i in 0..count {
            let role = if i % 2 == 0 {
                ChatRole::User
            } else {
                ChatRole::Assistant
            };
            store
                .append_message(&conversation.id, role, format!("message {}", i), None)
                .unwrap();
        }
        store.get_conversation(&conversation.id).unwrap()
    }

    #[test]
    fn test_empty_conversation_yields_system_only() {
        let window = ContextWindow::new("You are helpful");
        let conversation = conversation_with_messages(0);

        let messages = window.build(&conversation);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[0].content, "You are helpful");
    }

    #[test]
    fn test_fewer_than_window_includes_all() {
        let window = ContextWindow::new("sys").with_window_size(15);
        let conversation = conversation_with_messages(6);

        let messages = window.build(&conversation);
        assert_eq!(messages.len(), 7);
        assert_eq!(messages[1].content, "message 0");
        assert_eq!(messages[6].content, "message 5");
    }

    #[test]
    fn test_window_boundedness() {
        // M > N eligible messages: output is exactly the most recent N
        let window = ContextWindow::new("sys").with_window_size(15);
        let conversation = conversation_with_messages(20);

        let messages = window.build(&conversation);
        assert_eq!(messages.len(), 16);
        assert_eq!(messages[1].content, "message 5");
        assert_eq!(messages[15].content, "message 19");
    }

    #[test]
    fn test_original_order_preserved() {
        let window = ContextWindow::new("sys").with_window_size(4);
        let conversation = conversation_with_messages(10);

        let messages = window.build(&conversation);
        let contents: Vec<&str> = messages[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["message 6", "message 7", "message 8", "message 9"]
        );
    }

    #[test]
    fn test_stored_system_messages_excluded() {
        let store = ConversationStore::new();
        let conversation = store.create_conversation(None, None);
        store
            .append_message(&conversation.id, ChatRole::System, "stored directive", None)
            .unwrap();
        store
            .append_message(&conversation.id, ChatRole::User, "hi", None)
            .unwrap();

        let window = ContextWindow::new("configured directive");
        let messages = window.build(&store.get_conversation(&conversation.id).unwrap());

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "configured directive");
        assert_eq!(messages[1].content, "hi");
    }

    #[test]
    fn test_window_size_floor_is_one() {
        let window = ContextWindow::new("sys").with_window_size(0);
        assert_eq!(window.window_size(), 1);
    }
}
