//! Conversation and message entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::ChatRole;

/// Title assigned to a conversation until the first user message arrives
pub const PLACEHOLDER_TITLE: &str = "New conversation";

const TITLE_MAX_CHARS: usize = 40;

/// Derive a conversation title from the first user message.
///
/// Takes the first 40 characters on a char boundary, with an ellipsis when
/// the message is longer. Pure function, no coupling to request handling.
pub fn derive_title(first_user_message: &str) -> String {
    let trimmed = first_user_message.trim();
    if trimmed.is_empty() {
        return PLACEHOLDER_TITLE.to_string();
    }

    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head.trim_end())
    }
}

/// Conversation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Archived,
}

/// A single message within a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the conversation
    pub id: String,

    pub role: ChatRole,

    /// Mutable only via an explicit edit operation
    pub content: String,

    /// Creation time; immutable
    pub timestamp: DateTime<Utc>,

    /// Opaque to the engine, passed through unchanged (model id, generation
    /// parameters, user feedback)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Message {
    /// Create a message with a fresh id and timestamp
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), role, content)
    }

    /// Create a message with a caller-supplied id (pre-allocated ids for
    /// streaming turns)
    pub fn with_id(id: impl Into<String>, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A conversation: ordered, append-only message sequence plus bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,

    pub title: String,

    /// Optional caller-defined conversation kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    pub status: ConversationStatus,

    pub created_at: DateTime<Utc>,

    /// Advances on every appended message; never behind a contained
    /// message's timestamp
    pub updated_at: DateTime<Utc>,

    /// Insertion order is significant and never reordered
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Create an empty conversation with a fresh id
    pub fn new(title: Option<String>, kind: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
            kind,
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Most-recent-activity key used for listing order
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Listing-friendly view without the message bodies
    pub fn summary(&self) -> ConversationSummary {
        ConversationSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            kind: self.kind.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
        }
    }
}

/// Conversation metadata without messages, as returned by listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub status: ConversationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_short_message() {
        assert_eq!(derive_title("Explain recursion"), "Explain recursion");
    }

    #[test]
    fn test_derive_title_trims_whitespace() {
        assert_eq!(derive_title("  hello  "), "hello");
    }

    #[test]
    fn test_derive_title_truncates_long_message() {
        let long = "a".repeat(100);
        let title = derive_title(&long);
        assert_eq!(title, format!("{}...", "a".repeat(40)));
    }

    #[test]
    fn test_derive_title_char_boundary() {
        // Multi-byte characters must not be split
        let long = "é".repeat(50);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), 43); // 40 chars + "..."
    }

    #[test]
    fn test_derive_title_empty_falls_back() {
        assert_eq!(derive_title("   "), PLACEHOLDER_TITLE);
    }

    #[test]
    fn test_new_conversation_defaults() {
        let conversation = Conversation::new(None, None);
        assert_eq!(conversation.title, PLACEHOLDER_TITLE);
        assert_eq!(conversation.status, ConversationStatus::Active);
        assert_eq!(conversation.created_at, conversation.updated_at);
        assert!(conversation.messages.is_empty());
    }

    #[test]
    fn test_message_timestamps_are_set() {
        let message = Message::new(ChatRole::User, "hello");
        assert!(!message.id.is_empty());
        assert!(message.metadata.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ConversationStatus::Archived).unwrap(),
            "\"archived\""
        );
    }
}
