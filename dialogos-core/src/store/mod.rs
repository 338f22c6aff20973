//! Conversation Store
//!
//! Owns conversation and message entities: pure CRUD with ordering
//! invariants, no network calls. The store is safe for concurrent access
//! from multiple turns; all mutations go through one writer lock, so
//! message appends on a single conversation can never interleave.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use crate::error::{EngineError, Result};
use crate::llm::ChatRole;

pub mod conversation;

pub use conversation::{
    Conversation, ConversationStatus, ConversationSummary, Message, PLACEHOLDER_TITLE,
    derive_title,
};

/// In-process conversation store
pub struct ConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Create a conversation with a fresh id. Always succeeds.
    pub fn create_conversation(
        &self,
        title: Option<String>,
        kind: Option<String>,
    ) -> Conversation {
        let conversation = Conversation::new(title, kind);
        let mut conversations = self.conversations.write().unwrap();
        conversations.insert(conversation.id.clone(), conversation.clone());
        conversation
    }

    /// Get a conversation by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if the conversation is absent.
    pub fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let conversations = self.conversations.read().unwrap();
        conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| not_found_conversation(conversation_id))
    }

    /// List conversations ordered by most-recent-activity descending,
    /// stable for equal timestamps by id. Returns the page and the total
    /// count before paging.
    pub fn list_conversations(
        &self,
        limit: usize,
        offset: usize,
    ) -> (Vec<ConversationSummary>, usize) {
        let conversations = self.conversations.read().unwrap();

        let mut summaries: Vec<ConversationSummary> =
            conversations.values().map(|c| c.summary()).collect();
        summaries.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = summaries.len();
        let items = summaries.into_iter().skip(offset).take(limit).collect();
        (items, total)
    }

    /// Append a message to the end of a conversation.
    ///
    /// Advances `updated_at` and derives the title from the first user
    /// message when the conversation still carries the placeholder.
    ///
    /// # Errors
    ///
    /// `NotFound` if the conversation is absent.
    pub fn append_message(
        &self,
        conversation_id: &str,
        role: ChatRole,
        content: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Message> {
        let mut message = Message::new(role, content);
        message.metadata = metadata;
        self.append(conversation_id, message)
    }

    /// Append a caller-constructed message (pre-allocated id) to the end of
    /// a conversation, applying the same invariants as [`append_message`].
    ///
    /// [`append_message`]: ConversationStore::append_message
    pub fn append(&self, conversation_id: &str, message: Message) -> Result<Message> {
        let mut conversations = self.conversations.write().unwrap();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| not_found_conversation(conversation_id))?;

        if message.role == ChatRole::User && conversation.title == PLACEHOLDER_TITLE {
            conversation.title = derive_title(&message.content);
        }

        conversation.messages.push(message.clone());
        // updated_at >= every contained message timestamp
        conversation.updated_at = Utc::now().max(message.timestamp);
        Ok(message)
    }

    /// Replace a message's content.
    ///
    /// # Errors
    ///
    /// `NotFound` if either id is absent.
    pub fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        new_content: impl Into<String>,
    ) -> Result<Message> {
        let mut conversations = self.conversations.write().unwrap();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| not_found_conversation(conversation_id))?;

        let message = conversation
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| not_found_message(conversation_id, message_id))?;

        message.content = new_content.into();
        let edited = message.clone();
        conversation.updated_at = Utc::now();
        Ok(edited)
    }

    /// Delete a single message.
    ///
    /// # Errors
    ///
    /// `NotFound` if either id is absent.
    pub fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| not_found_conversation(conversation_id))?;

        let before = conversation.messages.len();
        conversation.messages.retain(|m| m.id != message_id);
        if conversation.messages.len() == before {
            return Err(not_found_message(conversation_id, message_id));
        }

        conversation.updated_at = Utc::now();
        Ok(())
    }

    /// List the messages of a conversation in insertion order.
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conversations = self.conversations.read().unwrap();
        conversations
            .get(conversation_id)
            .map(|c| c.messages.clone())
            .ok_or_else(|| not_found_conversation(conversation_id))
    }

    /// Update the conversation title.
    pub fn update_title(&self, conversation_id: &str, title: impl Into<String>) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| not_found_conversation(conversation_id))?;

        conversation.title = title.into();
        conversation.updated_at = Utc::now();
        Ok(())
    }

    /// Set the conversation status (archive / reactivate).
    pub fn set_status(&self, conversation_id: &str, status: ConversationStatus) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| not_found_conversation(conversation_id))?;

        conversation.status = status;
        conversation.updated_at = Utc::now();
        Ok(())
    }

    /// Delete a conversation and all its messages.
    pub fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let mut conversations = self.conversations.write().unwrap();
        conversations
            .remove(conversation_id)
            .map(|_| ())
            .ok_or_else(|| not_found_conversation(conversation_id))
    }

    /// Number of stored conversations
    pub fn len(&self) -> usize {
        self.conversations.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn not_found_conversation(conversation_id: &str) -> EngineError {
    EngineError::NotFound(format!("conversation {}", conversation_id))
}

fn not_found_message(conversation_id: &str, message_id: &str) -> EngineError {
    EngineError::NotFound(format!(
        "message {} in conversation {}",
        message_id, conversation_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get() {
        let store = ConversationStore::new();
        let created = store.create_conversation(Some("Intro".to_string()), None);

        let fetched = store.get_conversation(&created.id).unwrap();
        assert_eq!(fetched.title, "Intro");
        assert_eq!(fetched.message_count(), 0);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let store = ConversationStore::new();
        let err = store.get_conversation("nope").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_append_preserves_order_and_touches() {
        let store = ConversationStore::new();
        let conversation = store.create_conversation(None, None);

        store
            .append_message(&conversation.id, ChatRole::User, "first", None)
            .unwrap();
        store
            .append_message(&conversation.id, ChatRole::Assistant, "second", None)
            .unwrap();

        let fetched = store.get_conversation(&conversation.id).unwrap();
        assert_eq!(fetched.messages[0].content, "first");
        assert_eq!(fetched.messages[1].content, "second");
        assert!(fetched.updated_at >= fetched.messages[1].timestamp);
        assert!(fetched.updated_at >= fetched.created_at);
    }

    #[test]
    fn test_title_derived_from_first_user_message() {
        let store = ConversationStore::new();
        let conversation = store.create_conversation(None, None);

        store
            .append_message(&conversation.id, ChatRole::User, "Explain recursion", None)
            .unwrap();
        store
            .append_message(&conversation.id, ChatRole::User, "something else", None)
            .unwrap();

        let fetched = store.get_conversation(&conversation.id).unwrap();
        assert_eq!(fetched.title, "Explain recursion");
    }

    #[test]
    fn test_explicit_title_not_overwritten() {
        let store = ConversationStore::new();
        let conversation = store.create_conversation(Some("Pinned".to_string()), None);

        store
            .append_message(&conversation.id, ChatRole::User, "hello", None)
            .unwrap();

        let fetched = store.get_conversation(&conversation.id).unwrap();
        assert_eq!(fetched.title, "Pinned");
    }

    #[test]
    fn test_append_to_missing_conversation() {
        let store = ConversationStore::new();
        let err = store
            .append_message("nope", ChatRole::User, "hello", None)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_edit_message() {
        let store = ConversationStore::new();
        let conversation = store.create_conversation(None, None);
        let message = store
            .append_message(&conversation.id, ChatRole::User, "typo", None)
            .unwrap();

        let edited = store
            .edit_message(&conversation.id, &message.id, "fixed")
            .unwrap();
        assert_eq!(edited.content, "fixed");
        assert_eq!(edited.id, message.id);
        assert_eq!(edited.timestamp, message.timestamp);
    }

    #[test]
    fn test_edit_missing_message() {
        let store = ConversationStore::new();
        let conversation = store.create_conversation(None, None);
        let err = store
            .edit_message(&conversation.id, "nope", "content")
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_delete_message() {
        let store = ConversationStore::new();
        let conversation = store.create_conversation(None, None);
        let message = store
            .append_message(&conversation.id, ChatRole::User, "gone", None)
            .unwrap();

        store.delete_message(&conversation.id, &message.id).unwrap();
        assert_eq!(
            store.get_conversation(&conversation.id).unwrap().message_count(),
            0
        );

        let err = store
            .delete_message(&conversation.id, &message.id)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_list_orders_by_activity_desc() {
        let store = ConversationStore::new();
        let first = store.create_conversation(Some("first".to_string()), None);
        let second = store.create_conversation(Some("second".to_string()), None);

        // Touch the first conversation so it becomes the most recent
        store
            .append_message(&first.id, ChatRole::User, "bump", None)
            .unwrap();

        let (items, total) = store.list_conversations(10, 0);
        assert_eq!(total, 2);
        assert_eq!(items[0].id, first.id);
        assert_eq!(items[1].id, second.id);
    }

    #[test]
    fn test_list_pagination() {
        let store = ConversationStore::new();
        for i in 0..5 {
            store.create_conversation(Some(format!("c{}", i)), None);
        }

        let (page, total) = store.list_conversations(2, 2);
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);

        let (tail, _) = store.list_conversations(10, 4);
        assert_eq!(tail.len(), 1);
    }

    #[test]
    fn test_list_is_idempotent() {
        let store = ConversationStore::new();
        for i in 0..4 {
            store.create_conversation(Some(format!("c{}", i)), None);
        }

        let (a, _) = store.list_conversations(10, 0);
        let (b, _) = store.list_conversations(10, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_archive_and_delete() {
        let store = ConversationStore::new();
        let conversation = store.create_conversation(None, None);

        store
            .set_status(&conversation.id, ConversationStatus::Archived)
            .unwrap();
        assert_eq!(
            store.get_conversation(&conversation.id).unwrap().status,
            ConversationStatus::Archived
        );

        store.delete_conversation(&conversation.id).unwrap();
        assert!(store.get_conversation(&conversation.id).is_err());
        assert!(store.is_empty());
    }
}
