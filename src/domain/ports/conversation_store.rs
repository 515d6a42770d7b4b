use async_trait::async_trait;
use serde_json::Value;

use crate::domain::errors::StoreError;
use crate::domain::models::{Conversation, Role, StoredMessage, UserContext};

/// Persistence for conversations and their messages.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation and return its id.
    async fn create(&self, owner: Option<&str>, context: &UserContext)
        -> Result<String, StoreError>;

    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError>;

    /// Append a message and return its id.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<String, StoreError>;

    /// The newest `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Every message of a conversation, oldest first.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError>;

    /// Active conversations of `owner`, most recently updated first.
    async fn list_for_owner(&self, owner: &str, limit: usize)
        -> Result<Vec<Conversation>, StoreError>;

    /// Mark a conversation archived. Returns false when it does not exist.
    async fn archive(&self, conversation_id: &str) -> Result<bool, StoreError>;
}
