use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::StoreError;
use crate::domain::models::{Conversation, ConversationStatus, Role, StoredMessage, UserContext};
use crate::domain::ports::ConversationStore;

struct ConversationRecord {
    conversation: Conversation,
    messages: Vec<StoredMessage>,
}

/// Conversation store kept in process memory; for development and tests.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, ConversationRecord>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message of a conversation, oldest first.
    pub async fn messages(&self, conversation_id: &str) -> Vec<StoredMessage> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .map(|record| record.messages.clone())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, owner: Option<&str>, context: &UserContext) -> Result<String, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            owner: owner.map(str::to_string),
            context: context.clone(),
            status: ConversationStatus::Active,
            created_at: now,
            updated_at: now,
        };
        let id = conversation.id.clone();

        self.conversations.write().await.insert(
            id.clone(),
            ConversationRecord {
                conversation,
                messages: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(conversation_id)
            .map(|record| record.conversation.clone()))
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<String, StoreError> {
        let mut conversations = self.conversations.write().await;
        let record = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::NotFound(format!("conversation {conversation_id}")))?;

        let now = Utc::now();
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.to_string(),
            metadata,
            created_at: now,
        };
        let id = message.id.clone();
        record.messages.push(message);
        record.conversation.updated_at = now;
        Ok(id)
    }

    async fn recent_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let conversations = self.conversations.read().await;
        let Some(record) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let skip = record.messages.len().saturating_sub(limit);
        Ok(record.messages[skip..].to_vec())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self.messages(conversation_id).await)
    }

    async fn list_for_owner(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let conversations = self.conversations.read().await;
        let mut owned: Vec<Conversation> = conversations
            .values()
            .map(|record| &record.conversation)
            .filter(|c| c.owner.as_deref() == Some(owner) && c.status == ConversationStatus::Active)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        owned.truncate(limit);
        Ok(owned)
    }

    async fn archive(&self, conversation_id: &str) -> Result<bool, StoreError> {
        let mut conversations = self.conversations.write().await;
        let Some(record) = conversations.get_mut(conversation_id) else {
            return Ok(false);
        };
        record.conversation.status = ConversationStatus::Archived;
        record.conversation.updated_at = Utc::now();
        Ok(true)
    }
}
