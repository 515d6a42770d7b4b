use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::errors::StoreError;
use crate::domain::ports::PromptStore;

/// Prompt texts keyed by `(category, name)`.
#[derive(Default)]
pub struct InMemoryPromptStore {
    prompts: RwLock<HashMap<(String, String), String>>,
}

impl InMemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a prompt.
    pub async fn set(&self, category: &str, name: &str, content: impl Into<String>) {
        self.prompts
            .write()
            .await
            .insert((category.to_string(), name.to_string()), content.into());
    }

    pub async fn remove(&self, category: &str, name: &str) -> Option<String> {
        self.prompts
            .write()
            .await
            .remove(&(category.to_string(), name.to_string()))
    }
}

#[async_trait]
impl PromptStore for InMemoryPromptStore {
    async fn get(&self, category: &str, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .prompts
            .read()
            .await
            .get(&(category.to_string(), name.to_string()))
            .cloned())
    }
}
