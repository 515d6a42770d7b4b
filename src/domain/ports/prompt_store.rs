use async_trait::async_trait;

use crate::domain::errors::StoreError;

/// Editable prompt text, addressed by category and name.
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Active text for the prompt, or `None` when it does not exist.
    async fn get(&self, category: &str, name: &str) -> Result<Option<String>, StoreError>;
}
