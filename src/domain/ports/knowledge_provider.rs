use async_trait::async_trait;

use crate::domain::errors::StoreError;
use crate::domain::models::Resource;

/// Ranked knowledge-base search.
#[async_trait]
pub trait KnowledgeProvider: Send + Sync {
    /// Up to `limit` resources, best match first.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Resource>, StoreError>;
}
