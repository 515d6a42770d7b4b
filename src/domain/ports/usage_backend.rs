//! Storage port for rate-limit usage events.

use async_trait::async_trait;

use crate::domain::errors::UsageStoreError;
use crate::domain::models::{Identity, WindowCounts};

/// Where usage events live. Implementations must not lose concurrent
/// records for the same identity.
#[async_trait]
pub trait UsageBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// True when several processes share this backend.
    fn is_distributed(&self) -> bool;

    /// Counts inside the minute and day windows, dropping anything older.
    async fn window_counts(&self, identity: &Identity) -> Result<WindowCounts, UsageStoreError>;

    /// Append one completed request.
    async fn record(&self, identity: &Identity, tokens: u64) -> Result<(), UsageStoreError>;

    /// Drop expired events and empty identities; returns identities removed.
    async fn prune(&self) -> Result<usize, UsageStoreError>;
}
