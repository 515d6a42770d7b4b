//! Process-local usage backend.
//!
//! Single-process only: counts are not shared between replicas. Use the
//! Redis backend when more than one gateway process serves traffic.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::domain::errors::UsageStoreError;
use crate::domain::models::{Identity, UsageEvent, WindowCounts, DAY_WINDOW};
use crate::domain::ports::{Clock, UsageBackend};

/// Per-identity event lists. Each bucket is mutated under its map shard
/// lock, so concurrent records for one identity are never lost.
pub struct InMemoryUsageBackend {
    buckets: DashMap<Identity, VecDeque<UsageEvent>>,
    clock: Arc<dyn Clock>,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl InMemoryUsageBackend {
    pub fn new(clock: Arc<dyn Clock>, sweep_interval: Duration) -> Self {
        let now = clock.now();
        Self {
            buckets: DashMap::new(),
            clock,
            sweep_interval,
            last_sweep: Mutex::new(now),
        }
    }

    /// Identities currently holding events.
    pub fn tracked_identities(&self) -> usize {
        self.buckets.len()
    }

    fn drop_expired(events: &mut VecDeque<UsageEvent>, now: Instant) {
        while events
            .front()
            .is_some_and(|e| now.saturating_duration_since(e.recorded_at) >= DAY_WINDOW)
        {
            events.pop_front();
        }
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, events| {
            Self::drop_expired(events, now);
            !events.is_empty()
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Sweep at most once per interval, piggybacking on normal traffic.
    fn maybe_sweep(&self, now: Instant) {
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if now.saturating_duration_since(*last) < self.sweep_interval {
                return;
            }
            *last = now;
        }

        let removed = self.sweep(now);
        if removed > 0 {
            debug!(removed, "Swept idle rate-limit identities");
        }
    }
}

#[async_trait]
impl UsageBackend for InMemoryUsageBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_distributed(&self) -> bool {
        false
    }

    async fn window_counts(&self, identity: &Identity) -> Result<WindowCounts, UsageStoreError> {
        let now = self.clock.now();
        self.maybe_sweep(now);

        let mut counts = WindowCounts::default();
        if let Some(mut events) = self.buckets.get_mut(identity) {
            Self::drop_expired(&mut events, now);
            for event in events.iter() {
                counts.add(now.saturating_duration_since(event.recorded_at), event.tokens);
            }
        }
        Ok(counts)
    }

    async fn record(&self, identity: &Identity, tokens: u64) -> Result<(), UsageStoreError> {
        let now = self.clock.now();
        self.buckets
            .entry(identity.clone())
            .or_default()
            .push_back(UsageEvent::new(now, tokens));
        Ok(())
    }

    async fn prune(&self) -> Result<usize, UsageStoreError> {
        Ok(self.sweep(self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::MockClock;

    fn backend(clock: &MockClock) -> InMemoryUsageBackend {
        InMemoryUsageBackend::new(Arc::new(clock.clone()), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_counts_split_by_window() {
        let clock = MockClock::default();
        let backend = backend(&clock);
        let id = Identity::User("7".into());

        backend.record(&id, 100).await.unwrap();
        clock.advance(Duration::from_secs(61));
        backend.record(&id, 20).await.unwrap();

        let counts = backend.window_counts(&id).await.unwrap();
        assert_eq!(counts.requests_minute, 1);
        assert_eq!(counts.tokens_minute, 20);
        assert_eq!(counts.requests_day, 2);
        assert_eq!(counts.tokens_day, 120);
    }

    #[tokio::test]
    async fn test_events_expire_after_a_day() {
        let clock = MockClock::default();
        let backend = backend(&clock);
        let id = Identity::Anonymous;

        backend.record(&id, 5).await.unwrap();
        clock.advance(DAY_WINDOW);

        assert_eq!(backend.window_counts(&id).await.unwrap(), WindowCounts::default());
    }

    #[tokio::test]
    async fn test_prune_removes_idle_identities() {
        let clock = MockClock::default();
        let backend = backend(&clock);

        backend.record(&Identity::Ip("1.1.1.1".into()), 1).await.unwrap();
        clock.advance(Duration::from_secs(3600));
        backend.record(&Identity::Ip("2.2.2.2".into()), 1).await.unwrap();
        clock.advance(DAY_WINDOW - Duration::from_secs(1800));

        assert_eq!(backend.prune().await.unwrap(), 1);
        assert_eq!(backend.tracked_identities(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_records_are_not_lost() {
        let backend = Arc::new(InMemoryUsageBackend::new(
            Arc::new(MockClock::default()),
            Duration::from_secs(300),
        ));
        let id = Identity::User("busy".into());

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let backend = Arc::clone(&backend);
                let id = id.clone();
                tokio::spawn(async move { backend.record(&id, 1).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let counts = backend.window_counts(&id).await.unwrap();
        assert_eq!(counts.requests_day, 50);
    }
}
