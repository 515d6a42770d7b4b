//! Redis-backed usage backend for multi-process deployments.
//!
//! ## Layout
//!
//! One sorted set per identity at `{prefix}{identity}`:
//! - score: wall-clock milliseconds of the request
//! - member: `{millis}:{tokens}:{uuid}` so equal timestamps never collide
//! - TTL: day window plus a minute, refreshed on every record
//!
//! Counting trims members older than the day window and folds the rest into
//! minute/day counts in one round trip. Wall-clock time is used because the
//! set is shared between processes.

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::errors::UsageStoreError;
use crate::domain::models::{Identity, WindowCounts};
use crate::domain::ports::UsageBackend;

const DAY_MS: i64 = 86_400_000;
const KEY_TTL_SECS: i64 = 86_400 + 60;

/// Configuration for the Redis backend.
#[derive(Debug, Clone)]
pub struct RedisUsageConfig {
    /// Key prefix (default: "ratelimit:")
    pub key_prefix: String,
}

impl Default for RedisUsageConfig {
    fn default() -> Self {
        Self {
            key_prefix: "ratelimit:".to_string(),
        }
    }
}

pub struct RedisUsageBackend {
    connection: ConnectionManager,
    config: RedisUsageConfig,
}

impl fmt::Debug for RedisUsageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisUsageBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn command_error(err: RedisError) -> UsageStoreError {
    UsageStoreError::Command(err.to_string())
}

/// Token count encoded in a member; malformed members count as zero tokens.
fn member_tokens(member: &str) -> u64 {
    member
        .split(':')
        .nth(1)
        .and_then(|t| t.parse().ok())
        .unwrap_or(0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn age_of(score: f64, now_ms: i64) -> Duration {
    let age_ms = (now_ms - score as i64).max(0);
    Duration::from_millis(age_ms as u64)
}

impl RedisUsageBackend {
    /// Connect to Redis.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str, config: RedisUsageConfig) -> Result<Self, UsageStoreError> {
        let client = Client::open(url).map_err(|e| UsageStoreError::Connection(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| UsageStoreError::Connection(e.to_string()))?;

        Ok(Self { connection, config })
    }

    fn key(&self, identity: &Identity) -> String {
        format!("{}{}", self.config.key_prefix, identity.key())
    }
}

#[async_trait]
impl UsageBackend for RedisUsageBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn is_distributed(&self) -> bool {
        true
    }

    async fn window_counts(&self, identity: &Identity) -> Result<WindowCounts, UsageStoreError> {
        let key = self.key(identity);
        let now_ms = Utc::now().timestamp_millis();
        let cutoff = now_ms - DAY_MS;
        let mut conn = self.connection.clone();

        let (members,): (Vec<(String, f64)>,) = redis::pipe()
            .atomic()
            .zrembyscore(&key, "-inf", cutoff)
            .ignore()
            .zrangebyscore_withscores(&key, format!("({cutoff}"), "+inf")
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        let mut counts = WindowCounts::default();
        for (member, score) in &members {
            counts.add(age_of(*score, now_ms), member_tokens(member));
        }
        Ok(counts)
    }

    async fn record(&self, identity: &Identity, tokens: u64) -> Result<(), UsageStoreError> {
        let key = self.key(identity);
        let now_ms = Utc::now().timestamp_millis();
        let member = format!("{now_ms}:{tokens}:{}", Uuid::new_v4().simple());
        let mut conn = self.connection.clone();

        let () = redis::pipe()
            .atomic()
            .zadd(&key, member, now_ms)
            .ignore()
            .expire(&key, KEY_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    /// Keys expire on their own; nothing to sweep.
    async fn prune(&self) -> Result<usize, UsageStoreError> {
        Ok(0)
    }
}
