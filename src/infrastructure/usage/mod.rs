//! Usage backends for the sliding-window limiter.

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryUsageBackend;
pub use redis_store::{RedisUsageBackend, RedisUsageConfig};
