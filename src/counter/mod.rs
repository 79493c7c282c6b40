//! Shared counters with attached expiry
//!
//! Backs the per-client request window (`rate:<addr>`). Incrementing and
//! attaching the expiry happen as one atomic step per key.

pub mod memory;
pub mod redis;

pub use memory::MemoryCounterStore;
pub use redis::RedisCounterStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CounterError {
    #[error("counter backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add one to `key` and return the new value.
    ///
    /// When the key is absent (or its previous window has elapsed) it starts at
    /// 1 and, if `ttl` is given, expires `ttl` from now. Later increments never
    /// move the expiry.
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, CounterError>;
}

pub fn rate_key(client_address: &str) -> String {
    format!("rate:{client_address}")
}
