//! Resolution cache
//!
//! A fast front for the short code → destination mapping. Entries are written
//! only on a database fallback and expire passively after their time-to-live;
//! updates and deletions in the database never invalidate them, so readers may
//! see a stale destination for at most one TTL.

pub mod memory;
pub mod redis;

pub use memory::MemoryLinkCache;
pub use redis::RedisLinkCache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::ShortenedUrl;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache value is invalid: {0}")]
    InvalidData(String),
}

/// What the resolver needs to answer a lookup without touching the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLink {
    pub destination: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub click_limit: Option<i64>,
}

impl From<&ShortenedUrl> for CachedLink {
    fn from(url: &ShortenedUrl) -> Self {
        Self {
            destination: url.original_url.clone(),
            expires_at: url.expires_at,
            click_limit: url.click_limit,
        }
    }
}

/// Key under which a short code's cache entry lives.
pub fn cache_key(short_code: &str) -> String {
    format!("url:{short_code}")
}

#[async_trait]
pub trait LinkCache: Send + Sync {
    /// `Ok(None)` on a miss.
    async fn get(&self, short_code: &str) -> Result<Option<CachedLink>, CacheError>;

    /// Store an entry that expires `ttl` after this call.
    async fn set(&self, short_code: &str, link: &CachedLink, ttl: Duration)
        -> Result<(), CacheError>;

    /// Round trip used by the health check.
    async fn ping(&self) -> Result<(), CacheError>;
}
