//! Shared cache backed by Redis
//!
//! `url:<code>` holds the bare destination string so other readers of the
//! same Redis can use it directly. Expiry and click-limit metadata live as
//! JSON under `url:<code>:meta`. Both keys are written in one transaction
//! with the same TTL; an entry missing either key is treated as a miss.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::{cache_key, CacheError, CachedLink, LinkCache};

#[derive(Debug, Default, Serialize, Deserialize)]
struct LinkMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    click_limit: Option<i64>,
}

fn meta_key(short_code: &str) -> String {
    format!("{}:meta", cache_key(short_code))
}

#[derive(Clone)]
pub struct RedisLinkCache {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisLinkCache {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl LinkCache for RedisLinkCache {
    async fn get(&self, short_code: &str) -> Result<Option<CachedLink>, CacheError> {
        let mut conn = self.conn.clone();

        let (destination, meta): (Option<String>, Option<String>) = redis::cmd("MGET")
            .arg(cache_key(short_code))
            .arg(meta_key(short_code))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                warn!(short_code = %short_code, error = %e, "Redis error on get");
                CacheError::Unavailable(e.to_string())
            })?;

        let (Some(destination), Some(meta)) = (destination, meta) else {
            return Ok(None);
        };

        let meta: LinkMeta = serde_json::from_str(&meta).map_err(|e| {
            warn!(short_code = %short_code, error = %e, "Failed to deserialize link metadata");
            CacheError::InvalidData(e.to_string())
        })?;

        trace!(short_code = %short_code, "Cache hit in Redis");
        Ok(Some(CachedLink {
            destination,
            expires_at: meta.expires_at,
            click_limit: meta.click_limit,
        }))
    }

    async fn set(
        &self,
        short_code: &str,
        link: &CachedLink,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let meta = serde_json::to_string(&LinkMeta {
            expires_at: link.expires_at,
            click_limit: link.click_limit,
        })
        .map_err(|e| CacheError::InvalidData(e.to_string()))?;
        let ttl_secs = ttl.as_secs().max(1);

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .set_ex(cache_key(short_code), &link.destination, ttl_secs)
            .ignore()
            .set_ex(meta_key(short_code), meta, ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;

        debug!(short_code = %short_code, ttl_secs, "Cached link in Redis");
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }
}
