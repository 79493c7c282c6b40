//! Cache-aside resolution of short codes
//!
//! Lookup order is cache, then database. A database hit is written back to
//! the cache with the configured TTL. Cache failures only cost latency: a
//! failed read is a miss and a failed write is logged. Database failures are
//! surfaced to the caller.
//!
//! Click limits are always settled in the database, on cache hits too, so
//! usage survives restarts and is shared by every instance.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::cache::{CachedLink, LinkCache};
use crate::storage::Storage;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Unknown, expired or out of clicks
    #[error("short code not found")]
    NotFound,
    #[error("mapping store unavailable: {0}")]
    Store(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub destination: String,
    pub cache_hit: bool,
}

pub struct Resolver {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn LinkCache>,
    cache_ttl: Duration,
}

impl Resolver {
    pub fn new(storage: Arc<dyn Storage>, cache: Arc<dyn LinkCache>, cache_ttl: Duration) -> Self {
        Self {
            storage,
            cache,
            cache_ttl,
        }
    }

    pub async fn resolve(&self, short_code: &str) -> Result<Resolution, ResolveError> {
        let (link, cache_hit) = match self.lookup_cache(short_code).await {
            Some(link) => (link, true),
            None => (self.load_from_store(short_code).await?, false),
        };

        if link
            .expires_at
            .is_some_and(|expires_at| expires_at <= chrono::Utc::now().timestamp())
        {
            debug!(short_code = %short_code, "link has expired");
            return Err(ResolveError::NotFound);
        }

        if link.click_limit.is_some() {
            self.consume_click(short_code).await?;
        }

        Ok(Resolution {
            destination: link.destination,
            cache_hit,
        })
    }

    async fn lookup_cache(&self, short_code: &str) -> Option<CachedLink> {
        match self.cache.get(short_code).await {
            Ok(hit) => {
                trace!(short_code = %short_code, hit = hit.is_some(), "cache lookup");
                hit
            }
            Err(e) => {
                warn!(short_code = %short_code, error = %e, "cache lookup failed, falling back to store");
                None
            }
        }
    }

    async fn load_from_store(&self, short_code: &str) -> Result<CachedLink, ResolveError> {
        let url = self
            .storage
            .get_url(short_code)
            .await
            .map_err(ResolveError::Store)?
            .ok_or(ResolveError::NotFound)?;

        let link = CachedLink::from(&url);
        if let Err(e) = self.cache.set(short_code, &link, self.cache_ttl).await {
            warn!(short_code = %short_code, error = %e, "failed to populate cache");
        }
        Ok(link)
    }

    /// Count this resolution against the link's click limit.
    async fn consume_click(&self, short_code: &str) -> Result<(), ResolveError> {
        let granted = self
            .storage
            .consume_click(short_code)
            .await
            .map_err(ResolveError::Store)?;
        if !granted {
            debug!(short_code = %short_code, "click limit reached or link deleted");
            return Err(ResolveError::NotFound);
        }
        Ok(())
    }
}
