use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::time::{Duration, Instant};

use super::{cache_key, CacheError, CachedLink, LinkCache};

#[derive(Clone)]
struct Entry {
    link: CachedLink,
    ttl: Duration,
}

/// Expires each entry `ttl` after it was written; reads do not extend it.
struct WriteTtl;

impl Expiry<String, Entry> for WriteTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache (Moka), used when no shared cache is configured.
#[derive(Clone)]
pub struct MemoryLinkCache {
    inner: Cache<String, Entry>,
}

impl MemoryLinkCache {
    pub fn new(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(WriteTtl)
            .build();
        Self { inner }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for MemoryLinkCache {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl LinkCache for MemoryLinkCache {
    async fn get(&self, short_code: &str) -> Result<Option<CachedLink>, CacheError> {
        Ok(self
            .inner
            .get(&cache_key(short_code))
            .await
            .map(|entry| entry.link))
    }

    async fn set(
        &self,
        short_code: &str,
        link: &CachedLink,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.inner
            .insert(
                cache_key(short_code),
                Entry {
                    link: link.clone(),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
