use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{CounterError, CounterStore};

#[derive(Debug, Clone, Copy)]
struct Slot {
    count: u64,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process counter store. Each key is updated under its DashMap shard
/// lock, which makes the read, increment and expiry assignment one step.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    slots: Arc<DashMap<String, Slot>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose window has elapsed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.slots.retain(|_, slot| !slot.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Periodically purge expired entries so idle clients do not accumulate.
    pub fn spawn_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                store.purge_expired();
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, CounterError> {
        let now = Instant::now();
        let fresh = Slot {
            count: 0,
            expires_at: ttl.map(|ttl| now + ttl),
        };

        let mut slot = self.slots.entry(key.to_string()).or_insert(fresh);
        if slot.is_expired(now) {
            *slot = fresh;
        }
        slot.count += 1;
        Ok(slot.count)
    }
}
