//! Fixed-window request limiter keyed by client address
//!
//! Every request increments `rate:<addr>`; the first increment opens a window
//! that expires on its own. A request is denied when the count before its own
//! increment has already reached the limit. If the counter backend cannot be
//! reached the limiter fails open and admits the request.

pub mod middleware;

pub use middleware::{client_guard, ClientIp, GuardState};

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::counter::{rate_key, CounterStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u64 },
    Denied,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            counters,
            max_requests: config.max_requests,
            window: config.window(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn admit(&self, client_key: &str) -> Decision {
        match self
            .counters
            .increment(&rate_key(client_key), Some(self.window))
            .await
        {
            // `count` includes this request, so the previous count is count - 1.
            Ok(count) if count <= self.max_requests => Decision::Allowed {
                remaining: self.max_requests - count,
            },
            Ok(_) => Decision::Denied,
            Err(err) => {
                warn!(client = %client_key, error = %err, "rate limit counter unavailable, admitting request");
                Decision::Allowed {
                    remaining: self.max_requests,
                }
            }
        }
    }
}
