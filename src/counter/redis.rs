use async_trait::async_trait;
use redis::Script;
use std::time::Duration;

use super::{CounterError, CounterStore};

/// INCR and PEXPIRE in one server-side step. The expiry is attached when the
/// key has none, which covers both a fresh key and one left without a TTL.
const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl_ms = tonumber(ARGV[1])
if ttl_ms > 0 and redis.call('PTTL', KEYS[1]) < 0 then
    redis.call('PEXPIRE', KEYS[1], ttl_ms)
end
return count
"#;

/// Counter store shared across processes through Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: redis::aio::MultiplexedConnection,
    script: Script,
}

impl RedisCounterStore {
    pub fn new(conn: redis::aio::MultiplexedConnection) -> Self {
        Self {
            conn,
            script: Script::new(INCREMENT_SCRIPT),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, CounterError> {
        let ttl_ms = ttl.map(|ttl| ttl.as_millis().max(1) as u64).unwrap_or(0);
        let mut conn = self.conn.clone();
        self.script
            .key(key)
            .arg(ttl_ms)
            .invoke_async::<u64>(&mut conn)
            .await
            .map_err(|e| CounterError::Unavailable(e.to_string()))
    }
}
