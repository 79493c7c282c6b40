use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single resolution of a short code, as handed to the event recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub short_code: String,
    pub client_address: String,
    pub user_agent: String,
    /// Unix timestamp (seconds)
    pub timestamp: i64,
}

impl AccessEvent {
    pub fn now(
        short_code: impl Into<String>,
        client_address: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            short_code: short_code.into(),
            client_address: client_address.into(),
            user_agent: user_agent.into(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// A persisted access event.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClickRecord {
    pub id: i64,
    pub short_code: String,
    pub client_address: String,
    pub user_agent: String,
    pub clicked_at: i64,
}
