use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

/// An issued credential. Only the SHA-256 digest of the key is persisted.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// First characters of the plaintext key, for display
    pub prefix: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stats {
    pub total_urls: i64,
    pub total_clicks: i64,
    pub total_users: i64,
}
