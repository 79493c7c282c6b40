use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A short code → destination mapping as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ShortenedUrl {
    pub id: i64,
    pub short_code: String,
    pub original_url: String,
    pub created_by: Option<i64>,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub click_limit: Option<i64>,
    /// Redirects already counted against `click_limit`
    pub clicks_used: i64,
}

/// Values for a row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUrl {
    pub short_code: String,
    pub original_url: String,
    pub created_by: Option<i64>,
    pub expires_at: Option<i64>,
    pub click_limit: Option<i64>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UrlChanges {
    pub original_url: Option<String>,
    pub expires_at: Option<i64>,
    pub click_limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUrlRequest {
    #[serde(default)]
    pub long_url: String,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub click_limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShortenResponse {
    pub short_url: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUrlRequest {
    pub long_url: Option<String>,
    pub expires_at: Option<i64>,
    pub click_limit: Option<i64>,
}
