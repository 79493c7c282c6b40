use crate::models::{AccessEvent, ApiKey, ClickRecord, NewUrl, ShortenedUrl, Stats, UrlChanges, User};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            _ => StorageError::Other(err.into()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The persistent mapping store. It is the single authority for short code
/// records; every cache in front of it is derived state.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Cheap round trip used by the health check
    async fn ping(&self) -> Result<()>;

    /// Insert a mapping. Returns `Conflict` when the short code is taken.
    async fn create_url(&self, url: &NewUrl) -> StorageResult<ShortenedUrl>;

    /// Get a mapping by short code
    async fn get_url(&self, short_code: &str) -> Result<Option<ShortenedUrl>>;

    /// List mappings owned by a user, newest first
    async fn list_user_urls(&self, user_id: i64, limit: i64, offset: i64)
        -> Result<Vec<ShortenedUrl>>;

    /// Apply changes to a mapping owned by `user_id`. `None` when absent or not owned.
    async fn update_url(
        &self,
        short_code: &str,
        user_id: i64,
        changes: &UrlChanges,
    ) -> Result<Option<ShortenedUrl>>;

    /// Delete a mapping owned by `user_id`. Returns whether a row was removed.
    async fn delete_url(&self, short_code: &str, user_id: i64) -> Result<bool>;

    /// Count one redirect against the link's click limit.
    ///
    /// The check and the increment are a single statement. Returns `false`
    /// when the link is gone or its limit is already used up.
    async fn consume_click(&self, short_code: &str) -> Result<bool>;

    /// Persist one access event
    async fn log_click(&self, event: &AccessEvent) -> Result<()>;

    /// All access events recorded for a short code
    async fn list_clicks(&self, short_code: &str) -> Result<Vec<ClickRecord>>;

    /// Create an account. `Conflict` when the username or email is taken.
    async fn create_user(&self, username: &str, email: &str) -> StorageResult<User>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>>;

    /// Store a new credential digest for a user
    async fn create_api_key(&self, user_id: i64, key_hash: &str, prefix: &str)
        -> StorageResult<ApiKey>;

    /// Look up a credential by digest
    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>>;

    async fn list_api_keys(&self, user_id: i64) -> Result<Vec<ApiKey>>;

    /// Revoke a credential owned by `user_id`. Returns whether a row was removed.
    async fn delete_api_key(&self, user_id: i64, key_hash: &str) -> Result<bool>;

    /// Global totals
    async fn stats(&self) -> Result<Stats>;
}
