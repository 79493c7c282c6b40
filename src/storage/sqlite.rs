use crate::models::{AccessEvent, ApiKey, ClickRecord, NewUrl, ShortenedUrl, Stats, UrlChanges, User};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

const URL_COLUMNS: &str =
    "id, short_code, original_url, created_by, created_at, expires_at, click_limit, clicks_used";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        // Every connection to an in-memory database gets its own database.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS urls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                short_code TEXT NOT NULL UNIQUE,
                original_url TEXT NOT NULL,
                created_by INTEGER,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                click_limit INTEGER,
                clicks_used INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_urls_created_by ON urls(created_by)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS clicks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                short_code TEXT NOT NULL,
                client_address TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                clicked_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_clicks_short_code ON clicks(short_code)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                key_hash TEXT NOT NULL UNIQUE,
                prefix TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }

    async fn create_url(&self, url: &NewUrl) -> StorageResult<ShortenedUrl> {
        let row = sqlx::query_as::<_, ShortenedUrl>(&format!(
            r#"
            INSERT INTO urls (short_code, original_url, created_by, created_at, expires_at, click_limit)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(short_code) DO NOTHING
            RETURNING {URL_COLUMNS}
            "#
        ))
        .bind(&url.short_code)
        .bind(&url.original_url)
        .bind(url.created_by)
        .bind(now())
        .bind(url.expires_at)
        .bind(url.click_limit)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.ok_or(StorageError::Conflict)
    }

    async fn get_url(&self, short_code: &str) -> Result<Option<ShortenedUrl>> {
        let url = sqlx::query_as::<_, ShortenedUrl>(&format!(
            "SELECT {URL_COLUMNS} FROM urls WHERE short_code = ?"
        ))
        .bind(short_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(url)
    }

    async fn list_user_urls(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ShortenedUrl>> {
        let urls = sqlx::query_as::<_, ShortenedUrl>(&format!(
            r#"
            SELECT {URL_COLUMNS}
            FROM urls
            WHERE created_by = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(urls)
    }

    async fn update_url(
        &self,
        short_code: &str,
        user_id: i64,
        changes: &UrlChanges,
    ) -> Result<Option<ShortenedUrl>> {
        let url = sqlx::query_as::<_, ShortenedUrl>(&format!(
            r#"
            UPDATE urls
            SET original_url = COALESCE(?, original_url),
                expires_at = COALESCE(?, expires_at),
                click_limit = COALESCE(?, click_limit)
            WHERE short_code = ? AND created_by = ?
            RETURNING {URL_COLUMNS}
            "#
        ))
        .bind(changes.original_url.as_deref())
        .bind(changes.expires_at)
        .bind(changes.click_limit)
        .bind(short_code)
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(url)
    }

    async fn delete_url(&self, short_code: &str, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM urls WHERE short_code = ? AND created_by = ?")
            .bind(short_code)
            .bind(user_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn consume_click(&self, short_code: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE urls
            SET clicks_used = clicks_used + 1
            WHERE short_code = ? AND (click_limit IS NULL OR clicks_used < click_limit)
            "#,
        )
        .bind(short_code)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn log_click(&self, event: &AccessEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clicks (short_code, client_address, user_agent, clicked_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&event.short_code)
        .bind(&event.client_address)
        .bind(&event.user_agent)
        .bind(event.timestamp)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn list_clicks(&self, short_code: &str) -> Result<Vec<ClickRecord>> {
        let clicks = sqlx::query_as::<_, ClickRecord>(
            r#"
            SELECT id, short_code, client_address, user_agent, clicked_at
            FROM clicks
            WHERE short_code = ?
            ORDER BY clicked_at, id
            "#,
        )
        .bind(short_code)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(clicks)
    }

    async fn create_user(&self, username: &str, email: &str) -> StorageResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, created_at)
            VALUES (?, ?, ?)
            RETURNING id, username, email, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn create_api_key(
        &self,
        user_id: i64,
        key_hash: &str,
        prefix: &str,
    ) -> StorageResult<ApiKey> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (user_id, key_hash, prefix, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, key_hash, prefix, created_at
            "#,
        )
        .bind(user_id)
        .bind(key_hash)
        .bind(prefix)
        .bind(now())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(key)
    }

    async fn find_api_key(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>(
            "SELECT id, user_id, key_hash, prefix, created_at FROM api_keys WHERE key_hash = ?",
        )
        .bind(key_hash)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(key)
    }

    async fn list_api_keys(&self, user_id: i64) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, user_id, key_hash, prefix, created_at
            FROM api_keys
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(keys)
    }

    async fn delete_api_key(&self, user_id: i64, key_hash: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE user_id = ? AND key_hash = ?")
            .bind(user_id)
            .bind(key_hash)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self) -> Result<Stats> {
        let (total_urls, total_clicks, total_users) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM urls),
                (SELECT COUNT(*) FROM clicks),
                (SELECT COUNT(*) FROM users)
            "#,
        )
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(Stats {
            total_urls,
            total_clicks,
            total_users,
        })
    }
}
