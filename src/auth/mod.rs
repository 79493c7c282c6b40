//! API key authentication
//!
//! Keys are 32 random bytes, URL-safe base64 encoded and shown to the user
//! exactly once. Only the SHA-256 digest is stored.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::prelude::*;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error};

use crate::api::handlers::ErrorResponse;
use crate::models::ApiKey;
use crate::storage::{Storage, StorageError};

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Characters of the plaintext key kept for display.
const KEY_PREFIX_LEN: usize = 8;

/// The authenticated user behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
}

pub fn generate_api_key() -> String {
    let bytes: [u8; 32] = rand::random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

pub fn hash_api_key(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

pub struct AuthService {
    storage: Arc<dyn Storage>,
}

impl AuthService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Issue a new key for `user_id`. The plaintext is only available here.
    pub async fn issue_key(&self, user_id: i64) -> anyhow::Result<(String, ApiKey)> {
        let key = generate_api_key();
        let prefix: String = key.chars().take(KEY_PREFIX_LEN).collect();
        match self
            .storage
            .create_api_key(user_id, &hash_api_key(&key), &prefix)
            .await
        {
            Ok(record) => Ok((key, record)),
            Err(StorageError::Conflict) => anyhow::bail!("API key digest already exists"),
            Err(StorageError::Other(e)) => Err(e),
        }
    }

    pub async fn revoke_key(&self, user_id: i64, key: &str) -> anyhow::Result<bool> {
        self.storage.delete_api_key(user_id, &hash_api_key(key)).await
    }

    pub async fn authenticate(&self, key: &str) -> anyhow::Result<Option<Caller>> {
        if key.is_empty() {
            return Ok(None);
        }
        let record = self.storage.find_api_key(&hash_api_key(key)).await?;
        Ok(record.map(|k| Caller { user_id: k.user_id }))
    }
}

/// Reject requests without a valid `X-API-Key`; otherwise attach the [`Caller`].
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    match auth_service.authenticate(api_key).await {
        Ok(Some(caller)) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Ok(None) => {
            debug!("rejected request with missing or unknown API key");
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "API key lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    async fn service() -> (AuthService, i64) {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        let user = storage.create_user("alice", "alice@example.com").await.unwrap();
        (AuthService::new(Arc::new(storage)), user.id)
    }

    #[test]
    fn test_generated_keys_are_url_safe() {
        let key = generate_api_key();
        assert_eq!(key.len(), 43);
        assert!(key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        assert_eq!(
            hash_api_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_issue_authenticate_revoke() {
        let (auth, user_id) = service().await;

        let (key, record) = auth.issue_key(user_id).await.unwrap();
        assert_eq!(record.user_id, user_id);
        assert!(key.starts_with(&record.prefix));
        assert_ne!(record.key_hash, key);

        assert_eq!(
            auth.authenticate(&key).await.unwrap(),
            Some(Caller { user_id })
        );
        assert_eq!(auth.authenticate("bogus").await.unwrap(), None);
        assert_eq!(auth.authenticate("").await.unwrap(), None);

        assert!(auth.revoke_key(user_id, &key).await.unwrap());
        assert!(!auth.revoke_key(user_id, &key).await.unwrap());
        assert_eq!(auth.authenticate(&key).await.unwrap(), None);
    }
}
