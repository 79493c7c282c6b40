//! Short code generation and link creation

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{CreateUrlRequest, NewUrl, ShortenedUrl};
use crate::storage::{Storage, StorageError};

/// Symbols a generated short code is drawn from.
pub const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub const CODE_LENGTH: usize = 8;

const MAX_CUSTOM_CODE_LENGTH: usize = 32;

/// Paths served by the router itself; a link under one of these would be unreachable.
const RESERVED_CODES: &[&str] = &["api", "health", "shorten", "stats", "users"];

/// Draw a candidate short code. Uniqueness is the caller's problem.
pub fn generate_short_code() -> String {
    std::iter::repeat_with(|| ALPHABET[rand::random_range(0..ALPHABET.len())] as char)
        .take(CODE_LENGTH)
        .collect()
}

#[derive(Debug, Error)]
pub enum ShortenError {
    #[error("{0}")]
    InvalidUrl(String),
    #[error("custom id must be 1-{MAX_CUSTOM_CODE_LENGTH} characters of A-Z, a-z, 0-9, '_' or '-'")]
    InvalidCustomCode,
    #[error("custom id '{0}' is reserved")]
    ReservedCode(String),
    #[error("click limit must be positive")]
    InvalidClickLimit,
    #[error("authentication required for custom ids")]
    AuthenticationRequired,
    #[error("short code '{0}' is already taken")]
    CodeTaken(String),
    #[error("could not allocate a unique short code after {0} attempts")]
    Exhausted(usize),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_destination(url: &str) -> Result<(), ShortenError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ShortenError::InvalidUrl("URL cannot be empty".to_string()));
    }

    let uri: axum::http::Uri = url
        .parse()
        .map_err(|_| ShortenError::InvalidUrl(format!("'{url}' is not a valid URL")))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        _ => {
            return Err(ShortenError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ))
        }
    }

    if uri.host().is_none_or(str::is_empty) {
        return Err(ShortenError::InvalidUrl("URL must include a host".to_string()));
    }

    Ok(())
}

pub fn validate_custom_code(code: &str) -> Result<(), ShortenError> {
    let well_formed = !code.is_empty()
        && code.len() <= MAX_CUSTOM_CODE_LENGTH
        && code
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !well_formed {
        return Err(ShortenError::InvalidCustomCode);
    }
    if RESERVED_CODES.contains(&code) {
        return Err(ShortenError::ReservedCode(code.to_string()));
    }
    Ok(())
}

pub struct Shortener {
    storage: Arc<dyn Storage>,
    max_attempts: usize,
    generate: fn() -> String,
}

impl Shortener {
    pub fn new(storage: Arc<dyn Storage>, max_attempts: usize) -> Self {
        Self::with_generator(storage, max_attempts, generate_short_code)
    }

    pub fn with_generator(
        storage: Arc<dyn Storage>,
        max_attempts: usize,
        generate: fn() -> String,
    ) -> Self {
        Self {
            storage,
            max_attempts: max_attempts.max(1),
            generate,
        }
    }

    /// Create a link. `owner` is the authenticated user, if any.
    pub async fn shorten(
        &self,
        request: CreateUrlRequest,
        owner: Option<i64>,
    ) -> Result<ShortenedUrl, ShortenError> {
        validate_destination(&request.long_url)?;
        if request.click_limit.is_some_and(|limit| limit <= 0) {
            return Err(ShortenError::InvalidClickLimit);
        }

        let mut new_url = NewUrl {
            short_code: String::new(),
            original_url: request.long_url.trim().to_string(),
            created_by: owner,
            expires_at: request.expires_at,
            click_limit: request.click_limit,
        };

        if let Some(custom) = request.custom_id.filter(|c| !c.is_empty()) {
            if owner.is_none() {
                return Err(ShortenError::AuthenticationRequired);
            }
            validate_custom_code(&custom)?;
            new_url.short_code = custom;
            return match self.storage.create_url(&new_url).await {
                Ok(url) => {
                    info!(short_code = %url.short_code, "created link with custom id");
                    Ok(url)
                }
                Err(StorageError::Conflict) => Err(ShortenError::CodeTaken(new_url.short_code)),
                Err(StorageError::Other(e)) => Err(ShortenError::Storage(e)),
            };
        }

        for attempt in 1..=self.max_attempts {
            new_url.short_code = (self.generate)();
            match self.storage.create_url(&new_url).await {
                Ok(url) => {
                    debug!(short_code = %url.short_code, attempt, "created link");
                    return Ok(url);
                }
                Err(StorageError::Conflict) => {
                    debug!(short_code = %new_url.short_code, attempt, "short code collision, retrying");
                }
                Err(StorageError::Other(e)) => return Err(ShortenError::Storage(e)),
            }
        }

        warn!(attempts = self.max_attempts, "exhausted short code attempts");
        Err(ShortenError::Exhausted(self.max_attempts))
    }
}
