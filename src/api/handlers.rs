use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::analytics::GeoIpService;
use crate::auth::{AuthService, Caller};
use crate::cache::LinkCache;
use crate::models::{
    ApiKey, CreateUrlRequest, CreateUserRequest, ShortenResponse, ShortenedUrl, Stats,
    UpdateUrlRequest, UrlChanges, User,
};
use crate::shortener::{validate_destination, ShortenError, Shortener};
use crate::storage::{Storage, StorageError};

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub cache: Arc<dyn LinkCache>,
    pub shortener: Shortener,
    pub auth: Arc<AuthService>,
    pub geoip: GeoIpService,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal_error(context: &str, e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "{context}");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

fn shorten_error(e: ShortenError) -> ApiError {
    match e {
        ShortenError::InvalidUrl(_)
        | ShortenError::InvalidCustomCode
        | ShortenError::ReservedCode(_)
        | ShortenError::InvalidClickLimit => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        ShortenError::AuthenticationRequired => {
            api_error(StatusCode::UNAUTHORIZED, "Authentication required for custom URLs")
        }
        ShortenError::CodeTaken(_) => api_error(StatusCode::CONFLICT, e.to_string()),
        ShortenError::Exhausted(_) => internal_error("failed to allocate short code", e),
        ShortenError::Storage(e) => internal_error("failed to create URL", e),
    }
}

async fn shorten(
    state: &AppState,
    payload: CreateUrlRequest,
    caller: Option<Caller>,
) -> Result<Json<ShortenResponse>, ApiError> {
    let url = state
        .shortener
        .shorten(payload, caller.map(|c| c.user_id))
        .await
        .map_err(shorten_error)?;

    Ok(Json(ShortenResponse {
        short_url: url.short_code,
    }))
}

/// Create a link without an owner. Custom ids are refused here.
pub async fn shorten_public(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUrlRequest>,
) -> Result<Json<ShortenResponse>, ApiError> {
    shorten(&state, payload, None).await
}

/// Create a link owned by the caller.
pub async fn shorten_authenticated(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CreateUrlRequest>,
) -> Result<Json<ShortenResponse>, ApiError> {
    shorten(&state, payload, Some(caller)).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateUserResponse {
    #[serde(flatten)]
    pub user: User,
    /// Initial API key; the only time it is shown
    pub api_key: String,
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), ApiError> {
    let username = payload.username.trim();
    let email = payload.email.trim();
    if username.is_empty() || email.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Username and email are required",
        ));
    }
    if !email.contains('@') {
        return Err(api_error(StatusCode::BAD_REQUEST, "Invalid email address"));
    }

    let user = match state.storage.create_user(username, email).await {
        Ok(user) => user,
        Err(StorageError::Conflict) => {
            return Err(api_error(
                StatusCode::CONFLICT,
                "Username or email already registered",
            ))
        }
        Err(StorageError::Other(e)) => return Err(internal_error("failed to create user", e)),
    };

    let (api_key, _) = state
        .auth
        .issue_key(user.id)
        .await
        .map_err(|e| internal_error("failed to issue API key", e))?;

    info!(user_id = user.id, "created user");
    Ok((StatusCode::CREATED, Json(CreateUserResponse { user, api_key })))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateApiKeyResponse {
    pub api_key: String,
    pub id: i64,
    pub user_id: i64,
    pub prefix: String,
    pub created_at: i64,
}

pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<(StatusCode, Json<CreateApiKeyResponse>), ApiError> {
    let (api_key, record) = state
        .auth
        .issue_key(caller.user_id)
        .await
        .map_err(|e| internal_error("failed to issue API key", e))?;

    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            api_key,
            id: record.id,
            user_id: record.user_id,
            prefix: record.prefix,
            created_at: record.created_at,
        }),
    ))
}

pub async fn list_api_keys(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<ApiKey>>, ApiError> {
    state
        .storage
        .list_api_keys(caller.user_id)
        .await
        .map(Json)
        .map_err(|e| internal_error("failed to list API keys", e))
}

#[derive(Debug, Deserialize)]
pub struct RevokeKeyRequest {
    #[serde(default)]
    pub api_key: String,
}

pub async fn revoke_api_key(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<RevokeKeyRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    if payload.api_key.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "api_key is required"));
    }

    match state.auth.revoke_key(caller.user_id, &payload.api_key).await {
        Ok(true) => Ok(Json(SuccessResponse {
            message: "API key revoked".to_string(),
        })),
        Ok(false) => Err(api_error(StatusCode::NOT_FOUND, "API key not found")),
        Err(e) => Err(internal_error("failed to revoke API key", e)),
    }
}

/// List the caller's links, newest first
pub async fn list_urls(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ShortenedUrl>>, ApiError> {
    let limit = query.limit.clamp(1, 1000);
    let offset = query.offset.max(0);

    state
        .storage
        .list_user_urls(caller.user_id, limit, offset)
        .await
        .map(Json)
        .map_err(|e| internal_error("failed to list URLs", e))
}

/// Update a caller-owned link. Cached resolutions keep the old values until they expire.
pub async fn update_url(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(code): Path<String>,
    Json(payload): Json<UpdateUrlRequest>,
) -> Result<Json<ShortenedUrl>, ApiError> {
    if let Some(long_url) = payload.long_url.as_deref() {
        validate_destination(long_url).map_err(shorten_error)?;
    }
    if payload.click_limit.is_some_and(|limit| limit <= 0) {
        return Err(shorten_error(ShortenError::InvalidClickLimit));
    }

    let changes = UrlChanges {
        original_url: payload.long_url.map(|u| u.trim().to_string()),
        expires_at: payload.expires_at,
        click_limit: payload.click_limit,
    };

    match state.storage.update_url(&code, caller.user_id, &changes).await {
        Ok(Some(url)) => Ok(Json(url)),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, "URL not found")),
        Err(e) => Err(internal_error("failed to update URL", e)),
    }
}

/// Delete a caller-owned link. Cached resolutions of unlimited links keep
/// redirecting until they expire.
pub async fn delete_url(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(code): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    match state.storage.delete_url(&code, caller.user_id).await {
        Ok(true) => {
            info!(short_code = %code, user_id = caller.user_id, "deleted URL");
            Ok(Json(SuccessResponse {
                message: "URL deleted".to_string(),
            }))
        }
        Ok(false) => Err(api_error(StatusCode::NOT_FOUND, "URL not found")),
        Err(e) => Err(internal_error("failed to delete URL", e)),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub database: String,
    pub cache: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: i64,
    pub services: ServiceHealth,
}

fn health_label(ok: bool) -> String {
    let label = if ok { "healthy" } else { "unhealthy" };
    label.to_string()
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database_ok = match state.storage.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "database health check failed");
            false
        }
    };
    let cache_ok = match state.cache.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "cache health check failed");
            false
        }
    };

    let status = if database_ok && cache_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: health_label(database_ok && cache_ok),
            timestamp: chrono::Utc::now().timestamp(),
            services: ServiceHealth {
                database: health_label(database_ok),
                cache: health_label(cache_ok),
            },
        }),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: Stats,
    pub timestamp: i64,
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state
        .storage
        .stats()
        .await
        .map_err(|e| internal_error("failed to collect stats", e))?;

    Ok(Json(StatsResponse {
        stats,
        timestamp: chrono::Utc::now().timestamp(),
    }))
}
