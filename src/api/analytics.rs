//! Analytics API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::handlers::{api_error, ApiError, AppState};
use crate::analytics::location_report;
use crate::auth::Caller;

/// Clicks per location for one link.
///
/// Links without an owner are visible to any authenticated caller.
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(short_code): Path<String>,
) -> Result<Json<BTreeMap<String, u64>>, ApiError> {
    let url = state.storage.get_url(&short_code).await.map_err(|e| {
        tracing::error!("Failed to get URL for analytics: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    })?;

    match url {
        Some(url) if url.created_by.is_none_or(|owner| owner == caller.user_id) => {}
        _ => {
            return Err(api_error(
                StatusCode::UNAUTHORIZED,
                "Unauthorized or URL not found",
            ))
        }
    }

    let clicks = state.storage.list_clicks(&short_code).await.map_err(|e| {
        tracing::error!("Failed to get clicks: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    })?;

    Ok(Json(location_report(&state.geoip, &clicks)))
}
