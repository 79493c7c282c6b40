use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use std::sync::Arc;
use tracing::error;

use crate::models::AccessEvent;
use crate::ratelimit::ClientIp;
use crate::recorder::EventRecorder;
use crate::resolver::{ResolveError, Resolver};

pub const CACHE_STATUS_HEADER: &str = "x-hopline-cache";

pub struct RedirectState {
    pub resolver: Resolver,
    pub recorder: Arc<EventRecorder>,
}

/// Redirect to the destination of `code`
pub async fn redirect_url(
    State(state): State<Arc<RedirectState>>,
    Path(code): Path<String>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    headers: HeaderMap,
) -> Response {
    let resolution = match state.resolver.resolve(&code).await {
        Ok(resolution) => resolution,
        Err(ResolveError::NotFound) => {
            return (StatusCode::NOT_FOUND, "URL not found").into_response();
        }
        Err(e) => {
            error!(short_code = %code, error = %e, "failed to resolve short code");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    // Enqueued before the response exists, so a dropped connection cannot lose it.
    state
        .recorder
        .record(AccessEvent::now(&code, client_ip.to_string(), user_agent));

    let cache_status = if resolution.cache_hit { "hit" } else { "miss" };
    (
        StatusCode::MOVED_PERMANENTLY,
        [
            (header::LOCATION, resolution.destination),
            (
                header::HeaderName::from_static(CACHE_STATUS_HEADER),
                cache_status.to_string(),
            ),
        ],
    )
        .into_response()
}
