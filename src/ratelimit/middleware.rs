use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

use super::{Decision, RateLimiter};
use crate::analytics::ip_extractor::extract_client_ip;
use crate::api::handlers::ErrorResponse;
use crate::config::AnalyticsConfig;

/// Client address resolved once per request, shared with the handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

pub struct GuardState {
    pub limiter: RateLimiter,
    pub analytics: AnalyticsConfig,
}

/// Resolve the client address and apply the request-rate limit.
pub async fn client_guard(
    State(state): State<Arc<GuardState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(request.headers(), addr.ip(), &state.analytics);
    request.extensions_mut().insert(ClientIp(client_ip));

    match state.limiter.admit(&client_ip.to_string()).await {
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            response
        }
        Decision::Denied => {
            debug!(client = %client_ip, "rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse {
                    error: "Rate limit exceeded".to_string(),
                }),
            )
                .into_response();
            response.headers_mut().insert(
                "retry-after",
                HeaderValue::from(state.limiter.window().as_secs()),
            );
            response
        }
    }
}
