use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use super::analytics::get_analytics;
use super::handlers::{
    create_api_key, create_user, delete_url, get_stats, health_check, list_api_keys, list_urls,
    revoke_api_key, shorten_authenticated, shorten_public, update_url, AppState,
};
use crate::auth::auth_middleware;

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/shorten", post(shorten_authenticated))
        .route("/analytics/{code}", get(get_analytics))
        .route(
            "/keys",
            post(create_api_key)
                .get(list_api_keys)
                .delete(revoke_api_key),
        )
        .route("/urls", get(list_urls))
        .route("/urls/{code}", put(update_url).delete(delete_url))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.auth),
            auth_middleware,
        ))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/users", post(create_user))
        .route("/shorten", post(shorten_public))
        .nest("/api", protected_routes)
        .with_state(state)
}
