//! Wiring of stores, services and routers

use anyhow::Context;
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::analytics::GeoIpService;
use crate::api::{self, handlers::AppState};
use crate::auth::AuthService;
use crate::cache::{LinkCache, MemoryLinkCache, RedisLinkCache};
use crate::config::Config;
use crate::counter::{CounterStore, MemoryCounterStore, RedisCounterStore};
use crate::ratelimit::{client_guard, GuardState, RateLimiter};
use crate::recorder::{EventRecorder, StorageSink};
use crate::redirect::{self, RedirectState};
use crate::resolver::Resolver;
use crate::shortener::Shortener;
use crate::storage::{self, Storage};

/// Long-lived collaborators shared by every request.
pub struct Services {
    pub storage: Arc<dyn Storage>,
    pub cache: Arc<dyn LinkCache>,
    pub counters: Arc<dyn CounterStore>,
    pub recorder: Arc<EventRecorder>,
    pub geoip: GeoIpService,
}

impl Services {
    /// Connect the configured backends. Must run inside a Tokio runtime.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage = storage::connect(&config.database).await?;

        let (cache, counters): (Arc<dyn LinkCache>, Arc<dyn CounterStore>) =
            match config.redis_url.as_deref() {
                Some(url) => {
                    let client = redis::Client::open(url).context("invalid REDIS_URL")?;
                    let conn = client
                        .get_multiplexed_async_connection()
                        .await
                        .context("failed to connect to Redis")?;
                    info!("Using Redis for the resolution cache and counters");
                    (
                        Arc::new(RedisLinkCache::new(conn.clone())),
                        Arc::new(RedisCounterStore::new(conn)),
                    )
                }
                None => {
                    info!("REDIS_URL not set, using in-process cache and counters");
                    let counters = MemoryCounterStore::new();
                    counters.spawn_sweeper(config.rate_limit.window());
                    (
                        Arc::new(MemoryLinkCache::new(config.cache.max_entries)),
                        Arc::new(counters),
                    )
                }
            };

        Self::with_stores(storage, cache, counters, config)
    }

    /// Assemble services around already-built stores.
    pub fn with_stores(
        storage: Arc<dyn Storage>,
        cache: Arc<dyn LinkCache>,
        counters: Arc<dyn CounterStore>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let geoip = GeoIpService::new(config.analytics.geoip_city_db_path.as_deref())?;
        if geoip.is_enabled() {
            info!("GeoIP City database loaded");
        }

        let recorder = Arc::new(EventRecorder::new(
            Arc::new(StorageSink::new(Arc::clone(&storage))),
            &config.recorder,
        ));

        Ok(Self {
            storage,
            cache,
            counters,
            recorder,
            geoip,
        })
    }
}

/// The full HTTP surface: API, redirects, client guard and request tracing.
pub fn build_router(services: &Services, config: &Config) -> Router {
    let api_state = Arc::new(AppState {
        storage: Arc::clone(&services.storage),
        cache: Arc::clone(&services.cache),
        shortener: Shortener::new(Arc::clone(&services.storage), config.shortener.max_attempts),
        auth: Arc::new(AuthService::new(Arc::clone(&services.storage))),
        geoip: services.geoip.clone(),
    });

    let redirect_state = Arc::new(RedirectState {
        resolver: Resolver::new(
            Arc::clone(&services.storage),
            Arc::clone(&services.cache),
            config.cache.ttl(),
        ),
        recorder: Arc::clone(&services.recorder),
    });

    let guard = Arc::new(GuardState {
        limiter: RateLimiter::new(Arc::clone(&services.counters), &config.rate_limit),
        analytics: config.analytics.clone(),
    });

    api::create_api_router(api_state)
        .merge(redirect::create_redirect_router(redirect_state))
        .layer(middleware::from_fn_with_state(guard, client_guard))
        .layer(TraceLayer::new_for_http())
}
