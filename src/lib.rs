pub mod analytics;
pub mod api;
pub mod app;
pub mod auth;
pub mod cache;
pub mod config;
pub mod counter;
pub mod logging;
pub mod models;
pub mod ratelimit;
pub mod recorder;
pub mod redirect;
pub mod resolver;
pub mod shortener;
pub mod storage;

pub use app::{build_router, Services};
