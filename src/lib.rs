use std::sync::Arc;

use config::Config;
use middleware::RateLimiter;
use sqlx::SqlitePool;

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

pub use app::build_app;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
    pub http: reqwest::Client,
}
