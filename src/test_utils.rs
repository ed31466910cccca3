use std::sync::Arc;

use crate::{
    AppState,
    config::{Config, RateLimitBackend},
    database,
    middleware::RateLimiter,
    utils::build_http_client,
};

pub fn create_test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_refresh_secret: "test-refresh-secret".to_string(),
        access_token_expire_minutes: 30,
        refresh_token_expire_days: 7,
        bcrypt_cost: 4,
        rate_limit_backend: RateLimitBackend::Memory,
        rate_limit_window_secs: 60,
        rate_limit_requests: 1000,
        redis_url: None,
        default_quota: 3,
        chat_webhook_url: None,
        chat_timeout_secs: 10,
        upload_dir: std::env::temp_dir()
            .join(format!("crud-walkthrough-uploads-{}", uuid::Uuid::new_v4().simple()))
            .to_string_lossy()
            .into_owned(),
    }
}

pub async fn create_test_state(config: Config) -> AppState {
    let pool = database::connect(&config.database_url)
        .await
        .expect("in-memory database");
    database::init_schema(&pool).await.expect("schema");
    let limiter = RateLimiter::from_config(&config, pool.clone()).expect("limiter");
    let http = build_http_client(&config).expect("http client");

    AppState {
        pool,
        config: Arc::new(config),
        limiter: Arc::new(limiter),
        http,
    }
}
