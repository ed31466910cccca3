use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crud_walkthrough::{
    AppState, build_app, config::Config, database, middleware::RateLimiter, utils,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration (is JWT_SECRET set?)");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 数据库连接池与表结构
    let pool = database::connect(&config.database_url)
        .await
        .expect("Failed to open SQLite database");
    database::init_schema(&pool)
        .await
        .expect("Failed to create database schema");

    // 设置限流器并启动过期记录清理
    let limiter = Arc::new(
        RateLimiter::from_config(&config, pool.clone()).expect("Failed to create rate limiter"),
    );
    limiter.clone().spawn_purge_task();

    let http = utils::build_http_client(&config).expect("Failed to build HTTP client");

    let state = AppState {
        pool,
        config: Arc::new(config),
        limiter,
        http,
    };

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );

    let app = build_app(state);

    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
