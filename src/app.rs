use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};
use tower::ServiceBuilder;

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors, rate_limit, request_timer, require_quota},
    routes,
};

async fn root() -> Json<Value> {
    Json(json!({ "message": "Hello, World!" }))
}

/// 组装完整路由：公开路由、Bearer 认证路由、配额路由，外层依次是计时、错误日志、限流
pub fn build_app(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(root))
        // 商品 CRUD
        .route(
            "/items",
            get(routes::item::list_items).post(routes::item::create_item),
        )
        .route("/items/", post(routes::item::create_item))
        .route(
            "/items/{item_id}",
            get(routes::item::read_item)
                .put(routes::item::update_item)
                .patch(routes::item::patch_item)
                .delete(routes::item::delete_item),
        )
        // 用户
        .route("/register", post(routes::user::register))
        .route("/login", post(routes::user::login))
        .route("/refresh", post(routes::user::refresh_token))
        .route("/users/{user_id}", get(routes::user::read_user))
        // 配额查询与重置（不消耗配额）
        .route("/stats", get(routes::quota::stats))
        .route("/reset-quota", post(routes::quota::reset_quota))
        // 文件上传
        .route("/upload/", post(routes::upload::upload_file))
        .route("/upload-multiple", post(routes::upload::upload_multiple));

    let protected_routes = Router::new()
        .route("/protected", get(routes::user::protected))
        .route("/api-keys", post(routes::quota::issue_api_key))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let quota_routes = Router::new()
        .route("/limited", get(routes::quota::limited))
        .route("/chat", post(routes::quota::chat))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_quota,
        ));

    let router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(quota_routes)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_timer))
                .layer(axum::middleware::from_fn(log_errors))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    rate_limit,
                )),
        );

    // 开发模式下允许所有来源
    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    router.with_state(state)
}
