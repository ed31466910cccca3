use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};

pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// 记录每个请求的处理耗时，并通过 `X-Process-Time` 响应头返回（单位：秒）
pub async fn request_timer(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let mut response = next.run(req).await;

    let elapsed = start.elapsed();
    tracing::info!(
        "Request method {} at path {} -> {} processed in {:.6} seconds",
        method,
        uri,
        response.status().as_u16(),
        elapsed.as_secs_f64()
    );

    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}", elapsed.as_secs_f64())) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}
