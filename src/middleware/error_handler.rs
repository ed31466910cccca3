use axum::{
    body::{Body, HttpBody, to_bytes},
    http::{Request, header::CONTENT_LENGTH},
    middleware::Next,
    response::Response,
};

const MAX_LOGGED_BODY: usize = 64 * 1024;

/// 记录 5xx 响应；能完整缓冲的响应体一并写入日志，过大或未知长度的原样透传
pub async fn log_errors(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;

    let status = response.status();
    if !status.is_server_error() {
        return response;
    }

    let fits = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= MAX_LOGGED_BODY as u64);
    if !fits {
        tracing::error!("{} {} -> {} (body not logged)", method, uri, status);
        return response;
    }

    let (mut parts, body) = response.into_parts();
    match to_bytes(body, MAX_LOGGED_BODY).await {
        Ok(bytes) => {
            tracing::error!(
                "{} {} -> {}: {}",
                method,
                uri,
                status,
                String::from_utf8_lossy(&bytes)
            );
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(e) => {
            // 响应体已被消费，只能返回状态码
            tracing::error!("{} {} -> {} (body unreadable: {})", method, uri, status, e);
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::empty())
        }
    }
}
