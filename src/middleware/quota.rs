use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderValue, Request, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    error::AppError,
    routes::quota::{ApiKey, ConsumeOutcome},
};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const QUOTA_REMAINING_HEADER: &str = "x-quota-remaining";

/// 从 `X-API-Key` 请求头中提取的明文 key
#[derive(Debug, Clone)]
pub struct ApiKeyHeader(pub String);

impl<S> FromRequestParts<S> for ApiKeyHeader
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| ApiKeyHeader(k.to_string()))
            .ok_or_else(|| AppError::Unauthorized("API key missing".into()))
    }
}

/// 每个放行的请求扣减一次配额；扣减是单条原子 UPDATE
pub async fn require_quota(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    let ApiKeyHeader(api_key) = ApiKeyHeader::from_request_parts(&mut parts, &state).await?;

    let key = match ApiKey::consume(&state.pool, &api_key).await? {
        ConsumeOutcome::Accepted(key) => key,
        ConsumeOutcome::Exhausted => {
            return Err(AppError::TooManyRequests("Quota exceeded".into()));
        }
        ConsumeOutcome::Unknown => {
            return Err(AppError::Unauthorized("Invalid API key".into()));
        }
    };

    tracing::debug!(
        "Quota accepted for {} ({}), {} remaining",
        key.owner,
        key.key_prefix,
        key.remaining
    );
    let remaining = key.remaining;
    parts.extensions.insert(key);

    let mut response = next.run(Request::from_parts(parts, body)).await;
    response
        .headers_mut()
        .insert(QUOTA_REMAINING_HEADER, HeaderValue::from(remaining));
    Ok(response)
}
