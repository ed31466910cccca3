use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::AppJson,
    middleware::ApiKeyHeader,
    utils::Claims,
};

use super::model::{
    ApiKey, ChatRequest, ChatResponse, IssueApiKeyRequest, IssueApiKeyResponse, LimitedResponse,
    QuotaStats,
};

fn invalid_api_key() -> AppError {
    AppError::Unauthorized("Invalid API key".into())
}

/// 为当前登录用户签发 API Key
#[axum::debug_handler]
pub async fn issue_api_key(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<IssueApiKeyRequest>,
) -> AppResult<impl IntoResponse> {
    let total = req.resolve_total(state.config.default_quota)?;
    let (key, plaintext) = ApiKey::issue(&state.pool, &claims.sub, total).await?;

    Ok((
        StatusCode::CREATED,
        Json(IssueApiKeyResponse {
            key: plaintext,
            owner: key.owner,
            remaining: key.remaining,
            total: key.total,
        }),
    ))
}

/// 查询配额，不消耗配额
#[axum::debug_handler]
pub async fn stats(
    State(state): State<AppState>,
    ApiKeyHeader(api_key): ApiKeyHeader,
) -> AppResult<Json<QuotaStats>> {
    ApiKey::find_by_key(&state.pool, &api_key)
        .await?
        .map(|key| Json(QuotaStats::from(key)))
        .ok_or_else(invalid_api_key)
}

#[axum::debug_handler]
pub async fn reset_quota(
    State(state): State<AppState>,
    ApiKeyHeader(api_key): ApiKeyHeader,
) -> AppResult<Json<QuotaStats>> {
    let key = ApiKey::reset(&state.pool, &api_key)
        .await?
        .ok_or_else(invalid_api_key)?;
    tracing::info!("Quota reset for {} ({})", key.owner, key.key_prefix);
    Ok(Json(QuotaStats::from(key)))
}

#[axum::debug_handler]
pub async fn limited(Extension(key): Extension<ApiKey>) -> Json<LimitedResponse> {
    Json(LimitedResponse {
        message: "Request accepted".into(),
        owner: key.owner,
        remaining: key.remaining,
    })
}

/// 把消息转发给配置的 webhook，返回其 `ai` 字段；转发失败时退还本次配额
#[axum::debug_handler]
pub async fn chat(
    State(state): State<AppState>,
    Extension(key): Extension<ApiKey>,
    AppJson(req): AppJson<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    tracing::info!("User: {} | Input: {}", key.owner, req.message);

    match ask_webhook(&state, &key.owner, &req.message).await {
        Ok(response) => Ok(Json(ChatResponse { response })),
        Err(e) => {
            if let Some(refunded) = ApiKey::refund(&state.pool, &key.key_hash).await? {
                tracing::info!(
                    "Refunded quota for {} ({} remaining)",
                    refunded.key_prefix,
                    refunded.remaining
                );
            }
            Err(e)
        }
    }
}

async fn ask_webhook(state: &AppState, username: &str, message: &str) -> AppResult<String> {
    let webhook = state
        .config
        .chat_webhook_url
        .as_deref()
        .ok_or_else(|| AppError::ServiceUnavailable("Chat webhook is not configured".into()))?;

    let upstream_failed = |e: reqwest::Error| {
        tracing::warn!("Chat webhook request failed: {}", e);
        AppError::BadGateway("Chat webhook request failed".into())
    };

    let body: serde_json::Value = state
        .http
        .get(webhook)
        .query(&[("username", username), ("message", message)])
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(upstream_failed)?
        .json()
        .await
        .map_err(upstream_failed)?;

    Ok(body
        .get("ai")
        .and_then(|v| v.as_str())
        .unwrap_or("No response from AI")
        .to_string())
}
