use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use crate::{
    AppState,
    error::AppError,
    utils::{TokenType, verify_token},
};

/// 校验 `Authorization: Bearer <access token>`，成功后把 Claims 放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let claims = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .and_then(|auth| verify_token(auth.token(), TokenType::Access, &state.config).ok())
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".into()))?;

    tracing::debug!("Authenticated request for {}", claims.sub);
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
