use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::{AppJson, AppPath},
    utils::{Claims, TokenType, generate_token, hash_password, verify_token},
};

use super::model::{
    LoginRequest, LoginResponse, ProtectedResponse, PublicUser, RefreshTokenRequest,
    RefreshTokenResponse, RegisterRequest, RegisterResponse, User,
};

// 用户不存在与密码错误返回同一条消息，避免暴露用户名是否存在
const INVALID_CREDENTIALS: &str = "Invalid Username or Password";
const USERNAME_TAKEN: &str = "Username Already Exists";

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;

    if User::find_by_username(&state.pool, &req.username)
        .await?
        .is_some()
    {
        return Err(AppError::BadRequest(USERNAME_TAKEN.into()));
    }

    let password_hash = hash_password(&req.password, state.config.bcrypt_cost)?;

    match User::create(&state.pool, &req, &password_hash).await {
        Ok(_) => Ok((
            StatusCode::CREATED,
            Json(RegisterResponse {
                message: "User registered successfully!".into(),
            }),
        )),
        // 并发注册时由唯一约束兜底
        Err(e)
            if e.as_database_error()
                .map(|db| db.is_unique_violation())
                .unwrap_or(false) =>
        {
            Err(AppError::BadRequest(USERNAME_TAKEN.into()))
        }
        Err(e) => Err(e.into()),
    }
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let user = User::find_by_username(&state.pool, &req.username)
        .await?
        .ok_or_else(|| AppError::BadRequest(INVALID_CREDENTIALS.into()))?;

    if !user.verify_login(&req.password)? {
        tracing::info!("Failed login for {}", user.username);
        return Err(AppError::BadRequest(INVALID_CREDENTIALS.into()));
    }

    let (access_token, _) = generate_token(&user.username, TokenType::Access, &state.config)?;
    let (refresh_token, _) = generate_token(&user.username, TokenType::Refresh, &state.config)?;

    Ok(Json(LoginResponse {
        message: "Login successful!".into(),
        username: user.username,
        access_token,
        refresh_token,
        token_type: "bearer".into(),
    }))
}

#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    AppJson(req): AppJson<RefreshTokenRequest>,
) -> AppResult<Json<RefreshTokenResponse>> {
    let claims = verify_token(&req.refresh_token, TokenType::Refresh, &state.config)
        .map_err(|_| AppError::Unauthorized("Invalid or expired refresh token".into()))?;

    let (access_token, _) = generate_token(&claims.sub, TokenType::Access, &state.config)?;

    Ok(Json(RefreshTokenResponse {
        access_token,
        token_type: "bearer".into(),
    }))
}

/// 认证中间件已校验 token，这里直接读取 Claims
#[axum::debug_handler]
pub async fn protected(Extension(claims): Extension<Claims>) -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        msg: format!("Hello, {}! This is a protected route.", claims.sub),
    })
}

#[axum::debug_handler]
pub async fn read_user(
    State(state): State<AppState>,
    AppPath(user_id): AppPath<i64>,
) -> AppResult<Json<PublicUser>> {
    User::find_by_id(&state.pool, user_id)
        .await?
        .map(|user| Json(PublicUser::from(user)))
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}
