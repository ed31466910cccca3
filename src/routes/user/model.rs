use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{AppError, AppResult};
use crate::utils::verify_password;

pub const USERNAME_MAX_LEN: usize = 50;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub age: i64,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub age: i64,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            age: user.age,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub age: i64,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub username: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProtectedResponse {
    pub msg: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> AppResult<()> {
        let username = self.username.trim();
        if username.is_empty() || username.chars().count() > USERNAME_MAX_LEN {
            return Err(AppError::Validation(format!(
                "username must be between 1 and {} characters",
                USERNAME_MAX_LEN
            )));
        }
        if !(0..=150).contains(&self.age) {
            return Err(AppError::Validation("age must be between 0 and 150".into()));
        }
        if self.password.is_empty() {
            return Err(AppError::Validation("password must not be empty".into()));
        }
        Ok(())
    }
}

impl User {
    /// 创建用户，密码哈希由调用方计算；用户名重复时由唯一约束返回数据库错误
    pub async fn create(
        pool: &SqlitePool,
        req: &RegisterRequest,
        password_hash: &str,
    ) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, age, password_hash)
            VALUES (?, ?, ?)
            RETURNING id, username, age, password_hash
            "#,
        )
        .bind(req.username.trim())
        .bind(req.age)
        .bind(password_hash)
        .fetch_one(pool)
        .await?;

        tracing::info!("Registered user {}", user.username);
        Ok(user)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, age, password_hash FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_username(
        pool: &SqlitePool,
        username: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, age, password_hash FROM users WHERE username = ?",
        )
        .bind(username.trim())
        .fetch_optional(pool)
        .await
    }

    pub fn verify_login(&self, password: &str) -> Result<bool, bcrypt::BcryptError> {
        verify_password(password, &self.password_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_config, create_test_state};
    use crate::utils::hash_password;

    fn register(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            age: 30,
            password: "secret-pw".into(),
        }
    }

    #[tokio::test]
    async fn create_stores_hash_not_password() {
        let state = create_test_state(create_test_config()).await;
        let hash = hash_password("secret-pw", 4).unwrap();
        let user = User::create(&state.pool, &register("dana"), &hash).await.unwrap();

        assert_ne!(user.password_hash, "secret-pw");
        assert!(user.verify_login("secret-pw").unwrap());
        assert!(!user.verify_login("wrong").unwrap());

        let found = User::find_by_username(&state.pool, "dana").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(User::find_by_username(&state.pool, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_hits_unique_constraint() {
        let state = create_test_state(create_test_config()).await;
        let hash = hash_password("secret-pw", 4).unwrap();
        User::create(&state.pool, &register("erin"), &hash).await.unwrap();

        let err = User::create(&state.pool, &register("erin"), &hash).await.unwrap_err();
        let is_unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        assert!(is_unique);
    }

    #[test]
    fn register_validation() {
        assert!(register("frank").validate().is_ok());
        assert!(register("  ").validate().is_err());
        assert!(register(&"x".repeat(USERNAME_MAX_LEN + 1)).validate().is_err());

        let mut negative_age = register("gina");
        negative_age.age = -1;
        assert!(negative_age.validate().is_err());

        let mut empty_password = register("hal");
        empty_password.password.clear();
        assert!(empty_password.validate().is_err());
    }

    #[test]
    fn public_user_omits_hash() {
        let user = User {
            id: 1,
            username: "ivy".into(),
            age: 22,
            password_hash: "$2b$04$abc".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());

        let public = PublicUser::from(user);
        assert_eq!(public.username, "ivy");
    }
}
