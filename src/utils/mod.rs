use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::Config;

pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户名
    pub exp: i64,    // 过期时间
    pub iat: i64,    // 签发时间
    pub token_type: TokenType,
}

fn secret_for(token_type: TokenType, config: &Config) -> &[u8] {
    match token_type {
        TokenType::Access => config.jwt_secret.as_bytes(),
        TokenType::Refresh => config.jwt_refresh_secret.as_bytes(),
    }
}

pub fn generate_token(
    subject: &str,
    token_type: TokenType,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let ttl = match token_type {
        TokenType::Access => config.access_token_ttl(),
        TokenType::Refresh => config.refresh_token_ttl(),
    };
    let now = Utc::now();
    let expiration = (now + Duration::seconds(ttl.as_secs() as i64)).timestamp();

    let claims = Claims {
        sub: subject.to_string(),
        exp: expiration,
        iat: now.timestamp(),
        token_type,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret_for(token_type, config)),
    )?;

    tracing::debug!("Issued {:?} token for {}", token_type, subject);
    Ok((token, expiration))
}

/// 校验签名、过期时间以及令牌类型；类型不符视为无效
pub fn verify_token(
    token: &str,
    expected: TokenType,
    config: &Config,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret_for(expected, config)),
        &Validation::default(),
    )?;

    if token_data.claims.token_type != expected {
        return Err(jsonwebtoken::errors::ErrorKind::InvalidToken.into());
    }

    Ok(token_data.claims)
}

pub const API_KEY_PREFIX: &str = "sk_";

/// 生成新的 API Key，明文只在签发时返回一次
pub fn generate_api_key() -> String {
    format!(
        "{}{}{}",
        API_KEY_PREFIX,
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// API Key 的 SHA-256 摘要（十六进制），数据库只保存摘要
pub fn fingerprint(api_key: &str) -> String {
    format!("{:x}", Sha256::digest(api_key.as_bytes()))
}

/// 用于展示的前缀，例如 `sk_1a2b3c4d`
pub fn display_prefix(api_key: &str) -> String {
    api_key.chars().take(API_KEY_PREFIX.len() + 8).collect()
}

/// 上游调用共用的 HTTP 客户端，整体超时取自 CHAT_TIMEOUT
pub fn build_http_client(config: &Config) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.chat_timeout())
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_config;

    #[test]
    fn password_round_trip() {
        let hashed = hash_password("hunter22", 4).unwrap();
        assert_ne!(hashed, "hunter22");
        assert!(verify_password("hunter22", &hashed).unwrap());
        assert!(!verify_password("hunter23", &hashed).unwrap());
    }

    #[test]
    fn access_token_verifies_as_access_only() {
        let config = create_test_config();
        let (token, exp) = generate_token("alice", TokenType::Access, &config).unwrap();
        assert!(exp > Utc::now().timestamp());

        let claims = verify_token(&token, TokenType::Access, &config).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.token_type, TokenType::Access);

        assert!(verify_token(&token, TokenType::Refresh, &config).is_err());
    }

    #[test]
    fn refresh_token_is_rejected_as_access_even_with_shared_secret() {
        let mut config = create_test_config();
        config.jwt_refresh_secret = config.jwt_secret.clone();

        let (token, _) = generate_token("bob", TokenType::Refresh, &config).unwrap();
        assert!(verify_token(&token, TokenType::Access, &config).is_err());
        assert!(verify_token(&token, TokenType::Refresh, &config).is_ok());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = create_test_config();
        let claims = Claims {
            sub: "carol".into(),
            exp: Utc::now().timestamp() - 3600,
            iat: Utc::now().timestamp() - 7200,
            token_type: TokenType::Access,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(verify_token(&token, TokenType::Access, &config).is_err());
    }

    #[test]
    fn api_keys_are_unique_and_fingerprinted() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
        assert!(a.starts_with(API_KEY_PREFIX));
        assert_eq!(a.len(), API_KEY_PREFIX.len() + 64);

        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 64);
        assert_eq!(display_prefix(&a).len(), API_KEY_PREFIX.len() + 8);
    }
}
