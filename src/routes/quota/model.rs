use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::error::{AppError, AppResult};
use crate::utils::{display_prefix, fingerprint, generate_api_key};

/// API Key 配额记录；数据库只保存 key 的摘要
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub id: i64,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub owner: String,
    pub remaining: i64,
    pub total: i64,
}

pub enum ConsumeOutcome {
    Accepted(ApiKey),
    Exhausted,
    Unknown,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IssueApiKeyRequest {
    #[serde(default)]
    pub total: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueApiKeyResponse {
    pub key: String,
    pub owner: String,
    pub remaining: i64,
    pub total: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuotaStats {
    pub owner: String,
    pub key_prefix: String,
    pub remaining: i64,
    pub total: i64,
    pub used: i64,
}

impl From<ApiKey> for QuotaStats {
    fn from(key: ApiKey) -> Self {
        Self {
            used: key.total - key.remaining,
            owner: key.owner,
            key_prefix: key.key_prefix,
            remaining: key.remaining,
            total: key.total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LimitedResponse {
    pub message: String,
    pub owner: String,
    pub remaining: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

impl IssueApiKeyRequest {
    pub fn resolve_total(&self, default_quota: i64) -> AppResult<i64> {
        let total = self.total.unwrap_or(default_quota);
        if total <= 0 {
            return Err(AppError::Validation("total must be greater than zero".into()));
        }
        Ok(total)
    }
}

const COLUMNS: &str = "id, key_hash, key_prefix, owner, remaining, total";

impl ApiKey {
    /// 签发新 key，返回记录与明文 key（明文只出现这一次）
    pub async fn issue(
        pool: &SqlitePool,
        owner: &str,
        total: i64,
    ) -> Result<(Self, String), sqlx::Error> {
        let plaintext = generate_api_key();

        let key = sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            INSERT INTO api_keys (key_hash, key_prefix, owner, remaining, total)
            VALUES (?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(fingerprint(&plaintext))
        .bind(display_prefix(&plaintext))
        .bind(owner)
        .bind(total)
        .bind(total)
        .fetch_one(pool)
        .await?;

        tracing::info!("Issued API key {} for {}", key.key_prefix, owner);
        Ok((key, plaintext))
    }

    pub async fn find_by_key(pool: &SqlitePool, api_key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(&format!(
            "SELECT {} FROM api_keys WHERE key_hash = ?",
            COLUMNS
        ))
        .bind(fingerprint(api_key))
        .fetch_optional(pool)
        .await
    }

    /// 原子扣减一次配额；并发请求不会把 remaining 扣成负数
    pub async fn consume(pool: &SqlitePool, api_key: &str) -> Result<ConsumeOutcome, sqlx::Error> {
        let key_hash = fingerprint(api_key);

        let updated = sqlx::query_as::<_, ApiKey>(&format!(
            r#"
            UPDATE api_keys
            SET remaining = remaining - 1
            WHERE key_hash = ? AND remaining > 0
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(&key_hash)
        .fetch_optional(pool)
        .await?;

        if let Some(key) = updated {
            return Ok(ConsumeOutcome::Accepted(key));
        }

        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM api_keys WHERE key_hash = ?)")
                .bind(&key_hash)
                .fetch_one(pool)
                .await?;

        Ok(if exists != 0 {
            ConsumeOutcome::Exhausted
        } else {
            ConsumeOutcome::Unknown
        })
    }

    /// 退还一次配额（上游失败时调用），不会超过 total
    pub async fn refund(pool: &SqlitePool, key_hash: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(&format!(
            "UPDATE api_keys SET remaining = MIN(remaining + 1, total) WHERE key_hash = ? RETURNING {}",
            COLUMNS
        ))
        .bind(key_hash)
        .fetch_optional(pool)
        .await
    }

    pub async fn reset(pool: &SqlitePool, api_key: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, ApiKey>(&format!(
            "UPDATE api_keys SET remaining = total WHERE key_hash = ? RETURNING {}",
            COLUMNS
        ))
        .bind(fingerprint(api_key))
        .fetch_optional(pool)
        .await
    }
}
