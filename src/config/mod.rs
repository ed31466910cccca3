use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    Memory,
    Sqlite,
    Redis,
}

impl FromStr for RateLimitBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "redis" => Ok(Self::Redis),
            other => Err(format!("unknown rate limit backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub access_token_expire_minutes: u64,
    pub refresh_token_expire_days: u64,
    pub bcrypt_cost: u32,
    pub rate_limit_backend: RateLimitBackend,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub redis_url: Option<String>,
    pub default_quota: i64,
    pub chat_webhook_url: Option<String>,
    pub chat_timeout_secs: u64,
    pub upload_dir: String,
}

/// 读取可选环境变量，未设置或解析失败时使用默认值
fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

/// bcrypt 只接受 4..=31，超出范围时截断到边界
pub fn clamp_bcrypt_cost(cost: u32) -> u32 {
    let clamped = cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST);
    if clamped != cost {
        tracing::warn!("BCRYPT_COST {} out of range, using {}", cost, clamped);
    }
    clamped
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")?;
        let jwt_refresh_secret =
            non_empty_var("JWT_REFRESH_SECRET").unwrap_or_else(|| format!("{}-refresh", jwt_secret));

        Ok(Config {
            database_url: non_empty_var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://database.db".to_string()),
            server_host: non_empty_var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: var_or("SERVER_PORT", 8000),
            jwt_secret,
            jwt_refresh_secret,
            access_token_expire_minutes: var_or("ACCESS_TOKEN_EXPIRE_MINUTES", 30),
            refresh_token_expire_days: var_or("REFRESH_TOKEN_EXPIRE_DAYS", 7),
            bcrypt_cost: clamp_bcrypt_cost(var_or("BCRYPT_COST", bcrypt::DEFAULT_COST)),
            rate_limit_backend: var_or("RATE_LIMIT_BACKEND", RateLimitBackend::Sqlite),
            rate_limit_window_secs: var_or("RATE_LIMIT_WINDOW", 60),
            rate_limit_requests: var_or("RATE_LIMIT_REQUESTS", 100),
            redis_url: non_empty_var("REDIS_URL"),
            default_quota: var_or("DEFAULT_QUOTA", 100),
            chat_webhook_url: non_empty_var("CHAT_WEBHOOK_URL"),
            chat_timeout_secs: var_or("CHAT_TIMEOUT", 10),
            upload_dir: non_empty_var("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()),
        })
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::from_secs(self.access_token_expire_minutes * 60)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_token_expire_days * 24 * 3600)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs.max(1))
    }
}
