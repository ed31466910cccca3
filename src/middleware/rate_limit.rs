use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::SqlitePool;

use crate::{
    AppState,
    config::{Config, RateLimitBackend},
    error::{AppError, AppResult},
    middleware::quota::API_KEY_HEADER,
    routes::quota::ApiKey,
};

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// 计数存储
pub enum RateLimitStore {
    /// 进程内滑动窗口：key -> 请求时间戳（毫秒）
    Memory(Mutex<HashMap<String, VecDeque<i64>>>),
    /// `request_log` 表滑动窗口
    Sqlite(SqlitePool),
    /// Redis 固定窗口计数（SET NX EX + INCR）
    Redis(redis::Client),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
}

impl RateLimitDecision {
    fn new(allowed: bool, count: u32, limit: u32) -> Self {
        Self {
            allowed,
            count,
            limit,
            remaining: limit.saturating_sub(count),
        }
    }
}

pub struct RateLimiter {
    store: RateLimitStore,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: RateLimitStore, max_requests: u32, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &Config, pool: SqlitePool) -> Result<Self, redis::RedisError> {
        let store = match config.rate_limit_backend {
            RateLimitBackend::Memory => RateLimitStore::Memory(Mutex::new(HashMap::new())),
            RateLimitBackend::Sqlite => RateLimitStore::Sqlite(pool),
            RateLimitBackend::Redis => {
                let url = config.redis_url.as_deref().ok_or_else(|| {
                    redis::RedisError::from((
                        redis::ErrorKind::InvalidClientConfig,
                        "REDIS_URL is required for the redis rate limit backend",
                    ))
                })?;
                RateLimitStore::Redis(redis::Client::open(url)?)
            }
        };
        tracing::info!(
            "Rate limiter: {:?}, {} requests per {}s",
            config.rate_limit_backend,
            config.rate_limit_requests,
            config.rate_limit_window_secs
        );
        Ok(Self::new(
            store,
            config.rate_limit_requests,
            config.rate_limit_window(),
        ))
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn window_millis(&self) -> i64 {
        self.window.as_millis() as i64
    }

    pub async fn hit(&self, key: &str) -> AppResult<RateLimitDecision> {
        self.hit_at(key, chrono::Utc::now().timestamp_millis()).await
    }

    /// 记录一次请求（被拒绝的请求同样记录），窗口内计数超过上限即拒绝；
    /// 持续请求的客户端会一直被限流，直到窗口内的记录全部过期
    pub async fn hit_at(&self, key: &str, now_ms: i64) -> AppResult<RateLimitDecision> {
        let cutoff = now_ms - self.window_millis();

        let count = match &self.store {
            RateLimitStore::Memory(records) => {
                let mut records = records
                    .lock()
                    .map_err(|_| AppError::Internal("Rate limit store poisoned".into()))?;
                let timestamps = records.entry(key.to_string()).or_default();
                while timestamps.front().is_some_and(|t| *t <= cutoff) {
                    timestamps.pop_front();
                }
                timestamps.push_back(now_ms);
                timestamps.len() as u32
            }
            RateLimitStore::Sqlite(pool) => {
                let mut tx = pool.begin().await?;

                sqlx::query("DELETE FROM request_log WHERE key = ? AND ts <= ?")
                    .bind(key)
                    .bind(cutoff)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query("INSERT INTO request_log (key, ts) VALUES (?, ?)")
                    .bind(key)
                    .bind(now_ms)
                    .execute(&mut *tx)
                    .await?;

                let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM request_log WHERE key = ?")
                    .bind(key)
                    .fetch_one(&mut *tx)
                    .await?;
                tx.commit().await?;

                count as u32
            }
            RateLimitStore::Redis(client) => {
                let mut conn = client.get_multiplexed_async_connection().await?;
                let (count,): (u32,) = window_counter_pipeline(
                    &format!("rate_limit:{}", key),
                    self.window.as_secs().max(1),
                )
                .query_async(&mut conn)
                .await?;
                count
            }
        };

        Ok(RateLimitDecision::new(
            count <= self.max_requests,
            count,
            self.max_requests,
        ))
    }

    pub async fn purge_expired(&self) -> AppResult<u64> {
        self.purge_expired_at(chrono::Utc::now().timestamp_millis())
            .await
    }

    /// 清理所有 key 中窗口之外的记录，返回删除条数
    pub async fn purge_expired_at(&self, now_ms: i64) -> AppResult<u64> {
        let cutoff = now_ms - self.window_millis();

        match &self.store {
            RateLimitStore::Memory(records) => {
                let mut records = records
                    .lock()
                    .map_err(|_| AppError::Internal("Rate limit store poisoned".into()))?;
                let mut removed = 0u64;
                records.retain(|_, timestamps| {
                    while timestamps.front().is_some_and(|t| *t <= cutoff) {
                        timestamps.pop_front();
                        removed += 1;
                    }
                    !timestamps.is_empty()
                });
                Ok(removed)
            }
            RateLimitStore::Sqlite(pool) => {
                let result = sqlx::query("DELETE FROM request_log WHERE ts <= ?")
                    .bind(cutoff)
                    .execute(pool)
                    .await?;
                Ok(result.rows_affected())
            }
            // Redis 依靠 TTL 自动过期
            RateLimitStore::Redis(_) => Ok(0),
        }
    }

    /// 后台定期清理过期记录
    pub fn spawn_purge_task(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = self.window.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match self.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!("Purged {} expired rate limit entries", removed),
                    Err(e) => tracing::warn!("Rate limit purge failed: {}", e),
                }
            }
        })
    }
}

/// 固定窗口计数：`SET key 0 EX window NX` 与 `INCR` 在同一个 MULTI 中执行，
/// 计数器创建时一定带有过期时间
pub fn window_counter_pipeline(redis_key: &str, window_secs: u64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(redis_key)
        .arg(0)
        .arg("EX")
        .arg(window_secs)
        .arg("NX")
        .ignore()
        .incr(redis_key, 1);
    pipe
}

/// 客户端 IP：x-real-ip → x-forwarded-for 第一个非空值 → 连接地址 → "unknown"
pub fn client_ip(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    let remote_ip = remote_addr.map(|addr| addr.ip().to_string());
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .to_string()
}

/// 选择限流 key：已签发的 API Key 按 key 计数，其余（包括伪造的 key）按客户端 IP 计数
pub async fn rate_limit_key(
    pool: &SqlitePool,
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
) -> Result<String, sqlx::Error> {
    if let Some(api_key) = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
    {
        if let Some(key) = ApiKey::find_by_key(pool, api_key).await? {
            return Ok(format!("key:{}", key.key_hash));
        }
        tracing::debug!("Unknown API key presented, limiting by client IP");
    }

    Ok(format!("ip:{}", client_ip(headers, remote_addr)))
}

fn set_limit_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
}

pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let remote_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let key = rate_limit_key(&state.pool, req.headers(), remote_addr).await?;

    let limiter = &state.limiter;
    let decision = limiter.hit(&key).await?;
    if !decision.allowed {
        tracing::info!("Rate limit exceeded for {}", key);
        let mut response = AppError::TooManyRequests(format!(
            "Rate limit exceeded. Max {} requests per {} seconds allowed.",
            limiter.max_requests(),
            limiter.window().as_secs()
        ))
        .into_response();
        set_limit_headers(&mut response, &decision);
        return Ok(response);
    }

    let mut response = next.run(req).await;
    set_limit_headers(&mut response, &decision);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;
    use axum::http::HeaderName;

    fn memory_limiter(max: u32, window_secs: u64) -> RateLimiter {
        RateLimiter::new(
            RateLimitStore::Memory(Mutex::new(HashMap::new())),
            max,
            Duration::from_secs(window_secs),
        )
    }

    async fn sqlite_limiter(max: u32, window_secs: u64) -> RateLimiter {
        let pool = database::connect("sqlite::memory:").await.unwrap();
        database::init_schema(&pool).await.unwrap();
        RateLimiter::new(
            RateLimitStore::Sqlite(pool),
            max,
            Duration::from_secs(window_secs),
        )
    }

    async fn assert_sliding_window(limiter: &RateLimiter) {
        let t0 = 1_000_000;
        assert!(limiter.hit_at("ip:1.1.1.1", t0).await.unwrap().allowed);
        let second = limiter.hit_at("ip:1.1.1.1", t0 + 100).await.unwrap();
        assert!(second.allowed);
        assert_eq!(second.remaining, 0);

        let denied = limiter.hit_at("ip:1.1.1.1", t0 + 200).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.count, 3);
        assert_eq!(denied.remaining, 0);

        // 其他 key 不受影响
        assert!(limiter.hit_at("ip:2.2.2.2", t0 + 200).await.unwrap().allowed);

        // 被拒绝的请求也计入窗口，持续请求时第一条记录滑出后仍然被拒绝
        assert!(!limiter.hit_at("ip:1.1.1.1", t0 + 900).await.unwrap().allowed);
        let still_denied = limiter.hit_at("ip:1.1.1.1", t0 + 1_000).await.unwrap();
        assert!(!still_denied.allowed);
        assert_eq!(still_denied.count, 4);

        // 窗口内全部记录过期后重新放行
        let recovered = limiter.hit_at("ip:1.1.1.1", t0 + 2_000).await.unwrap();
        assert!(recovered.allowed);
        assert_eq!(recovered.count, 1);
    }

    #[tokio::test]
    async fn memory_store_slides_window() {
        assert_sliding_window(&memory_limiter(2, 1)).await;
    }

    #[tokio::test]
    async fn sqlite_store_slides_window() {
        assert_sliding_window(&sqlite_limiter(2, 1).await).await;
    }

    #[tokio::test]
    async fn purge_removes_only_expired_entries() {
        for limiter in [memory_limiter(10, 1), sqlite_limiter(10, 1).await] {
            limiter.hit_at("a", 0).await.unwrap();
            limiter.hit_at("a", 500).await.unwrap();
            limiter.hit_at("b", 1_500).await.unwrap();

            assert_eq!(limiter.purge_expired_at(2_000).await.unwrap(), 2);
            assert_eq!(limiter.purge_expired_at(2_000).await.unwrap(), 0);

            // b 仍在窗口内
            let next = limiter.hit_at("b", 2_000).await.unwrap();
            assert_eq!(next.count, 2);
        }
    }

    #[test]
    fn client_ip_prefers_real_ip_then_forwarded() {
        let addr: SocketAddr = "10.0.0.9:5555".parse().unwrap();

        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(addr)), "10.0.0.9");
        assert_eq!(client_ip(&headers, None), "unknown");

        headers.insert(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_static(" , 203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(addr)), "203.0.113.7");

        headers.insert(
            HeaderName::from_static("x-real-ip"),
            HeaderValue::from_static("198.51.100.2"),
        );
        assert_eq!(client_ip(&headers, Some(addr)), "198.51.100.2");
    }

    #[tokio::test]
    async fn only_issued_keys_get_their_own_bucket() {
        let pool = database::connect("sqlite::memory:").await.unwrap();
        database::init_schema(&pool).await.unwrap();
        let (issued, plaintext) = ApiKey::issue(&pool, "alice", 5).await.unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-real-ip"),
            HeaderValue::from_static("198.51.100.2"),
        );

        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            HeaderValue::from_static("sk_made_up"),
        );
        assert_eq!(
            rate_limit_key(&pool, &headers, None).await.unwrap(),
            "ip:198.51.100.2"
        );

        headers.insert(
            HeaderName::from_static(API_KEY_HEADER),
            HeaderValue::from_str(&plaintext).unwrap(),
        );
        assert_eq!(
            rate_limit_key(&pool, &headers, None).await.unwrap(),
            format!("key:{}", issued.key_hash)
        );
    }

    #[test]
    fn redis_counter_sets_ttl_in_same_transaction() {
        let packed = window_counter_pipeline("rate_limit:ip:1.2.3.4", 60).get_packed_pipeline();
        let text = String::from_utf8_lossy(&packed);

        let multi = text.find("MULTI").unwrap();
        let set = text.find("SET").unwrap();
        let incr = text.find("INCR").unwrap();
        let exec = text.find("EXEC").unwrap();
        assert!(multi < set && set < incr && incr < exec);
        assert!(text.contains("NX"));
        assert!(text.contains("EX"));
    }

    #[tokio::test]
    async fn redis_backend_requires_url() {
        let mut config = crate::test_utils::create_test_config();
        config.rate_limit_backend = RateLimitBackend::Redis;
        config.redis_url = None;

        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect_lazy("sqlite::memory:").unwrap();
        assert!(RateLimiter::from_config(&config, pool).is_err());
    }
}
