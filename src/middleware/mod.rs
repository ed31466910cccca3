mod auth;
mod error_handler;
pub mod quota;
pub mod rate_limit;
mod timing;

pub use auth::auth_middleware;
pub use error_handler::log_errors;
pub use quota::{API_KEY_HEADER, ApiKeyHeader, QUOTA_REMAINING_HEADER, require_quota};
pub use rate_limit::{RateLimitDecision, RateLimitStore, RateLimiter, rate_limit};
pub use timing::{PROCESS_TIME_HEADER, request_timer};
