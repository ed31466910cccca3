mod handler;
mod model;

pub use handler::{chat, issue_api_key, limited, reset_quota, stats};
pub use model::{
    ApiKey, ChatRequest, ChatResponse, ConsumeOutcome, IssueApiKeyRequest, IssueApiKeyResponse,
    LimitedResponse, QuotaStats,
};
